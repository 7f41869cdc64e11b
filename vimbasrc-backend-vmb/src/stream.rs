use std::sync::Arc;

use async_trait::async_trait;

use vimbasrc_core::error::{CameraError, Result};
use vimbasrc_core::frame::Frame;
use vimbasrc_core::pixel_format::SupportedFormats;
use vimbasrc_core::traits::Stream;

use crate::engine::CaptureEngine;

/// 基于 [`CaptureEngine`] 的异步数据面
///
/// 引擎调用会阻塞 (SDK 往返、等待帧)，因此都放在 tokio 的 blocking 线程池中执行。
#[derive(Debug, Clone)]
pub struct VmbStream {
    engine: Arc<CaptureEngine>,
}

impl VmbStream {
    pub fn new(engine: Arc<CaptureEngine>) -> Self {
        Self { engine }
    }

    /// 底层引擎，用于 `Stream` trait 未覆盖的控制调用 (格式修改、遥测)
    pub fn engine(&self) -> &Arc<CaptureEngine> {
        &self.engine
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&CaptureEngine) -> T + Send + 'static,
    {
        let engine = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || f(&engine))
            .await
            .map_err(|e| CameraError::InternalFault(format!("blocking task: {e}")))
    }
}

#[async_trait]
impl Stream for VmbStream {
    async fn start(&mut self) -> Result<()> {
        self.blocking(CaptureEngine::start).await?
    }

    async fn stop(&mut self) -> Result<()> {
        self.blocking(CaptureEngine::stop).await?
    }

    async fn next_frame(&mut self) -> Result<Option<Frame>> {
        self.blocking(CaptureEngine::request_frame).await
    }

    fn supported_formats(&self) -> Result<SupportedFormats> {
        self.engine.supported_formats()
    }
}
