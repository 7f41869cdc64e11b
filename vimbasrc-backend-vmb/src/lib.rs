//! 回调式机器视觉相机 SDK 的采集后端
//!
//! [`CaptureEngine`] 驱动单个相机，[`VmbDriver`] 通过 core 的
//! `Driver` / `Stream` trait 对外暴露。

mod delivery;
pub mod device;
pub mod engine;
pub mod features;
pub mod pixel_map;
pub mod pool;
pub mod queue;
pub mod stream;

use std::sync::Arc;

use vimbasrc_core::builder::CameraConfig;
use vimbasrc_core::error::Result;
use vimbasrc_core::sdk::CameraSdk;
use vimbasrc_core::traits::{DeviceInfo, Driver, Stream};

pub use engine::{AcquisitionState, CaptureEngine, SessionFlags};
pub use features::CameraGeometry;
pub use pixel_map::CaptureCaps;
pub use stream::VmbStream;

/// 绑定到单个 SDK 实例的驱动入口
#[derive(Clone)]
pub struct VmbDriver {
    sdk: Arc<dyn CameraSdk>,
}

impl std::fmt::Debug for VmbDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VmbDriver").finish_non_exhaustive()
    }
}

impl VmbDriver {
    pub fn new(sdk: Arc<dyn CameraSdk>) -> Self {
        Self { sdk }
    }

    /// 打开 `id`，直接返回引擎而不是 boxed stream
    pub fn open_engine(&self, id: &str, config: CameraConfig) -> Result<Arc<CaptureEngine>> {
        let engine = CaptureEngine::new(Arc::clone(&self.sdk), config)?;
        engine.open(id)?;
        Ok(Arc::new(engine))
    }
}

impl Driver for VmbDriver {
    fn list_devices(&self) -> Result<Vec<DeviceInfo>> {
        device::list_devices(self.sdk.as_ref())
    }

    fn open(&self, id: &str, config: CameraConfig) -> Result<Box<dyn Stream>> {
        let engine = self.open_engine(id, config)?;
        Ok(Box::new(VmbStream::new(engine)))
    }
}

pub fn default_driver(sdk: Arc<dyn CameraSdk>) -> Arc<dyn Driver> {
    Arc::new(VmbDriver::new(sdk))
}
