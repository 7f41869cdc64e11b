//! 单个相机的采集状态机
//!
//! 引擎持有 SDK 句柄、已注册的缓冲池和当前会话的帧队列，
//! 全部位于同一把配置锁之后。消费者等待帧时从不持有该锁，
//! 驱动的投递线程也从不获取它。

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bitflags::bitflags;

use vimbasrc_core::builder::{CameraConfig, FormatRequest};
use vimbasrc_core::error::{CameraError, Result};
use vimbasrc_core::frame::Frame;
use vimbasrc_core::pixel_format::SupportedFormats;
use vimbasrc_core::sdk::{CameraSdk, DeviceHandle};
use vimbasrc_core::telemetry::{CaptureTelemetry, TelemetrySnapshot};
use vimbasrc_core::time::SessionClock;

use crate::delivery::FrameDelivery;
use crate::device;
use crate::features::{self, CameraGeometry};
use crate::pixel_map::{self, CaptureCaps};
use crate::pool::FrameBufferPool;
use crate::queue::{FrameQueue, Pop};

bitflags! {
    /// 当前持有的资源。拆除依据这些标志位，而不是 [`AcquisitionState`]。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SessionFlags: u8 {
        const OPEN            = 1 << 0;
        const ANNOUNCED       = 1 << 1;
        const CAPTURE_RUNNING = 1 << 2;
        const ACQUIRING       = 1 << 3;
    }
}

impl SessionFlags {
    /// `stop()` 释放的全部资源
    pub const SESSION: Self = Self::ANNOUNCED
        .union(Self::CAPTURE_RUNNING)
        .union(Self::ACQUIRING);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub enum AcquisitionState {
    Closed,
    Opened,
    Buffered,
    Streaming,
    Acquiring,
}

impl AcquisitionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "Closed",
            Self::Opened => "Opened",
            Self::Buffered => "Buffered",
            Self::Streaming => "Streaming",
            Self::Acquiring => "Acquiring",
        }
    }
}

impl From<SessionFlags> for AcquisitionState {
    fn from(flags: SessionFlags) -> Self {
        if !flags.contains(SessionFlags::OPEN) {
            Self::Closed
        } else if flags.contains(SessionFlags::ACQUIRING) {
            Self::Acquiring
        } else if flags.contains(SessionFlags::CAPTURE_RUNNING) {
            Self::Streaming
        } else if flags.contains(SessionFlags::ANNOUNCED) {
            Self::Buffered
        } else {
            Self::Opened
        }
    }
}

impl fmt::Display for AcquisitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
struct EngineInner {
    handle: Option<DeviceHandle>,
    camera_id: Option<String>,
    flags: SessionFlags,
    pool: FrameBufferPool,
    queue: Arc<FrameQueue>,
    clock: SessionClock,
}

impl EngineInner {
    fn state(&self) -> AcquisitionState {
        self.flags.into()
    }

    /// 引擎处于 `expected` 状态时返回句柄，否则 `InvalidState`
    fn require(&self, operation: &'static str, expected: AcquisitionState) -> Result<DeviceHandle> {
        match self.handle {
            Some(handle) if self.state() == expected => Ok(handle),
            _ => Err(self.invalid(operation)),
        }
    }

    fn require_open(&self, operation: &'static str) -> Result<DeviceHandle> {
        self.handle.ok_or_else(|| self.invalid(operation))
    }

    fn invalid(&self, operation: &'static str) -> CameraError {
        CameraError::InvalidState {
            operation,
            state: self.state().as_str(),
        }
    }
}

/// 驱动单个相机完成打开、缓冲区准备、采集与拆除。
///
/// 所有方法都只需 `&self`。以 `Arc<CaptureEngine>` 共享后，
/// 可以一个线程取帧，另一个线程控制会话。
pub struct CaptureEngine {
    sdk: Arc<dyn CameraSdk>,
    config: CameraConfig,
    inner: Mutex<EngineInner>,
    telemetry: Arc<CaptureTelemetry>,
}

impl fmt::Debug for CaptureEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("CaptureEngine")
            .field("camera_id", &inner.camera_id)
            .field("state", &inner.state())
            .field("buffers", &inner.pool.len())
            .finish()
    }
}

impl CaptureEngine {
    pub fn new(sdk: Arc<dyn CameraSdk>, config: CameraConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            sdk,
            config,
            inner: Mutex::new(EngineInner {
                handle: None,
                camera_id: None,
                flags: SessionFlags::empty(),
                pool: FrameBufferPool::default(),
                queue: Arc::new(FrameQueue::closed()),
                clock: SessionClock::start(),
            }),
            telemetry: Arc::new(CaptureTelemetry::new()),
        })
    }

    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    /// Closed -> Opened
    ///
    /// id 必须在 SDK 当前列出的相机中。未知 id 直接返回 `DeviceNotFound`，不会尝试打开。
    pub fn open(&self, camera_id: &str) -> Result<()> {
        let mut inner = self.lock();
        if inner.flags.contains(SessionFlags::OPEN) {
            return Err(inner.invalid("open"));
        }

        let info = device::find_device(self.sdk.as_ref(), camera_id)?;
        let handle = self
            .sdk
            .open_camera(camera_id, self.config.access_mode)
            .map_err(|e| e.into_camera_error(camera_id))?;

        inner.handle = Some(handle);
        inner.camera_id = Some(camera_id.to_owned());
        inner.flags = SessionFlags::OPEN;
        tracing::info!(
            target: "vimbasrc::engine",
            camera = camera_id, model = %info.name, %handle,
            "camera opened"
        );

        if let Some(request) = &self.config.format {
            if let Err(e) = self.apply_format_locked(&mut inner, request) {
                // 返回格式错误
                let _ = self.close_locked(&mut inner);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Opened -> Buffered。按最新查询的 PayloadSize 分配并注册配置数量的缓冲区。
    pub fn prepare_buffers(&self) -> Result<()> {
        let mut inner = self.lock();
        let result = self.prepare_buffers_locked(&mut inner);
        self.rollback_on_error(&mut inner, result)
    }

    /// Buffered -> Streaming。启动驱动采集引擎并将所有缓冲区入队。
    pub fn begin_capture(&self) -> Result<()> {
        let mut inner = self.lock();
        let result = self.begin_capture_locked(&mut inner);
        self.rollback_on_error(&mut inner, result)
    }

    /// Streaming -> Acquiring
    pub fn run_acquisition_start(&self) -> Result<()> {
        let mut inner = self.lock();
        let result = self.acquisition_start_locked(&mut inner);
        self.rollback_on_error(&mut inner, result)
    }

    /// 一次调用完成 Opened -> Acquiring。仍持有资源的会话会先被拆除。
    pub fn start(&self) -> Result<()> {
        let mut inner = self.lock();
        self.start_locked(&mut inner)
    }

    /// 释放全部会话资源，并唤醒阻塞在 [`request_frame`](Self::request_frame) 中的消费者。
    /// 可重复调用，设备保持打开。
    pub fn stop(&self) -> Result<()> {
        let mut inner = self.lock();
        self.stop_locked(&mut inner);
        Ok(())
    }

    /// 必要时先停止，再释放设备句柄。未打开时什么也不做。
    pub fn close(&self) -> Result<()> {
        let mut inner = self.lock();
        self.close_locked(&mut inner)
    }

    pub fn state(&self) -> AcquisitionState {
        self.lock().state()
    }

    pub fn flags(&self) -> SessionFlags {
        self.lock().flags
    }

    /// 下一帧。在配置的超时内没有帧到达，或会话已停止时返回 `None`。
    pub fn request_frame(&self) -> Option<Frame> {
        self.request_frame_within(self.config.frame_timeout)
    }

    pub fn request_frame_within(&self, timeout: Duration) -> Option<Frame> {
        let (queue, clock) = {
            let inner = self.lock();
            (Arc::clone(&inner.queue), inner.clock)
        };

        match queue.pop(timeout) {
            Pop::Frame(captured) => {
                let pts = clock.running_time(captured.arrival);
                Some(Frame::from_captured(captured, pts))
            }
            Pop::Closed => None,
            Pop::TimedOut => {
                tracing::trace!(target: "vimbasrc::engine", ?timeout, "no frame within deadline");
                None
            }
        }
    }

    pub fn supported_formats(&self) -> Result<SupportedFormats> {
        let inner = self.lock();
        let handle = inner.require_open("supported_formats")?;
        pixel_map::supported_formats(self.sdk.as_ref(), handle)
    }

    pub fn geometry(&self) -> Result<CameraGeometry> {
        let inner = self.lock();
        let handle = inner.require_open("geometry")?;
        features::load_geometry(self.sdk.as_ref(), handle)
    }

    pub fn caps(&self) -> Result<CaptureCaps> {
        let inner = self.lock();
        let handle = inner.require_open("caps")?;
        let formats = pixel_map::supported_formats(self.sdk.as_ref(), handle)?;
        let geometry = features::load_geometry(self.sdk.as_ref(), handle)?;
        Ok(CaptureCaps::new(formats, &geometry))
    }

    /// 应用协商后的格式。运行中的会话会先停止，
    /// 原本在采集的会在修改后重新启动。
    pub fn set_format(&self, request: &FormatRequest) -> Result<()> {
        let mut inner = self.lock();
        inner.require_open("set_format")?;
        let was_acquiring = inner.flags.contains(SessionFlags::ACQUIRING);

        self.apply_format_locked(&mut inner, request)?;
        if was_acquiring {
            self.start_locked(&mut inner)?;
        }
        Ok(())
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.telemetry.snapshot()
    }

    pub fn handle(&self) -> Option<DeviceHandle> {
        self.lock().handle
    }

    pub fn camera_id(&self) -> Option<String> {
        self.lock().camera_id.clone()
    }

    /// 当前会话已注册的缓冲区数量
    pub fn buffer_count(&self) -> usize {
        self.lock().pool.len()
    }

    pub fn buffer_size(&self) -> Option<usize> {
        self.lock().pool.buffer_size()
    }

    pub fn buffers_in_flight(&self) -> usize {
        self.lock().pool.in_flight()
    }

    /// 用于诊断的会话 JSON 摘要
    #[cfg(feature = "serialize")]
    pub fn export_state(&self) -> Result<String> {
        #[derive(serde::Serialize)]
        struct EngineStatus {
            camera_id: Option<String>,
            state: AcquisitionState,
            buffers: usize,
            buffer_size: Option<usize>,
            in_flight: usize,
            telemetry: TelemetrySnapshot,
        }

        let status = {
            let inner = self.lock();
            EngineStatus {
                camera_id: inner.camera_id.clone(),
                state: inner.state(),
                buffers: inner.pool.len(),
                buffer_size: inner.pool.buffer_size(),
                in_flight: inner.pool.in_flight(),
                telemetry: self.telemetry.snapshot(),
            }
        };
        serde_json::to_string_pretty(&status).map_err(|e| CameraError::InternalFault(e.to_string()))
    }

    fn lock(&self) -> MutexGuard<'_, EngineInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 因状态不对被拒绝的步骤没有获取任何资源，只有真正的失败才拆除会话。
    fn rollback_on_error(&self, inner: &mut EngineInner, result: Result<()>) -> Result<()> {
        match &result {
            Ok(()) | Err(CameraError::InvalidState { .. }) => {}
            Err(e) => {
                tracing::warn!(
                    target: "vimbasrc::engine",
                    error = %e, state = %inner.state(),
                    "session setup failed, rolling back"
                );
                self.stop_locked(inner);
            }
        }
        result
    }

    fn start_locked(&self, inner: &mut EngineInner) -> Result<()> {
        inner.require_open("start")?;
        if inner.flags.intersects(SessionFlags::SESSION) {
            tracing::debug!(target: "vimbasrc::engine", state = %inner.state(), "restarting session");
            self.stop_locked(inner);
        }

        let result = self
            .prepare_buffers_locked(inner)
            .and_then(|()| self.begin_capture_locked(inner))
            .and_then(|()| self.acquisition_start_locked(inner));
        self.rollback_on_error(inner, result)?;

        tracing::info!(
            target: "vimbasrc::engine",
            buffers = inner.pool.len(),
            payload = inner.pool.buffer_size(),
            "acquisition started"
        );
        Ok(())
    }

    fn prepare_buffers_locked(&self, inner: &mut EngineInner) -> Result<()> {
        let handle = inner.require("prepare_buffers", AcquisitionState::Opened)?;
        let size = features::payload_size(self.sdk.as_ref(), handle)?;

        inner.pool =
            FrameBufferPool::allocate(self.sdk.as_ref(), handle, self.config.buffer_count, size)?;
        inner.flags.insert(SessionFlags::ANNOUNCED);
        Ok(())
    }

    fn begin_capture_locked(&self, inner: &mut EngineInner) -> Result<()> {
        let handle = inner.require("begin_capture", AcquisitionState::Buffered)?;
        self.sdk
            .capture_start(handle)
            .map_err(|e| e.into_camera_error("capture engine"))?;
        inner.flags.insert(SessionFlags::CAPTURE_RUNNING);

        let queue = Arc::new(FrameQueue::new());
        inner.queue = Arc::clone(&queue);
        let delivery = FrameDelivery::new(
            Arc::clone(&self.sdk),
            queue,
            Arc::clone(&self.telemetry),
        );
        for buffer in inner.pool.buffers() {
            delivery
                .submit(handle, buffer)
                .map_err(|e| e.into_camera_error("capture queue"))?;
        }
        self.telemetry.record_session();
        Ok(())
    }

    fn acquisition_start_locked(&self, inner: &mut EngineInner) -> Result<()> {
        let handle = inner.require("run_acquisition_start", AcquisitionState::Streaming)?;
        inner.clock = SessionClock::start();
        self.sdk
            .run_command(handle, features::ACQUISITION_START)
            .map_err(|e| e.into_camera_error(features::ACQUISITION_START))?;
        inner.flags.insert(SessionFlags::ACQUIRING);
        Ok(())
    }

    /// 按标志位有序拆除。每一步只在持有对应资源时执行，
    /// 失败只记录日志，不返回。
    fn stop_locked(&self, inner: &mut EngineInner) {
        let held = inner.flags.intersection(SessionFlags::SESSION);
        if let Some(handle) = inner.handle {
            if inner.flags.contains(SessionFlags::ACQUIRING) {
                if let Err(e) = self.sdk.run_command(handle, features::ACQUISITION_STOP) {
                    tracing::warn!(target: "vimbasrc::engine", error = %e, "AcquisitionStop failed");
                }
                inner.flags.remove(SessionFlags::ACQUIRING);
            }

            if inner.flags.contains(SessionFlags::CAPTURE_RUNNING) {
                if let Err(e) = self.sdk.capture_queue_flush(handle) {
                    tracing::warn!(target: "vimbasrc::engine", error = %e, "capture queue flush failed");
                }
                inner.pool.mark_all_idle();
                if let Err(e) = self.sdk.capture_end(handle) {
                    tracing::warn!(target: "vimbasrc::engine", error = %e, "capture end failed");
                }
                inner.flags.remove(SessionFlags::CAPTURE_RUNNING);
            }

            if inner.flags.contains(SessionFlags::ANNOUNCED) {
                let revoked = inner.pool.revoke_all(self.sdk.as_ref(), handle);
                tracing::debug!(target: "vimbasrc::pool", revoked, "buffers revoked");
                inner.flags.remove(SessionFlags::ANNOUNCED);
            }
        }

        inner.queue.close();
        if !held.is_empty() {
            tracing::info!(
                target: "vimbasrc::engine",
                released = ?held,
                running = ?inner.clock.elapsed(),
                "capture stopped"
            );
        }
    }

    fn close_locked(&self, inner: &mut EngineInner) -> Result<()> {
        let Some(handle) = inner.handle else {
            return Ok(());
        };
        self.stop_locked(inner);

        inner.handle = None;
        inner.flags = SessionFlags::empty();
        let camera_id = inner.camera_id.take().unwrap_or_default();

        self.sdk.close_camera(handle).map_err(|e| {
            tracing::warn!(target: "vimbasrc::engine", camera = %camera_id, error = %e, "close failed");
            e.into_camera_error(&camera_id)
        })?;
        tracing::info!(target: "vimbasrc::engine", camera = %camera_id, "camera closed");
        Ok(())
    }

    fn apply_format_locked(&self, inner: &mut EngineInner, request: &FormatRequest) -> Result<()> {
        let device_format = request.device_format()?;
        let handle = inner.require_open("set_format")?;
        if inner.flags.intersects(SessionFlags::SESSION) {
            self.stop_locked(inner);
        }
        features::apply_format(
            self.sdk.as_ref(),
            handle,
            request.width,
            request.height,
            device_format,
        )
    }
}

impl Drop for CaptureEngine {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(target: "vimbasrc::engine", error = %e, "close on drop failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_is_derived_from_flags() {
        let cases = [
            (SessionFlags::empty(), AcquisitionState::Closed),
            (SessionFlags::ACQUIRING, AcquisitionState::Closed),
            (SessionFlags::OPEN, AcquisitionState::Opened),
            (
                SessionFlags::OPEN | SessionFlags::ANNOUNCED,
                AcquisitionState::Buffered,
            ),
            (
                SessionFlags::OPEN | SessionFlags::ANNOUNCED | SessionFlags::CAPTURE_RUNNING,
                AcquisitionState::Streaming,
            ),
            (SessionFlags::all(), AcquisitionState::Acquiring),
        ];
        for (flags, state) in cases {
            assert_eq!(AcquisitionState::from(flags), state, "{flags:?}");
        }
    }

    #[test]
    fn session_mask_excludes_open() {
        assert!(!SessionFlags::SESSION.contains(SessionFlags::OPEN));
        assert_eq!(SessionFlags::SESSION | SessionFlags::OPEN, SessionFlags::all());
    }
}
