#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use vimbasrc_backend_vmb::CaptureEngine;
use vimbasrc_core::builder::CameraConfig;
use vimbasrc_simulation::{SdkCall, SimulatedCamera, SimulatedSdk};

pub const CAMERA: &str = "DEV_000F314C4C2A";
pub const PAYLOAD: usize = 1024;

pub fn config(buffers: usize) -> CameraConfig {
    CameraConfig::new()
        .buffer_count(buffers)
        .frame_timeout(Duration::from_millis(200))
}

pub fn sdk() -> Arc<SimulatedSdk> {
    Arc::new(SimulatedSdk::new().with_camera(SimulatedCamera::new(CAMERA).payload_size(PAYLOAD as i64)))
}

pub fn engine(sdk: &Arc<SimulatedSdk>, buffers: usize) -> CaptureEngine {
    CaptureEngine::new(sdk.clone(), config(buffers)).expect("valid config")
}

/// 在新仿真器上打开的引擎，相机 payload 为 `PAYLOAD` 字节
pub fn opened(buffers: usize) -> (Arc<SimulatedSdk>, CaptureEngine) {
    let sdk = sdk();
    let engine = engine(&sdk, buffers);
    engine.open(CAMERA).expect("open");
    (sdk, engine)
}

/// 正在采集的引擎，启动过程中的调用记录已清空
pub fn acquiring(buffers: usize) -> (Arc<SimulatedSdk>, CaptureEngine) {
    let (sdk, engine) = opened(buffers);
    engine.start().expect("start");
    sdk.clear_calls();
    (sdk, engine)
}

pub fn count(sdk: &SimulatedSdk, pred: fn(&SdkCall) -> bool) -> usize {
    sdk.call_count(pred)
}

pub fn is_announce(c: &SdkCall) -> bool {
    matches!(c, SdkCall::Announce(_))
}

pub fn is_revoke(c: &SdkCall) -> bool {
    matches!(c, SdkCall::Revoke(_))
}

pub fn is_queue(c: &SdkCall) -> bool {
    matches!(c, SdkCall::QueueFrame(_))
}
