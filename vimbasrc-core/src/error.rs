use thiserror::Error;

use crate::frame::FrameStatus;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Camera {0} not found")]
    DeviceNotFound(String),

    #[error("Access to camera {0} denied")]
    AccessDenied(String),

    #[error("Invalid device handle")]
    BadHandle,

    #[error("Feature {0} has a different type")]
    WrongFeatureType(String),

    #[error("SDK struct size mismatch")]
    StructSizeMismatch,

    #[error("SDK call timed out")]
    Timeout,

    #[error("SDK not started")]
    ApiNotStarted,

    #[error("Frame buffer allocation failed: {0}")]
    AllocationFailure(String),

    /// 单帧接收异常。只计数，不会从会话调用中返回。
    #[error("Frame {frame_id} anomaly: {status:?}")]
    FrameAnomaly { frame_id: u64, status: FrameStatus },

    #[error("Operation {operation} not allowed in state {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("Format not supported: {0}")]
    FormatNotSupported(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("SDK internal fault: {0}")]
    InternalFault(String),
}

pub type Result<T> = std::result::Result<T, CameraError>;
