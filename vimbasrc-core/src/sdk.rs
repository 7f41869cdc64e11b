//! 厂商相机 SDK 的能力接口
//!
//! 引擎只通过 [`CameraSdk`] 访问硬件。真实传输层与进程内仿真器都实现了它。

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::buffer::FrameBuffer;
use crate::error::CameraError;
use crate::traits::DeviceInfo;

/// SDK 调用可能返回的错误码
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SdkError {
    #[error("not found")]
    NotFound,
    #[error("invalid access")]
    InvalidAccess,
    #[error("bad handle")]
    BadHandle,
    #[error("wrong type")]
    WrongType,
    #[error("struct size mismatch")]
    StructSizeMismatch,
    #[error("timeout")]
    Timeout,
    #[error("api not started")]
    ApiNotStarted,
    #[error("internal fault")]
    InternalFault,
}

impl SdkError {
    /// 将 SDK 错误码映射为公开错误类型。`subject` 是本次调用涉及的相机 id 或 feature 名。
    pub fn into_camera_error(self, subject: &str) -> CameraError {
        match self {
            Self::NotFound => CameraError::DeviceNotFound(subject.to_owned()),
            Self::InvalidAccess => CameraError::AccessDenied(subject.to_owned()),
            Self::BadHandle => CameraError::BadHandle,
            Self::WrongType => CameraError::WrongFeatureType(subject.to_owned()),
            Self::StructSizeMismatch => CameraError::StructSizeMismatch,
            Self::Timeout => CameraError::Timeout,
            Self::ApiNotStarted => CameraError::ApiNotStarted,
            Self::InternalFault => CameraError::InternalFault(subject.to_owned()),
        }
    }
}

pub type SdkResult<T> = std::result::Result<T, SdkError>;

/// 已打开相机的不透明句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(u64);

impl DeviceHandle {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum AccessMode {
    #[default]
    Full,
    Read,
    Config,
}

/// 绑定到单个采集会话的完成回调
///
/// 驱动在自己的投递线程上，对每个入队缓冲区恰好调用一次 `frame_done`。
/// 实现不得阻塞，也不得 panic。
pub trait FrameDelegate: Send + Sync {
    fn frame_done(self: Arc<Self>, handle: DeviceHandle, buffer: Arc<FrameBuffer>);
}

/// 引擎用到的厂商 SDK 调用
pub trait CameraSdk: Send + Sync {
    fn list_cameras(&self) -> SdkResult<Vec<DeviceInfo>>;

    fn open_camera(&self, id: &str, mode: AccessMode) -> SdkResult<DeviceHandle>;
    fn close_camera(&self, handle: DeviceHandle) -> SdkResult<()>;

    /// 注册缓冲区，之后驱动才能写入
    fn announce_frame(&self, handle: DeviceHandle, buffer: &Arc<FrameBuffer>) -> SdkResult<()>;
    /// 注销缓冲区，之后驱动不再持有它
    fn revoke_frame(&self, handle: DeviceHandle, buffer: &Arc<FrameBuffer>) -> SdkResult<()>;

    fn capture_start(&self, handle: DeviceHandle) -> SdkResult<()>;
    fn capture_end(&self, handle: DeviceHandle) -> SdkResult<()>;
    /// 归还所有排队中的缓冲区，不触发回调
    fn capture_queue_flush(&self, handle: DeviceHandle) -> SdkResult<()>;

    fn queue_frame(
        &self,
        handle: DeviceHandle,
        buffer: Arc<FrameBuffer>,
        delegate: Arc<dyn FrameDelegate>,
    ) -> SdkResult<()>;

    fn run_command(&self, handle: DeviceHandle, name: &str) -> SdkResult<()>;

    fn feature_int_get(&self, handle: DeviceHandle, name: &str) -> SdkResult<i64>;
    fn feature_int_set(&self, handle: DeviceHandle, name: &str, value: i64) -> SdkResult<()>;
    fn feature_float_get(&self, handle: DeviceHandle, name: &str) -> SdkResult<f64>;
    fn feature_float_set(&self, handle: DeviceHandle, name: &str, value: f64) -> SdkResult<()>;
    fn feature_enum_get(&self, handle: DeviceHandle, name: &str) -> SdkResult<String>;
    fn feature_enum_set(&self, handle: DeviceHandle, name: &str, value: &str) -> SdkResult<()>;
    fn feature_string_get(&self, handle: DeviceHandle, name: &str) -> SdkResult<String>;
    fn feature_string_set(&self, handle: DeviceHandle, name: &str, value: &str)
        -> SdkResult<()>;

    /// 枚举 feature 当前可接受的取值，按设备顺序
    fn feature_enum_range(&self, handle: DeviceHandle, name: &str) -> SdkResult<Vec<String>>;
}
