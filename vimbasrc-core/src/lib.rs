#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod buffer;
pub mod builder;
pub mod error;
pub mod frame;
pub mod pixel_format;
pub mod sdk;
pub mod telemetry;
pub mod time;
pub mod traits;

pub mod prelude {
    pub use crate::buffer::FrameBuffer;
    pub use crate::builder::{CameraConfig, FormatRequest};
    pub use crate::error::{CameraError, Result};
    pub use crate::frame::{CapturedFrame, Frame, FrameInfo, FrameStatus};
    pub use crate::pixel_format::{FormatFamily, FormatTable, SupportedFormats};
    pub use crate::sdk::{AccessMode, CameraSdk, DeviceHandle, FrameDelegate, SdkError};
    pub use crate::traits::{DeviceInfo, Driver, Stream};
}

// 重新导出，保证各后端使用同一版本的宏实现 `Stream`
pub use async_trait::async_trait;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
