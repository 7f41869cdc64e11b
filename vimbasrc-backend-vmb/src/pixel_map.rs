use vimbasrc_core::error::Result;
use vimbasrc_core::pixel_format::{FormatFamily, SupportedFormats};
use vimbasrc_core::sdk::{CameraSdk, DeviceHandle};

use crate::features::{self, CameraGeometry};

/// 读取设备的 PixelFormat 取值范围，保留有公开名的格式，按设备顺序。
pub fn supported_formats(sdk: &dyn CameraSdk, handle: DeviceHandle) -> Result<SupportedFormats> {
    let device_formats = sdk
        .feature_enum_range(handle, features::PIXEL_FORMAT)
        .map_err(|e| e.into_camera_error(features::PIXEL_FORMAT))?;

    let supported = SupportedFormats::from_device(device_formats.as_slice());
    let dropped = device_formats
        .len()
        .saturating_sub(supported.raw.len() + supported.bayer.len());
    if dropped > 0 {
        tracing::debug!(
            target: "vimbasrc::format",
            dropped,
            "device formats without a public mapping ignored"
        );
    }
    Ok(supported)
}

/// 用于协商的能力描述
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct CaptureCaps {
    pub raw: Vec<&'static str>,
    pub bayer: Vec<&'static str>,
    pub max_width: u32,
    pub max_height: u32,
    /// SDK 不提供帧率查询，固定为 30/1
    pub framerate: (u32, u32),
}

pub const DEFAULT_FRAMERATE: (u32, u32) = (30, 1);

impl CaptureCaps {
    pub fn new(formats: SupportedFormats, geometry: &CameraGeometry) -> Self {
        Self {
            raw: formats.raw,
            bayer: formats.bayer,
            max_width: geometry.width_max,
            max_height: geometry.height_max,
            framerate: DEFAULT_FRAMERATE,
        }
    }

    pub fn formats(&self, family: FormatFamily) -> &[&'static str] {
        match family {
            FormatFamily::Raw => &self.raw,
            FormatFamily::Bayer => &self.bayer,
        }
    }

    /// `format` 格式下 `width`x`height` 的请求是否在传感器范围内
    pub fn accepts(&self, family: FormatFamily, format: &str, width: u32, height: u32) -> bool {
        width > 0
            && height > 0
            && width <= self.max_width
            && height <= self.max_height
            && self.formats(family).contains(&format)
    }
}
