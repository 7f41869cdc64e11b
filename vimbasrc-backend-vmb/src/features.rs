//! 引擎依赖的少量 GenICam feature 的类型化访问

use vimbasrc_core::error::{CameraError, Result};
use vimbasrc_core::sdk::{CameraSdk, DeviceHandle, SdkError};

pub const PAYLOAD_SIZE: &str = "PayloadSize";
pub const WIDTH: &str = "Width";
pub const HEIGHT: &str = "Height";
pub const WIDTH_MAX: &str = "WidthMax";
pub const HEIGHT_MAX: &str = "HeightMax";
pub const PIXEL_FORMAT: &str = "PixelFormat";

pub const ACQUISITION_START: &str = "AcquisitionStart";
pub const ACQUISITION_STOP: &str = "AcquisitionStop";

/// 设备报告的传感器尺寸与当前像素格式
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct CameraGeometry {
    pub width: u32,
    pub height: u32,
    pub width_max: u32,
    pub height_max: u32,
    /// 设备格式名，如 "Mono8"
    pub pixel_format: String,
}

fn int_feature(sdk: &dyn CameraSdk, handle: DeviceHandle, name: &str) -> Result<i64> {
    sdk.feature_int_get(handle, name)
        .map_err(|e| e.into_camera_error(name))
}

fn dimension(sdk: &dyn CameraSdk, handle: DeviceHandle, name: &str) -> Result<u32> {
    let value = int_feature(sdk, handle, name)?;
    u32::try_from(value)
        .map_err(|_| CameraError::InternalFault(format!("{name} out of range: {value}")))
}

/// 驱动每帧写入的字节数。随尺寸和像素格式变化，每个会话重新查询。
pub fn payload_size(sdk: &dyn CameraSdk, handle: DeviceHandle) -> Result<usize> {
    let value = int_feature(sdk, handle, PAYLOAD_SIZE)?;
    match usize::try_from(value) {
        Ok(size) if size > 0 => Ok(size),
        _ => Err(CameraError::AllocationFailure(format!(
            "device reported payload size {value}"
        ))),
    }
}

pub fn load_geometry(sdk: &dyn CameraSdk, handle: DeviceHandle) -> Result<CameraGeometry> {
    let geometry = CameraGeometry {
        width: dimension(sdk, handle, WIDTH)?,
        height: dimension(sdk, handle, HEIGHT)?,
        width_max: dimension(sdk, handle, WIDTH_MAX)?,
        height_max: dimension(sdk, handle, HEIGHT_MAX)?,
        pixel_format: sdk
            .feature_enum_get(handle, PIXEL_FORMAT)
            .map_err(|e| e.into_camera_error(PIXEL_FORMAT))?,
    };
    tracing::debug!(target: "vimbasrc::engine", ?geometry, "geometry loaded");
    Ok(geometry)
}

/// 依次写入 Width、Height 和 PixelFormat。设备不能处于采集状态。
pub fn apply_format(
    sdk: &dyn CameraSdk,
    handle: DeviceHandle,
    width: u32,
    height: u32,
    device_format: &str,
) -> Result<()> {
    sdk.feature_int_set(handle, WIDTH, i64::from(width))
        .map_err(|e| e.into_camera_error(WIDTH))?;
    sdk.feature_int_set(handle, HEIGHT, i64::from(height))
        .map_err(|e| e.into_camera_error(HEIGHT))?;
    sdk.feature_enum_set(handle, PIXEL_FORMAT, device_format)
        .map_err(|e| match e {
            SdkError::NotFound => {
                CameraError::FormatNotSupported(device_format.to_owned())
            }
            other => other.into_camera_error(PIXEL_FORMAT),
        })?;
    tracing::info!(
        target: "vimbasrc::format",
        width, height, format = device_format,
        "format applied"
    );
    Ok(())
}
