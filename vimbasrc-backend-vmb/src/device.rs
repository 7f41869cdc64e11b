use vimbasrc_core::error::{CameraError, Result};
use vimbasrc_core::sdk::CameraSdk;
use vimbasrc_core::traits::DeviceInfo;

/// SDK 当前可见的相机
pub fn list_devices(sdk: &dyn CameraSdk) -> Result<Vec<DeviceInfo>> {
    let devices = sdk
        .list_cameras()
        .map_err(|e| e.into_camera_error("camera list"))?;
    tracing::debug!(target: "vimbasrc::engine", count = devices.len(), "cameras discovered");
    Ok(devices)
}

/// 在已发现的相机中查找 `id`，不打开设备
pub fn find_device(sdk: &dyn CameraSdk, id: &str) -> Result<DeviceInfo> {
    list_devices(sdk)?
        .into_iter()
        .find(|d| d.id == id)
        .ok_or_else(|| {
            tracing::warn!(target: "vimbasrc::engine", camera = id, "camera not in discovered set");
            CameraError::DeviceNotFound(id.to_owned())
        })
}
