use std::time::Duration;

use crate::error::{CameraError, Result};
use crate::pixel_format::FormatFamily;
use crate::sdk::AccessMode;

/// 每个会话可注册的缓冲区上限
pub const MAX_BUFFER_COUNT: usize = 64;

/// 协商完成后消费者请求的采集尺寸与格式
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct FormatRequest {
    pub width: u32,
    pub height: u32,
    pub family: FormatFamily,
    /// 公开格式名，如 "GRAY8" 或 "rggb"
    pub format: String,
}

impl FormatRequest {
    pub fn new(width: u32, height: u32, family: FormatFamily, format: impl Into<String>) -> Self {
        Self {
            width,
            height,
            family,
            format: format.into(),
        }
    }

    /// 请求的公开格式对应的设备格式名
    pub fn device_format(&self) -> Result<&'static str> {
        self.family
            .table()
            .to_device(&self.format)
            .ok_or_else(|| CameraError::FormatNotSupported(format!("{} {}", self.family, self.format)))
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialize", serde(default))]
pub struct CameraConfig {
    /// 每个会话注册的缓冲区数量，默认 5
    pub buffer_count: usize,
    /// 单次阻塞取帧的超时时间
    pub frame_timeout: Duration,
    pub access_mode: AccessMode,
    /// 设置后在 `open()` 之后立即应用
    pub format: Option<FormatRequest>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraConfig {
    pub fn new() -> Self {
        Self {
            buffer_count: 5,
            frame_timeout: Duration::from_millis(1000),
            access_mode: AccessMode::Full,
            format: None,
        }
    }

    pub fn buffer_count(mut self, count: usize) -> Self {
        self.buffer_count = count;
        self
    }

    pub fn frame_timeout(mut self, timeout: Duration) -> Self {
        self.frame_timeout = timeout;
        self
    }

    pub fn access_mode(mut self, mode: AccessMode) -> Self {
        self.access_mode = mode;
        self
    }

    pub fn format(mut self, request: FormatRequest) -> Self {
        self.format = Some(request);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.buffer_count == 0 || self.buffer_count > MAX_BUFFER_COUNT {
            return Err(CameraError::InvalidConfig(format!(
                "buffer_count must be within 1..={MAX_BUFFER_COUNT}, got {}",
                self.buffer_count
            )));
        }
        if self.frame_timeout.is_zero() {
            return Err(CameraError::InvalidConfig(
                "frame_timeout must be non-zero".into(),
            ));
        }
        if let Some(request) = &self.format {
            request.device_format()?;
        }
        Ok(())
    }

    #[cfg(feature = "serialize")]
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| CameraError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    #[cfg(feature = "serialize")]
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| CameraError::InvalidConfig(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = CameraConfig::default();
        assert_eq!(config.buffer_count, 5);
        assert_eq!(config.frame_timeout, Duration::from_secs(1));
        config.validate().unwrap();
    }

    #[test]
    fn zero_buffers_rejected() {
        let err = CameraConfig::new().buffer_count(0).validate().unwrap_err();
        assert!(matches!(err, CameraError::InvalidConfig(_)));
    }

    #[test]
    fn unknown_format_rejected() {
        let config =
            CameraConfig::new().format(FormatRequest::new(640, 480, FormatFamily::Raw, "NV12"));
        assert!(matches!(
            config.validate(),
            Err(CameraError::FormatNotSupported(_))
        ));
    }

    #[test]
    fn request_translates_to_device_format() {
        let request = FormatRequest::new(640, 480, FormatFamily::Bayer, "rggb");
        assert_eq!(request.device_format().unwrap(), "BayerRG8");
    }

    #[cfg(feature = "serialize")]
    #[test]
    fn json_round_trip_keeps_fields() -> anyhow::Result<()> {
        let config = CameraConfig::new()
            .buffer_count(3)
            .frame_timeout(Duration::from_millis(250))
            .format(FormatRequest::new(1280, 720, FormatFamily::Raw, "GRAY8"));

        let text = config.to_json()?;
        let back = CameraConfig::from_json(&text)?;
        assert_eq!(back, config);
        Ok(())
    }

    #[cfg(feature = "serialize")]
    #[test]
    fn partial_json_falls_back_to_defaults() -> anyhow::Result<()> {
        let config = CameraConfig::from_json(r#"{ "buffer_count": 4 }"#)?;
        assert_eq!(config.buffer_count, 4);
        assert_eq!(config.access_mode, AccessMode::Full);
        Ok(())
    }
}
