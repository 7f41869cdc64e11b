use std::collections::HashMap;

use vimbasrc_core::sdk::{SdkError, SdkResult};
use vimbasrc_core::traits::DeviceInfo;

#[derive(Debug, Clone, PartialEq)]
pub enum FeatureValue {
    Int(i64),
    Float(f64),
    Enum(String),
    Str(String),
}

/// 由 [`crate::SimulatedSdk`] 暴露的脚本化相机
#[derive(Debug, Clone)]
pub struct SimulatedCamera {
    pub(crate) info: DeviceInfo,
    pub(crate) features: HashMap<String, FeatureValue>,
    pub(crate) enum_ranges: HashMap<String, Vec<String>>,
    pub(crate) locked: bool,
    /// 未固定时 PayloadSize 随 Width/Height/PixelFormat 变化
    pub(crate) derived_payload: bool,
}

impl SimulatedCamera {
    /// 640x480 Mono8 相机，同时提供 raw 与 Bayer 格式
    pub fn new(id: &str) -> Self {
        let mut features = HashMap::new();
        features.insert("Width".to_owned(), FeatureValue::Int(640));
        features.insert("Height".to_owned(), FeatureValue::Int(480));
        features.insert("WidthMax".to_owned(), FeatureValue::Int(1936));
        features.insert("HeightMax".to_owned(), FeatureValue::Int(1216));
        features.insert("OffsetX".to_owned(), FeatureValue::Int(0));
        features.insert("OffsetY".to_owned(), FeatureValue::Int(0));
        features.insert("ExposureTimeAbs".to_owned(), FeatureValue::Float(15000.0));
        features.insert("PixelFormat".to_owned(), FeatureValue::Enum("Mono8".to_owned()));
        features.insert("DeviceModelName".to_owned(), FeatureValue::Str("Sim 1".to_owned()));

        let mut enum_ranges = HashMap::new();
        enum_ranges.insert(
            "PixelFormat".to_owned(),
            ["Mono8", "Mono12", "BayerRG8", "RGB8Packed", "BayerRG12", "YUV422Packed"]
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
        );

        let mut camera = Self {
            info: DeviceInfo {
                id: id.to_owned(),
                name: "Simulated Camera".to_owned(),
                interface: "Simulated".to_owned(),
                serial: Some(format!("SIM-{id}")),
            },
            features,
            enum_ranges,
            locked: false,
            derived_payload: true,
        };
        camera.refresh_payload();
        camera
    }

    /// 固定 PayloadSize，不随尺寸变化
    pub fn payload_size(mut self, size: i64) -> Self {
        self.derived_payload = false;
        self.features
            .insert("PayloadSize".to_owned(), FeatureValue::Int(size));
        self
    }

    pub fn pixel_formats(mut self, formats: &[&str]) -> Self {
        self.enum_ranges.insert(
            "PixelFormat".to_owned(),
            formats.iter().map(|s| (*s).to_owned()).collect(),
        );
        self
    }

    pub fn feature(mut self, name: &str, value: FeatureValue) -> Self {
        self.features.insert(name.to_owned(), value);
        self.refresh_payload();
        self
    }

    /// 已被其他进程占用，`open_camera` 返回 `InvalidAccess`
    pub fn locked(mut self) -> Self {
        self.locked = true;
        self
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub(crate) fn get(&self, name: &str) -> SdkResult<&FeatureValue> {
        self.features.get(name).ok_or(SdkError::NotFound)
    }

    pub(crate) fn set(&mut self, name: &str, value: FeatureValue) -> SdkResult<()> {
        let current = self.features.get(name).ok_or(SdkError::NotFound)?;
        if std::mem::discriminant(current) != std::mem::discriminant(&value) {
            return Err(SdkError::WrongType);
        }
        if let FeatureValue::Enum(v) = &value {
            let allowed = self.enum_ranges.get(name).map_or(true, |r| r.contains(v));
            if !allowed {
                return Err(SdkError::NotFound);
            }
        }
        self.features.insert(name.to_owned(), value);
        self.refresh_payload();
        Ok(())
    }

    fn refresh_payload(&mut self) {
        if !self.derived_payload {
            return;
        }
        let int = |name: &str| match self.features.get(name) {
            Some(FeatureValue::Int(v)) => *v,
            _ => 0,
        };
        let (width, height) = (int("Width"), int("Height"));
        let format = match self.features.get("PixelFormat") {
            Some(FeatureValue::Enum(f)) => f.as_str(),
            _ => "Mono8",
        };
        // 每像素字节数乘 2，保证 4:1:1 为整数
        let doubled = match format {
            "RGB8Packed" | "BGR8Packed" | "YUV444Packed" => 6,
            "RGBA8Packed" | "BGRA8Packed" => 8,
            "YUV422Packed" | "Mono12" | "BayerRG12" => 4,
            "YUV411Packed" => 3,
            _ => 2,
        };
        self.features.insert(
            "PayloadSize".to_owned(),
            FeatureValue::Int(width * height * doubled / 2),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_tracks_geometry_and_format() {
        let mut cam = SimulatedCamera::new("DEV_1");
        assert_eq!(cam.get("PayloadSize").unwrap(), &FeatureValue::Int(640 * 480));

        cam.set("PixelFormat", FeatureValue::Enum("RGB8Packed".into())).unwrap();
        cam.set("Width", FeatureValue::Int(320)).unwrap();
        assert_eq!(cam.get("PayloadSize").unwrap(), &FeatureValue::Int(320 * 480 * 3));
    }

    #[test]
    fn pinned_payload_ignores_geometry() {
        let mut cam = SimulatedCamera::new("DEV_1").payload_size(1024);
        cam.set("Width", FeatureValue::Int(100)).unwrap();
        assert_eq!(cam.get("PayloadSize").unwrap(), &FeatureValue::Int(1024));
    }

    #[test]
    fn wrong_type_and_unknown_enum_value_rejected() {
        let mut cam = SimulatedCamera::new("DEV_1");
        assert_eq!(
            cam.set("Width", FeatureValue::Float(1.0)),
            Err(SdkError::WrongType)
        );
        assert_eq!(
            cam.set("PixelFormat", FeatureValue::Enum("BGRA8Packed".into())),
            Err(SdkError::NotFound)
        );
    }
}
