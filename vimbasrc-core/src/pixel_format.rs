use std::fmt::{self, Display};

/// 对消费者公布的像素格式族
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum FormatFamily {
    /// 完整像素 (`video/x-raw`)
    Raw,
    /// 单传感器马赛克读出 (`video/x-bayer`)，需要去马赛克
    Bayer,
}

impl FormatFamily {
    pub fn table(&self) -> &'static FormatTable {
        match self {
            Self::Raw => &RAW_FORMATS,
            Self::Bayer => &BAYER_FORMATS,
        }
    }

    pub fn media_type(&self) -> &'static str {
        match self {
            Self::Raw => "video/x-raw",
            Self::Bayer => "video/x-bayer",
        }
    }
}

impl Display for FormatFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.media_type())
    }
}

/// 一组 `(公开名, 设备名)` 映射
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatMapping {
    pub public: &'static str,
    pub device: &'static str,
}

const fn map(public: &'static str, device: &'static str) -> FormatMapping {
    FormatMapping { public, device }
}

/// 单个格式族的不可变双向映射表
#[derive(Debug)]
pub struct FormatTable {
    family: FormatFamily,
    entries: &'static [FormatMapping],
}

pub static RAW_FORMATS: FormatTable = FormatTable {
    family: FormatFamily::Raw,
    entries: &[
        map("GRAY8", "Mono8"),
        map("RGB", "RGB8Packed"),
        map("BGR", "BGR8Packed"),
        map("RGBA", "RGBA8Packed"),
        map("BGRA", "BGRA8Packed"),
        map("Y41P", "YUV411Packed"),
        map("YUY2", "YUV422Packed"),
        map("IYU2", "YUV444Packed"),
    ],
};

pub static BAYER_FORMATS: FormatTable = FormatTable {
    family: FormatFamily::Bayer,
    entries: &[
        map("gbrg", "BayerGB8"),
        map("rggb", "BayerRG8"),
        map("grbg", "BayerGR8"),
        map("bggr", "BayerBG8"),
    ],
};

impl FormatTable {
    pub fn family(&self) -> FormatFamily {
        self.family
    }

    pub fn entries(&self) -> &'static [FormatMapping] {
        self.entries
    }

    /// 设备格式名 -> 公开格式名
    pub fn to_public(&self, device: &str) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|m| m.device == device)
            .map(|m| m.public)
    }

    /// 公开格式名 -> 设备格式名
    pub fn to_device(&self, public: &str) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|m| m.public == public)
            .map(|m| m.device)
    }

    /// 保留本表认识的设备格式，按设备顺序映射为公开格式名。
    pub fn supported_public_formats<S: AsRef<str>>(&self, device_formats: &[S]) -> Vec<&'static str> {
        device_formats
            .iter()
            .filter_map(|f| self.to_public(f.as_ref()))
            .collect()
    }
}

/// 设备当前可输出的格式 (以公开格式名表示)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct SupportedFormats {
    pub raw: Vec<&'static str>,
    pub bayer: Vec<&'static str>,
}

impl SupportedFormats {
    pub fn from_device<S: AsRef<str>>(device_formats: &[S]) -> Self {
        Self {
            raw: RAW_FORMATS.supported_public_formats(device_formats),
            bayer: BAYER_FORMATS.supported_public_formats(device_formats),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty() && self.bayer.is_empty()
    }

    pub fn contains(&self, family: FormatFamily, public: &str) -> bool {
        let list = match family {
            FormatFamily::Raw => &self.raw,
            FormatFamily::Bayer => &self.bayer,
        };
        list.iter().any(|f| *f == public)
    }
}
