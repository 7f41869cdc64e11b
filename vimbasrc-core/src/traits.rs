use async_trait::async_trait;

use crate::builder::CameraConfig;
use crate::error::Result;
use crate::frame::Frame;
use crate::pixel_format::SupportedFormats;

/// SDK 枚举到的相机
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceInfo {
    /// SDK 相机 id，即 `Driver::open` 的参数
    pub id: String,

    /// 可读的型号名称
    pub name: String,

    /// 传输接口，如 "GigE" 或 "USB"
    pub interface: String,

    pub serial: Option<String>,
}

impl DeviceInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            interface: String::new(),
            serial: None,
        }
    }
}

/// 驱动入口：设备发现与打开
pub trait Driver: Send + Sync {
    fn list_devices(&self) -> Result<Vec<DeviceInfo>>;

    /// 打开相机并返回其数据面
    fn open(&self, id: &str, config: CameraConfig) -> Result<Box<dyn Stream>>;
}

/// 已打开相机的数据面
#[async_trait]
pub trait Stream: Send {
    /// 注册缓冲区，启动采集引擎，开始采集
    async fn start(&mut self) -> Result<()>;

    /// 尽力而为的拆除，会唤醒挂起的 `next_frame`
    async fn stop(&mut self) -> Result<()>;

    /// 下一帧。已停止或超时返回 `None`。
    async fn next_frame(&mut self) -> Result<Option<Frame>>;

    fn supported_formats(&self) -> Result<SupportedFormats>;
}

#[async_trait]
impl<S: Stream + ?Sized + Send> Stream for Box<S> {
    async fn start(&mut self) -> Result<()> {
        (**self).start().await
    }

    async fn stop(&mut self) -> Result<()> {
        (**self).stop().await
    }

    async fn next_frame(&mut self) -> Result<Option<Frame>> {
        (**self).next_frame().await
    }

    fn supported_formats(&self) -> Result<SupportedFormats> {
        (**self).supported_formats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// 回放固定的帧列表
    struct Replay {
        frames: Vec<Frame>,
        running: bool,
    }

    #[async_trait]
    impl Stream for Replay {
        async fn start(&mut self) -> Result<()> {
            self.running = true;
            Ok(())
        }

        async fn stop(&mut self) -> Result<()> {
            self.running = false;
            Ok(())
        }

        async fn next_frame(&mut self) -> Result<Option<Frame>> {
            if !self.running {
                return Ok(None);
            }
            Ok(self.frames.pop())
        }

        fn supported_formats(&self) -> Result<SupportedFormats> {
            Ok(SupportedFormats::from_device(&["Mono8"]))
        }
    }

    fn frame(id: u64) -> Frame {
        Frame {
            data: vec![0; 4],
            length: 4,
            pts: Duration::from_millis(id * 33),
            frame_id: id,
            device_timestamp: id,
        }
    }

    #[tokio::test]
    async fn boxed_stream_forwards_to_inner() -> anyhow::Result<()> {
        let mut stream: Box<dyn Stream> = Box::new(Replay {
            frames: vec![frame(2), frame(1)],
            running: false,
        });

        assert_eq!(stream.next_frame().await?, None);
        stream.start().await?;
        assert_eq!(stream.next_frame().await?.map(|f| f.frame_id), Some(1));
        assert_eq!(stream.supported_formats()?.raw, vec!["GRAY8"]);

        stream.stop().await?;
        assert_eq!(stream.next_frame().await?, None);
        Ok(())
    }
}
