use std::time::{Duration, Instant};

/// 驱动为每个已提交缓冲区报告的接收状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameStatus {
    Complete,
    Incomplete,
    /// 注册的缓冲区小于 payload
    TooSmall,
    Invalid,
    /// SDK 文档中未定义或表示错误的其他状态码
    Unknown(i32),
}

impl FrameStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

/// 驱动随 payload 一起写入的完成元数据
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub frame_id: u64,
    pub status: FrameStatus,
    /// payload 有效字节数，不会超过缓冲区容量
    pub image_size: usize,
    /// 曝光时刻的设备时钟 tick
    pub timestamp: u64,
}

impl Default for FrameInfo {
    fn default() -> Self {
        Self {
            frame_id: 0,
            status: FrameStatus::Invalid,
            image_size: 0,
            timestamp: 0,
        }
    }
}

/// 已完成帧的独立拷贝，与来源驱动缓冲区不再有关联
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    pub frame_id: u64,
    pub data: Vec<u8>,
    pub status: FrameStatus,
    pub device_timestamp: u64,
    /// 回调从驱动缓冲区拷出 payload 的时刻
    pub arrival: Instant,
}

impl CapturedFrame {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// 交给消费者的帧：payload 加运行时间戳
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub data: Vec<u8>,
    pub length: usize,
    /// 距采集开始的时间
    pub pts: Duration,
    pub frame_id: u64,
    pub device_timestamp: u64,
}

impl Frame {
    pub fn from_captured(frame: CapturedFrame, pts: Duration) -> Self {
        Self {
            length: frame.data.len(),
            data: frame.data,
            pts,
            frame_id: frame.frame_id,
            device_timestamp: frame.device_timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_takes_over_captured_payload() {
        let captured = CapturedFrame {
            frame_id: 7,
            data: vec![1, 2, 3],
            status: FrameStatus::Complete,
            device_timestamp: 900,
            arrival: Instant::now(),
        };
        let frame = Frame::from_captured(captured, Duration::from_millis(33));

        assert_eq!(frame.frame_id, 7);
        assert_eq!(frame.length, 3);
        assert_eq!(frame.data, vec![1, 2, 3]);
        assert_eq!(frame.device_timestamp, 900);
        assert_eq!(frame.pts, Duration::from_millis(33));
    }

    #[test]
    fn only_complete_counts_as_complete() {
        assert!(FrameStatus::Complete.is_complete());
        assert!(!FrameStatus::Incomplete.is_complete());
        assert!(!FrameStatus::Unknown(-3).is_complete());
    }
}
