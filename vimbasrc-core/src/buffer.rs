use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crate::error::{CameraError, Result};
use crate::frame::{CapturedFrame, FrameInfo, FrameStatus};

/// 向驱动注册 (announce) 的帧内存
///
/// 以 `Arc<FrameBuffer>` 形式在缓冲池与驱动之间共享。最后一个持有者释放时内存才被回收，
/// 因此 revoke 与迟到的完成回调并发时也不会重复释放。
pub struct FrameBuffer {
    slot: usize,
    capacity: usize,
    queued: AtomicBool,
    inner: Mutex<Slot>,
}

struct Slot {
    data: Vec<u8>,
    info: FrameInfo,
}

impl FrameBuffer {
    /// 分配 `capacity` 字节的清零内存。分配器拒绝时返回 `AllocationFailure`，而不是直接 abort。
    pub fn new(slot: usize, capacity: usize) -> Result<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(capacity).map_err(|err| {
            CameraError::AllocationFailure(format!("slot {slot}, {capacity} bytes: {err}"))
        })?;
        data.resize(capacity, 0);

        Ok(Self {
            slot,
            capacity,
            queued: AtomicBool::new(false),
            inner: Mutex::new(Slot {
                data,
                info: FrameInfo::default(),
            }),
        })
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 缓冲区当前是否位于驱动的采集队列中
    pub fn is_queued(&self) -> bool {
        self.queued.load(Ordering::Acquire)
    }

    pub fn set_queued(&self, queued: bool) {
        self.queued.store(queued, Ordering::Release);
    }

    pub fn info(&self) -> FrameInfo {
        self.lock().info
    }

    /// 驱动侧：写入收到的 payload 及其完成元数据。
    ///
    /// 超出缓冲区容量的 payload 会被截断，状态强制为 `TooSmall`。
    pub fn fill(&self, payload: &[u8], frame_id: u64, timestamp: u64, status: FrameStatus) {
        let mut slot = self.lock();
        let len = payload.len().min(self.capacity);
        slot.data[..len].copy_from_slice(&payload[..len]);

        let status = if payload.len() > self.capacity {
            tracing::debug!(
                target: "vimbasrc::pool",
                slot = self.slot, frame_id, payload = payload.len(), capacity = self.capacity,
                "payload truncated"
            );
            FrameStatus::TooSmall
        } else {
            status
        };
        slot.info = FrameInfo {
            frame_id,
            status,
            image_size: len,
            timestamp,
        };
    }

    /// 拷贝出有效 payload。交给消费者的是这份拷贝，缓冲区本身立即归还驱动。
    pub fn copy_out(&self) -> CapturedFrame {
        let slot = self.lock();
        CapturedFrame {
            frame_id: slot.info.frame_id,
            data: slot.data[..slot.info.image_size].to_vec(),
            status: slot.info.status,
            device_timestamp: slot.info.timestamp,
            arrival: Instant::now(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("slot", &self.slot)
            .field("capacity", &self.capacity)
            .field("queued", &self.is_queued())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_buffer_is_zeroed_and_idle() {
        let buf = FrameBuffer::new(2, 16).unwrap();
        assert_eq!(buf.slot(), 2);
        assert_eq!(buf.capacity(), 16);
        assert!(!buf.is_queued());
        assert!(buf.lock().data.iter().all(|b| *b == 0));
        assert_eq!(buf.info().status, FrameStatus::Invalid);
    }

    #[test]
    fn copy_out_is_detached_from_buffer() {
        let buf = FrameBuffer::new(0, 8).unwrap();
        buf.fill(&[9, 9, 9, 9], 7, 1234, FrameStatus::Complete);

        let copy = buf.copy_out();
        buf.fill(&[1, 1, 1, 1, 1], 8, 1300, FrameStatus::Complete);

        assert_eq!(copy.frame_id, 7);
        assert_eq!(copy.data, vec![9, 9, 9, 9]);
        assert_eq!(copy.device_timestamp, 1234);
        assert_eq!(buf.info().frame_id, 8);
    }

    #[test]
    fn oversized_payload_is_truncated_and_flagged() {
        let buf = FrameBuffer::new(0, 4).unwrap();
        buf.fill(&[1, 2, 3, 4, 5, 6], 1, 0, FrameStatus::Complete);

        let info = buf.info();
        assert_eq!(info.status, FrameStatus::TooSmall);
        assert_eq!(info.image_size, 4);
    }

    #[test]
    fn absurd_capacity_reports_allocation_failure() {
        let err = FrameBuffer::new(0, usize::MAX).unwrap_err();
        assert!(matches!(err, CameraError::AllocationFailure(_)));
    }
}
