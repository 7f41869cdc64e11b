use std::sync::Arc;

use vimbasrc_core::buffer::FrameBuffer;
use vimbasrc_core::error::{CameraError, Result};
use vimbasrc_core::sdk::{CameraSdk, DeviceHandle};

/// 单个采集会话向驱动注册的缓冲区
#[derive(Debug, Default)]
pub struct FrameBufferPool {
    buffers: Vec<Arc<FrameBuffer>>,
}

impl FrameBufferPool {
    /// 分配 `count` 个 `size` 字节的清零缓冲区并逐个注册。
    ///
    /// 全有或全无：任一步失败时，本次调用已注册的缓冲区全部撤销，缓冲池保持为空。
    pub fn allocate(
        sdk: &dyn CameraSdk,
        handle: DeviceHandle,
        count: usize,
        size: usize,
    ) -> Result<Self> {
        let mut pool = Self::default();
        pool.buffers.reserve(count);

        for slot in 0..count {
            let announced = FrameBuffer::new(slot, size).map(Arc::new).and_then(|buffer| {
                sdk.announce_frame(handle, &buffer)
                    .map(|()| buffer)
                    .map_err(|e| {
                        CameraError::AllocationFailure(format!("announce slot {slot}: {e}"))
                    })
            });

            match announced {
                Ok(buffer) => pool.buffers.push(buffer),
                Err(err) => {
                    let revoked = pool.revoke_all(sdk, handle);
                    tracing::warn!(
                        target: "vimbasrc::pool",
                        slot, revoked, error = %err,
                        "buffer announcement failed, pool rolled back"
                    );
                    return Err(err);
                }
            }
        }

        tracing::debug!(target: "vimbasrc::pool", count, size, "buffers announced");
        Ok(pool)
    }

    /// 撤销所有缓冲区并释放缓冲池的引用。
    /// 返回释放的数量。
    pub fn revoke_all(&mut self, sdk: &dyn CameraSdk, handle: DeviceHandle) -> usize {
        let count = self.buffers.len();
        for buffer in self.buffers.drain(..) {
            if let Err(e) = sdk.revoke_frame(handle, &buffer) {
                tracing::warn!(
                    target: "vimbasrc::pool",
                    slot = buffer.slot(), error = %e,
                    "revoke failed"
                );
            }
            buffer.set_queued(false);
        }
        count
    }

    pub fn buffers(&self) -> &[Arc<FrameBuffer>] {
        &self.buffers
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn buffer_size(&self) -> Option<usize> {
        self.buffers.first().map(|b| b.capacity())
    }

    /// 当前位于驱动队列中的缓冲区数量
    pub fn in_flight(&self) -> usize {
        self.buffers.iter().filter(|b| b.is_queued()).count()
    }

    /// flush 之后驱动不再持有任何缓冲区
    pub fn mark_all_idle(&self) {
        for buffer in &self.buffers {
            buffer.set_queued(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vimbasrc_core::sdk::{AccessMode, SdkError};
    use vimbasrc_simulation::{Fault, SdkCall, SimulatedCamera, SimulatedSdk};

    fn open() -> (SimulatedSdk, DeviceHandle) {
        let sdk = SimulatedSdk::new().with_camera(SimulatedCamera::new("DEV_1"));
        let handle = sdk.open_camera("DEV_1", AccessMode::Full).unwrap();
        (sdk, handle)
    }

    #[test]
    fn allocates_and_announces_every_buffer() {
        let (sdk, handle) = open();
        let pool = FrameBufferPool::allocate(&sdk, handle, 4, 1024).unwrap();

        assert_eq!(pool.len(), 4);
        assert_eq!(pool.buffer_size(), Some(1024));
        assert_eq!(pool.in_flight(), 0);
        assert_eq!(sdk.announced("DEV_1").len(), 4);
        let slots: Vec<usize> = pool.buffers().iter().map(|b| b.slot()).collect();
        assert_eq!(slots, vec![0, 1, 2, 3]);
    }

    #[test]
    fn failed_announce_revokes_partial_pool() {
        let (sdk, handle) = open();
        sdk.inject(Fault::AnnounceAt(2, SdkError::InternalFault));

        let err = FrameBufferPool::allocate(&sdk, handle, 5, 64).unwrap_err();
        assert!(matches!(err, CameraError::AllocationFailure(_)));
        assert!(sdk.announced("DEV_1").is_empty());
        assert_eq!(sdk.call_count(|c| matches!(c, SdkCall::Revoke(_))), 2);
    }

    #[test]
    fn oversized_allocation_is_reported_not_aborted() {
        let (sdk, handle) = open();
        let err = FrameBufferPool::allocate(&sdk, handle, 2, usize::MAX).unwrap_err();
        assert!(matches!(err, CameraError::AllocationFailure(_)));
        assert_eq!(sdk.call_count(|c| matches!(c, SdkCall::Announce(_))), 0);
    }

    #[test]
    fn revoke_all_empties_pool_and_is_repeatable() {
        let (sdk, handle) = open();
        let mut pool = FrameBufferPool::allocate(&sdk, handle, 3, 16).unwrap();

        assert_eq!(pool.revoke_all(&sdk, handle), 3);
        assert!(pool.is_empty());
        assert!(sdk.announced("DEV_1").is_empty());
        assert_eq!(pool.revoke_all(&sdk, handle), 0);
    }
}
