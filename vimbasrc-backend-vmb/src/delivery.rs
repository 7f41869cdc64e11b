//! 绑定到单个采集会话的完成回调

use std::sync::Arc;

use vimbasrc_core::buffer::FrameBuffer;
use vimbasrc_core::frame::FrameStatus;
use vimbasrc_core::sdk::{CameraSdk, DeviceHandle, FrameDelegate, SdkResult};
use vimbasrc_core::telemetry::CaptureTelemetry;

use crate::queue::FrameQueue;

/// 运行在驱动投递线程上。把完成帧的 payload 拷入会话队列，
/// 并把每个缓冲区立即交还驱动。
///
/// 从不获取引擎的配置锁。
pub(crate) struct FrameDelivery {
    sdk: Arc<dyn CameraSdk>,
    queue: Arc<FrameQueue>,
    telemetry: Arc<CaptureTelemetry>,
}

impl FrameDelivery {
    pub(crate) fn new(
        sdk: Arc<dyn CameraSdk>,
        queue: Arc<FrameQueue>,
        telemetry: Arc<CaptureTelemetry>,
    ) -> Arc<Self> {
        Arc::new(Self {
            sdk,
            queue,
            telemetry,
        })
    }

    /// 把 `buffer` 连同本回调一起交给驱动
    pub(crate) fn submit(
        self: &Arc<Self>,
        handle: DeviceHandle,
        buffer: &Arc<FrameBuffer>,
    ) -> SdkResult<()> {
        buffer.set_queued(true);
        let delegate: Arc<dyn FrameDelegate> = Arc::clone(self) as Arc<dyn FrameDelegate>;
        self.sdk
            .queue_frame(handle, Arc::clone(buffer), delegate)
            .inspect_err(|_| buffer.set_queued(false))
    }
}

impl std::fmt::Debug for FrameDelivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameDelivery")
            .field("queue_closed", &self.queue.is_closed())
            .finish()
    }
}

impl FrameDelegate for FrameDelivery {
    fn frame_done(self: Arc<Self>, handle: DeviceHandle, buffer: Arc<FrameBuffer>) {
        buffer.set_queued(false);
        let info = buffer.info();

        match info.status {
            FrameStatus::Complete => {
                if self.queue.push(buffer.copy_out()) {
                    self.telemetry.record_delivered();
                } else {
                    self.telemetry.record_dropped();
                    tracing::trace!(
                        target: "vimbasrc::delivery",
                        frame_id = info.frame_id,
                        "session closed, frame dropped"
                    );
                }
            }
            status => {
                self.telemetry.record_anomaly(status);
                tracing::debug!(
                    target: "vimbasrc::delivery",
                    frame_id = info.frame_id,
                    ?status,
                    "frame anomaly"
                );
            }
        }

        // 会话拆除后驱动会拒绝该缓冲区，这是预期情况，不告警
        if let Err(e) = self.submit(handle, &buffer) {
            self.telemetry.record_requeue_failure();
            if self.queue.is_closed() {
                tracing::trace!(target: "vimbasrc::delivery", slot = buffer.slot(), error = %e, "re-queue after close");
            } else {
                tracing::warn!(
                    target: "vimbasrc::delivery",
                    slot = buffer.slot(),
                    frame_id = info.frame_id,
                    error = %e,
                    "failed to re-queue frame buffer"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use vimbasrc_core::sdk::{AccessMode, SdkError};
    use vimbasrc_simulation::{Fault, SdkCall, SimulatedCamera, SimulatedSdk};

    use crate::queue::Pop;

    struct Session {
        sdk: Arc<SimulatedSdk>,
        queue: Arc<FrameQueue>,
        telemetry: Arc<CaptureTelemetry>,
        buffer: Arc<FrameBuffer>,
    }

    fn streaming_session() -> Session {
        let sdk = Arc::new(
            SimulatedSdk::new().with_camera(SimulatedCamera::new("DEV_1").payload_size(16)),
        );
        let handle = sdk.open_camera("DEV_1", AccessMode::Full).unwrap();
        let buffer = Arc::new(FrameBuffer::new(0, 16).unwrap());
        sdk.announce_frame(handle, &buffer).unwrap();
        sdk.capture_start(handle).unwrap();
        sdk.run_command(handle, "AcquisitionStart").unwrap();

        let queue = Arc::new(FrameQueue::new());
        let telemetry = Arc::new(CaptureTelemetry::new());
        let delivery = FrameDelivery::new(sdk.clone(), queue.clone(), telemetry.clone());
        delivery.submit(handle, &buffer).unwrap();
        assert!(buffer.is_queued());

        Session {
            sdk,
            queue,
            telemetry,
            buffer,
        }
    }

    #[test]
    fn complete_frame_is_copied_and_buffer_requeued() {
        let s = streaming_session();
        s.sdk.clear_calls();

        assert_eq!(s.sdk.emit_frame_as(7, FrameStatus::Complete, &[9; 16]), Some(7));

        match s.queue.pop(Duration::from_millis(100)) {
            Pop::Frame(frame) => {
                assert_eq!(frame.frame_id, 7);
                assert_eq!(frame.data, vec![9; 16]);
            }
            other => panic!("expected a frame, got {other:?}"),
        }
        assert_eq!(s.sdk.calls(), vec![SdkCall::QueueFrame(0)]);
        assert!(s.buffer.is_queued());
        assert_eq!(s.telemetry.snapshot().delivered, 1);
    }

    #[test]
    fn incomplete_frame_is_counted_not_delivered() {
        let s = streaming_session();
        s.sdk.emit_frame(FrameStatus::Incomplete).unwrap();

        assert!(s.queue.is_empty());
        assert_eq!(s.sdk.pending_buffers(), 1);
        let snap = s.telemetry.snapshot();
        assert_eq!((snap.delivered, snap.incomplete), (0, 1));
    }

    #[test]
    fn requeue_failure_is_counted_not_propagated() {
        let s = streaming_session();
        s.sdk.inject(Fault::QueueFrame(SdkError::InternalFault));
        s.sdk.emit_frame(FrameStatus::Complete).unwrap();

        assert_eq!(s.queue.len(), 1);
        assert!(!s.buffer.is_queued());
        assert_eq!(s.telemetry.snapshot().requeue_failures, 1);
    }

    #[test]
    fn frames_after_close_are_dropped() {
        let s = streaming_session();
        s.queue.close();
        s.sdk.emit_frame(FrameStatus::Complete).unwrap();

        assert!(s.queue.is_empty());
        assert_eq!(s.telemetry.snapshot().dropped_closed, 1);
    }
}
