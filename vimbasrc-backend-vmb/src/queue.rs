//! 驱动投递线程与消费者之间的交接通道

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crossbeam_channel::{select, unbounded, Receiver, Sender};

use vimbasrc_core::frame::CapturedFrame;

/// 一次 [`FrameQueue::pop`] 的结果
#[derive(Debug)]
pub enum Pop {
    Frame(CapturedFrame),
    /// 会话已结束，该队列不会再有帧
    Closed,
    TimedOut,
}

/// 单个采集会话的完成帧拷贝 FIFO
///
/// `push` 从不阻塞。`close` 断开唤醒通道，一次性释放所有阻塞中的 `pop`。
#[derive(Debug)]
pub struct FrameQueue {
    frames_tx: Sender<CapturedFrame>,
    frames_rx: Receiver<CapturedFrame>,
    shutdown_tx: Mutex<Option<Sender<()>>>,
    shutdown_rx: Receiver<()>,
    closed: AtomicBool,
}

impl Default for FrameQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameQueue {
    pub fn new() -> Self {
        let (frames_tx, frames_rx) = unbounded();
        let (shutdown_tx, shutdown_rx) = unbounded();
        Self {
            frames_tx,
            frames_rx,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            shutdown_rx,
            closed: AtomicBool::new(false),
        }
    }

    /// 一开始就关闭的队列，即第一个会话之前消费者看到的状态
    pub fn closed() -> Self {
        let queue = Self::new();
        queue.close();
        queue
    }

    /// 追加一帧。队列已关闭时返回 `false` 并丢弃该帧。
    pub fn push(&self, frame: CapturedFrame) -> bool {
        if self.is_closed() {
            return false;
        }
        // 两端都在 `self` 中，发送不会断开。
        if self.frames_tx.send(frame).is_err() {
            return false;
        }
        // close() 可能在检查与发送之间完成了清空。
        if self.is_closed() {
            while self.frames_rx.try_recv().is_ok() {}
            return false;
        }
        true
    }

    /// 最多等待 `timeout` 获取下一帧
    pub fn pop(&self, timeout: Duration) -> Pop {
        if self.is_closed() {
            return Pop::Closed;
        }

        select! {
            recv(self.frames_rx) -> msg => match msg {
                // 与 close() 竞争的帧作废，过期帧不会被取出
                Ok(_) if self.is_closed() => Pop::Closed,
                Ok(frame) => Pop::Frame(frame),
                Err(_) => Pop::Closed,
            },
            recv(self.shutdown_rx) -> _ => Pop::Closed,
            default(timeout) => {
                if self.is_closed() { Pop::Closed } else { Pop::TimedOut }
            }
        }
    }

    /// [`pop`](Self::pop) 的非阻塞版本
    pub fn try_pop(&self) -> Option<CapturedFrame> {
        if self.is_closed() {
            return None;
        }
        self.frames_rx.try_recv().ok()
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        // 丢弃唯一的 sender，所有等待者的 shutdown_rx 随之断开
        self.shutdown_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        // 释放不会再被读取的帧
        while self.frames_rx.try_recv().is_ok() {}
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.frames_rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames_rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;
    use vimbasrc_core::frame::FrameStatus;

    fn frame(id: u64) -> CapturedFrame {
        CapturedFrame {
            frame_id: id,
            data: vec![id as u8; 4],
            status: FrameStatus::Complete,
            device_timestamp: id * 10,
            arrival: Instant::now(),
        }
    }

    fn pop_id(queue: &FrameQueue) -> Option<u64> {
        match queue.pop(Duration::from_millis(100)) {
            Pop::Frame(f) => Some(f.frame_id),
            _ => None,
        }
    }

    #[test]
    fn pops_in_push_order() {
        let queue = FrameQueue::new();
        for id in [1, 2, 3] {
            assert!(queue.push(frame(id)));
        }
        assert_eq!(queue.len(), 3);

        assert_eq!(pop_id(&queue), Some(1));
        assert_eq!(pop_id(&queue), Some(2));
        assert_eq!(pop_id(&queue), Some(3));
        assert!(queue.is_empty());
    }

    #[test]
    fn empty_queue_times_out() {
        let queue = FrameQueue::new();
        let started = Instant::now();
        assert!(matches!(queue.pop(Duration::from_millis(20)), Pop::TimedOut));
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn close_discards_pending_frames() {
        let queue = FrameQueue::new();
        queue.push(frame(1));
        queue.close();

        assert!(matches!(queue.pop(Duration::from_secs(5)), Pop::Closed));
        assert!(queue.try_pop().is_none());
        assert!(!queue.push(frame(2)));
        assert!(queue.is_empty());
    }

    #[test]
    fn close_wakes_blocked_consumer() {
        let queue = Arc::new(FrameQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let started = Instant::now();
                let pop = queue.pop(Duration::from_secs(30));
                (pop, started.elapsed())
            })
        };

        thread::sleep(Duration::from_millis(50));
        queue.close();

        let (pop, waited) = consumer.join().unwrap();
        assert!(matches!(pop, Pop::Closed));
        assert!(waited < Duration::from_secs(5));
    }

    #[test]
    fn concurrent_pushes_lose_nothing() {
        const PRODUCERS: u64 = 8;
        const PER_PRODUCER: u64 = 250;

        let queue = Arc::new(FrameQueue::new());
        let handles: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        assert!(queue.push(frame(p * PER_PRODUCER + i)));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let mut seen = Vec::new();
        while let Some(id) = queue.try_pop().map(|f| f.frame_id) {
            seen.push(id);
        }
        seen.sort_unstable();
        let expected: Vec<u64> = (0..PRODUCERS * PER_PRODUCER).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn push_racing_close_leaves_nothing_behind() {
        for _ in 0..20 {
            let queue = Arc::new(FrameQueue::new());
            let producers: Vec<_> = (0..4u64)
                .map(|p| {
                    let queue = Arc::clone(&queue);
                    thread::spawn(move || {
                        let mut id = p << 32;
                        while queue.push(frame(id)) {
                            id += 1;
                        }
                    })
                })
                .collect();

            thread::sleep(Duration::from_millis(1));
            queue.close();
            for h in producers {
                h.join().unwrap();
            }

            assert!(queue.is_empty());
            assert!(!queue.push(frame(0)));
        }
    }

    #[test]
    fn pre_closed_queue_never_blocks() {
        let queue = FrameQueue::closed();
        assert!(matches!(queue.pop(Duration::from_secs(30)), Pop::Closed));
    }
}
