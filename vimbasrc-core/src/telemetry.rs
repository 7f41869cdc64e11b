use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::frame::FrameStatus;

/// 每个引擎的采集计数器
///
/// 由驱动投递线程写入，因此每个字段都是 relaxed 原子量。
/// 读取方只看 [`TelemetrySnapshot`]。
#[derive(Debug, Default)]
pub struct CaptureTelemetry {
    delivered: AtomicU64,
    incomplete: AtomicU64,
    too_small: AtomicU64,
    invalid: AtomicU64,
    undefined: AtomicU64,
    dropped_closed: AtomicU64,
    requeue_failures: AtomicU64,
    sessions: AtomicU64,
}

impl CaptureTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_anomaly(&self, status: FrameStatus) {
        let counter = match status {
            FrameStatus::Complete => return,
            FrameStatus::Incomplete => &self.incomplete,
            FrameStatus::TooSmall => &self.too_small,
            FrameStatus::Invalid => &self.invalid,
            FrameStatus::Unknown(_) => &self.undefined,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// 所属会话队列关闭后才完成的帧
    pub fn record_dropped(&self) {
        self.dropped_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_requeue_failure(&self) {
        self.requeue_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session(&self) {
        self.sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            delivered: self.delivered.load(Ordering::Relaxed),
            incomplete: self.incomplete.load(Ordering::Relaxed),
            too_small: self.too_small.load(Ordering::Relaxed),
            invalid: self.invalid.load(Ordering::Relaxed),
            undefined: self.undefined.load(Ordering::Relaxed),
            dropped_closed: self.dropped_closed.load(Ordering::Relaxed),
            requeue_failures: self.requeue_failures.load(Ordering::Relaxed),
            sessions: self.sessions.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct TelemetrySnapshot {
    pub delivered: u64,
    pub incomplete: u64,
    pub too_small: u64,
    pub invalid: u64,
    pub undefined: u64,
    pub dropped_closed: u64,
    pub requeue_failures: u64,
    pub sessions: u64,
}

impl fmt::Debug for TelemetrySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetrySnapshot")
            .field("delivered", &self.delivered)
            .field("anomalies", &self.anomalies())
            .field("requeue_failures", &self.requeue_failures)
            .field("sessions", &self.sessions)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureHealth {
    Healthy,
    Warning(HealthIssue),
    Critical(HealthIssue),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthIssue {
    /// 驱动持续返回损坏帧 (带宽不足、丢包)
    FrameLoss,
    /// 缓冲区正在脱离循环
    BufferStarvation,
}

impl TelemetrySnapshot {
    pub fn anomalies(&self) -> u64 {
        self.incomplete + self.too_small + self.invalid + self.undefined
    }

    pub fn assess_health(&self) -> CaptureHealth {
        if self.requeue_failures > 0 && self.delivered == 0 {
            return CaptureHealth::Critical(HealthIssue::BufferStarvation);
        }
        if self.requeue_failures > 0 {
            return CaptureHealth::Warning(HealthIssue::BufferStarvation);
        }

        let total = self.delivered + self.anomalies();
        if total >= 20 && self.anomalies() * 2 > total {
            return CaptureHealth::Critical(HealthIssue::FrameLoss);
        }
        if total >= 20 && self.anomalies() * 10 > total {
            return CaptureHealth::Warning(HealthIssue::FrameLoss);
        }

        CaptureHealth::Healthy
    }
}
