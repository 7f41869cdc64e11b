use std::time::{Duration, Instant};

/// 单次采集会话的运行时钟
///
/// 帧时间戳相对于采集开始时刻计算，与管线减去 base time 的做法一致。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionClock {
    base: Instant,
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::start()
    }
}

impl SessionClock {
    pub fn start() -> Self {
        Self {
            base: Instant::now(),
        }
    }

    pub fn with_base(base: Instant) -> Self {
        Self { base }
    }

    /// `at` 对应的运行时间。早于基准的时刻 (重启前刚拷出的帧) 截断为零。
    pub fn running_time(&self, at: Instant) -> Duration {
        at.saturating_duration_since(self.base)
    }

    pub fn elapsed(&self) -> Duration {
        self.running_time(Instant::now())
    }
}
