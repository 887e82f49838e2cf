use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Source of the current time in whole seconds
pub trait Clock: Send + Sync + 'static {
    fn now_sec(&self) -> u32;
}

/// Wall clock, seconds since the UNIX epoch
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_sec(&self) -> u32 {
        SystemTime::UNIX_EPOCH
            .elapsed()
            .map(saturating_secs)
            .unwrap_or(0)
    }
}

// u32 に収まらない時刻は u32::MAX に張り付ける
fn saturating_secs(d: Duration) -> u32 {
    u32::try_from(d.as_secs()).unwrap_or(u32::MAX)
}

/// Manually driven clock; clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    secs: Arc<AtomicU32>,
}

impl ManualClock {
    pub fn new(now_sec: u32) -> Self {
        Self {
            secs: Arc::new(AtomicU32::new(now_sec)),
        }
    }

    #[inline]
    pub fn set(&self, now_sec: u32) {
        self.secs.store(now_sec, Ordering::Relaxed);
    }

    #[inline]
    pub fn advance(&self, secs: u32) {
        self.secs.fetch_add(secs, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now_sec(&self) -> u32 {
        self.secs.load(Ordering::Relaxed)
    }
}
