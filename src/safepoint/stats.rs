//! Pause statistics

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Snapshot of safepoint activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SafepointStats {
    /// Completed pauses
    pub pauses: u64,
    /// Polls that observed an invalidated epoch, counted on non-driving threads
    pub slow_path_polls: u64,
    /// Sum of pause durations as measured by the driving thread
    pub total_pause_time: Duration,
    /// Longest single pause
    pub max_pause_time: Duration,
}

impl SafepointStats {
    pub fn average_pause_time(&self) -> Duration {
        if self.pauses == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos((self.total_pause_time.as_nanos() / u128::from(self.pauses)) as u64)
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pauses: AtomicU64,
    slow_path_polls: AtomicU64,
    total_pause_nanos: AtomicU64,
    max_pause_nanos: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn record_slow_poll(&self) {
        self.slow_path_polls.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_pause(&self, duration: Duration) {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        self.pauses.fetch_add(1, Ordering::Relaxed);
        self.total_pause_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.max_pause_nanos.fetch_max(nanos, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> SafepointStats {
        SafepointStats {
            pauses: self.pauses.load(Ordering::Relaxed),
            slow_path_polls: self.slow_path_polls.load(Ordering::Relaxed),
            total_pause_time: Duration::from_nanos(self.total_pause_nanos.load(Ordering::Relaxed)),
            max_pause_time: Duration::from_nanos(self.max_pause_nanos.load(Ordering::Relaxed)),
        }
    }
}
