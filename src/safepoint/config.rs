//! Tunables for the safepoint manager.

use std::time::Duration;

/// Configuration for a [`SafepointManager`](super::SafepointManager)
///
/// # Examples
///
/// ```
/// use safepoint::safepoint::SafepointConfig;
/// use std::time::Duration;
///
/// let config = SafepointConfig::default()
///     .with_interrupt_blocked_threads(false)
///     .with_slow_pause_threshold(Some(Duration::from_millis(5)));
///
/// assert!(!config.interrupt_blocked_threads);
/// assert_eq!(config.slow_pause_threshold, Some(Duration::from_millis(5)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafepointConfig {
    /// Interrupt registered threads when a pause starts so threads parked in
    /// interruptible waits notice it promptly.
    pub interrupt_blocked_threads: bool,
    /// Pauses that take longer than this are logged as warnings.
    pub slow_pause_threshold: Option<Duration>,
}

impl Default for SafepointConfig {
    fn default() -> Self {
        Self {
            interrupt_blocked_threads: true,
            slow_pause_threshold: Some(Duration::from_millis(100)),
        }
    }
}

impl SafepointConfig {
    pub fn with_interrupt_blocked_threads(mut self, enabled: bool) -> Self {
        self.interrupt_blocked_threads = enabled;
        self
    }

    pub fn with_slow_pause_threshold(mut self, threshold: Option<Duration>) -> Self {
        self.slow_pause_threshold = threshold;
        self
    }

    pub(crate) fn is_slow(&self, pause: Duration) -> bool {
        self.slow_pause_threshold
            .is_some_and(|threshold| pause > threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_interrupts_and_warns_after_100ms() {
        let config = SafepointConfig::default();
        assert!(config.interrupt_blocked_threads);
        assert!(!config.is_slow(Duration::from_millis(100)));
        assert!(config.is_slow(Duration::from_millis(101)));
    }

    #[test]
    fn disabled_threshold_is_never_slow() {
        let config = SafepointConfig::default().with_slow_pause_threshold(None);
        assert!(!config.is_slow(Duration::from_secs(3600)));
    }
}
