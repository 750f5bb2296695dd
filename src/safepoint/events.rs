//! Event bus for safepoint lifecycle notifications

use flume::{Receiver, Sender};
use parking_lot::Mutex;
use std::thread::ThreadId;
use std::time::Duration;

/// Lifecycle notification published by the safepoint manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SafepointEvent {
    /// A thread entered the manager
    ThreadEntered(ThreadId),
    /// A thread left the manager
    ThreadLeft(ThreadId),
    /// The driving thread invalidated the epoch and is pausing all threads
    PauseStarted { driver: ThreadId },
    /// Every participant finished the action and the pause lock was released
    PauseCompleted {
        driver: ThreadId,
        participants: usize,
        duration: Duration,
    },
}

/// Fan-out of events to every live subscriber
#[derive(Debug, Default)]
pub(crate) struct EventBus {
    subscribers: Mutex<Vec<Sender<SafepointEvent>>>,
}

impl EventBus {
    pub(crate) fn subscribe(&self) -> Receiver<SafepointEvent> {
        let (tx, rx) = flume::unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Dropped receivers are pruned on the next publish.
    pub(crate) fn publish(&self, event: SafepointEvent) {
        let mut subscribers = self.subscribers.lock();
        if subscribers.is_empty() {
            return;
        }
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}
