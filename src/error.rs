//! Error types for safepoint coordination.

use std::thread::ThreadId;
use thiserror::Error;

/// Errors that can occur while coordinating safepoints
///
/// # Examples
///
/// ```
/// use safepoint::error::{SafepointError, SafepointResult};
///
/// let reentrant = SafepointError::ReentrantPause;
/// assert_eq!(
///     reentrant.to_string(),
///     "safepoint manager re-entered by the thread driving the current pause"
/// );
///
/// let failure: SafepointResult<()> = Err(SafepointError::Interrupted);
/// assert!(failure.is_err());
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SafepointError {
    /// The thread that holds the pause lock tried to start another pause.
    ///
    /// This is a logic bug in the caller: the second pause would wait on
    /// itself in the barrier. It is never retried.
    #[error("safepoint manager re-entered by the thread driving the current pause")]
    ReentrantPause,
    /// The epoch token was invalidated; a pause is pending.
    #[error("epoch token has been invalidated")]
    EpochInvalidated,
    /// An interruptible blocking call was woken by `Interrupter::interrupt`.
    #[error("blocking operation was interrupted")]
    Interrupted,
    /// The calling thread has not entered the safepoint manager.
    #[error("thread {0:?} is not registered for safepoints")]
    NotRegistered(ThreadId),
}

impl SafepointError {
    /// Whether the error is an unrecoverable usage error rather than a
    /// signal the runtime retries internally.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SafepointError::ReentrantPause)
    }
}

/// Result type for safepoint operations
pub type SafepointResult<T> = Result<T, SafepointError>;
