//! Mutual exclusion between pause drivers.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use crate::error::{SafepointError, SafepointResult};
use crate::interrupt::Interrupter;

#[derive(Default)]
struct PauseLockInner {
    owner: Mutex<Option<ThreadId>>,
    released: Condvar,
}

/// Owner-tracking lock held for the whole of a pause.
///
/// Unlike `parking_lot::Mutex` it knows which thread holds it, so a
/// re-entrant pause can be rejected instead of deadlocking, and waiting for
/// it can be cut short by an [`Interrupter`].
#[derive(Default)]
pub(crate) struct PauseLock {
    inner: Arc<PauseLockInner>,
}

impl PauseLock {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn is_held_by(&self, thread: ThreadId) -> bool {
        *self.inner.owner.lock() == Some(thread)
    }

    pub(crate) fn is_locked(&self) -> bool {
        self.inner.owner.lock().is_some()
    }

    pub(crate) fn lock(&self) -> PauseGuard<'_> {
        let me = thread::current().id();
        let mut owner = self.inner.owner.lock();
        while owner.is_some() {
            self.inner.released.wait(&mut owner);
        }
        *owner = Some(me);
        PauseGuard { lock: self }
    }

    /// Wait for the lock, giving up with `Interrupted` when `interrupter`
    /// fires or `pause_pending` turns true, so the caller can service the
    /// pause that is keeping it waiting.
    pub(crate) fn lock_interruptibly<P>(
        &self,
        interrupter: &Interrupter,
        pause_pending: P,
    ) -> SafepointResult<PauseGuard<'_>>
    where
        P: Fn() -> bool,
    {
        let me = thread::current().id();
        let inner = Arc::clone(&self.inner);
        let _blocked = interrupter.block_on(move || {
            let _owner = inner.owner.lock();
            inner.released.notify_all();
        });

        let mut owner = self.inner.owner.lock();
        loop {
            if owner.is_none() {
                *owner = Some(me);
                return Ok(PauseGuard { lock: self });
            }
            interrupter.check()?;
            if pause_pending() {
                return Err(SafepointError::Interrupted);
            }
            self.inner.released.wait(&mut owner);
        }
    }

    /// Wake every waiter so it re-evaluates its `pause_pending` predicate.
    pub(crate) fn wake_waiters(&self) {
        let _owner = self.inner.owner.lock();
        self.inner.released.notify_all();
    }
}

pub(crate) struct PauseGuard<'a> {
    lock: &'a PauseLock,
}

impl Drop for PauseGuard<'_> {
    fn drop(&mut self) {
        *self.lock.inner.owner.lock() = None;
        self.lock.inner.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;

    #[test]
    fn tracks_owner() {
        let lock = PauseLock::new();
        let me = thread::current().id();
        assert!(!lock.is_locked());
        {
            let _guard = lock.lock();
            assert!(lock.is_held_by(me));
        }
        assert!(!lock.is_locked());
    }

    #[test]
    fn interrupted_waiter_gives_up() {
        let lock = Arc::new(PauseLock::new());
        let _guard = lock.lock();

        let (tx, rx) = mpsc::channel();
        let waiter = Arc::clone(&lock);
        let handle = thread::spawn(move || {
            let interrupter = Interrupter::current();
            tx.send(Arc::clone(&interrupter)).unwrap();
            waiter.lock_interruptibly(&interrupter, || false).map(|_| ())
        });

        rx.recv().unwrap().interrupt();
        assert_eq!(handle.join().unwrap(), Err(SafepointError::Interrupted));
        assert!(lock.is_held_by(thread::current().id()));
    }

    #[test]
    fn waiter_acquires_after_release() {
        let lock = Arc::new(PauseLock::new());
        let guard = lock.lock();

        let waiter = Arc::clone(&lock);
        let handle = thread::spawn(move || {
            let interrupter = Interrupter::current();
            let _guard = waiter.lock_interruptibly(&interrupter, || false).unwrap();
            waiter.is_held_by(thread::current().id())
        });

        drop(guard);
        assert!(handle.join().unwrap());
    }

    #[test]
    fn pending_pause_releases_waiter() {
        let lock = Arc::new(PauseLock::new());
        let _guard = lock.lock();
        let pending = Arc::new(AtomicBool::new(false));

        let waiter = Arc::clone(&lock);
        let flag = Arc::clone(&pending);
        let handle = thread::spawn(move || {
            let interrupter = Interrupter::current();
            waiter
                .lock_interruptibly(&interrupter, || flag.load(Ordering::SeqCst))
                .map(|_| ())
        });

        pending.store(true, Ordering::SeqCst);
        lock.wake_waiters();
        assert_eq!(handle.join().unwrap(), Err(SafepointError::Interrupted));
    }
}
