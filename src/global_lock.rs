//! The global lock that serializes normal execution.
//!
//! The safepoint manager only needs a narrow contract from it: release the
//! lock held by a thread, getting back whatever is needed to reacquire it,
//! and reacquire it later. [`GlobalInterpreterLock`] is a ready-made
//! single-owner implementation whose acquisition can be interrupted.
//!
//! # Examples
//!
//! ```
//! use safepoint::global_lock::{GlobalInterpreterLock, GlobalLock};
//!
//! let lock = GlobalInterpreterLock::new();
//! let me = std::thread::current().id();
//!
//! lock.enter(me);
//! assert!(lock.is_held_by(me));
//!
//! let owner = lock.leave(me);
//! assert_eq!(owner, me);
//! assert_eq!(lock.owner(), None);
//! ```

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::ThreadId;

use crate::error::SafepointResult;
use crate::interrupt::Interrupter;

/// Contract the safepoint manager consumes from the runtime's global lock
pub trait GlobalLock: Send + Sync {
    /// Release the lock held by `thread`, returning the owner to hand back
    /// to [`GlobalLock::enter`].
    fn leave(&self, thread: ThreadId) -> ThreadId;

    /// Block until the lock is free, then take it on behalf of `owner`.
    fn enter(&self, owner: ThreadId);

    /// Like `enter`, but fails with `Interrupted` when `interrupter` fires.
    fn enter_interruptibly(
        &self,
        owner: ThreadId,
        _interrupter: &Interrupter,
    ) -> SafepointResult<()> {
        self.enter(owner);
        Ok(())
    }
}

#[derive(Default)]
struct GilInner {
    owner: Mutex<Option<ThreadId>>,
    released: Condvar,
}

/// Single-owner global lock
#[derive(Default, Clone)]
pub struct GlobalInterpreterLock {
    inner: Arc<GilInner>,
}

impl GlobalInterpreterLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn owner(&self) -> Option<ThreadId> {
        *self.inner.owner.lock()
    }

    pub fn is_held_by(&self, thread: ThreadId) -> bool {
        self.owner() == Some(thread)
    }

    /// Take the lock only if it is free.
    pub fn try_enter(&self, owner: ThreadId) -> bool {
        let mut current = self.inner.owner.lock();
        if current.is_some() {
            return false;
        }
        *current = Some(owner);
        true
    }
}

impl GlobalLock for GlobalInterpreterLock {
    fn leave(&self, thread: ThreadId) -> ThreadId {
        let mut owner = self.inner.owner.lock();
        match *owner {
            Some(current) if current == thread => {
                *owner = None;
                self.inner.released.notify_all();
            }
            other => {
                tracing::warn!(
                    ?thread,
                    owner = ?other,
                    "leaving a global lock the thread does not hold"
                );
            }
        }
        thread
    }

    fn enter(&self, owner: ThreadId) {
        let mut current = self.inner.owner.lock();
        while current.is_some() {
            self.inner.released.wait(&mut current);
        }
        *current = Some(owner);
    }

    fn enter_interruptibly(
        &self,
        owner: ThreadId,
        interrupter: &Interrupter,
    ) -> SafepointResult<()> {
        let inner = Arc::clone(&self.inner);
        let _blocked = interrupter.block_on(move || {
            let _owner = inner.owner.lock();
            inner.released.notify_all();
        });

        let mut current = self.inner.owner.lock();
        loop {
            if current.is_none() {
                *current = Some(owner);
                return Ok(());
            }
            interrupter.check()?;
            self.inner.released.wait(&mut current);
        }
    }
}
