//! Per-thread interrupt primitive.
//!
//! Rust threads cannot be interrupted out of an arbitrary blocking call, so
//! blocking waits that must stay responsive to safepoints cooperate with an
//! [`Interrupter`]: they install a wake-up callback with [`Interrupter::block_on`]
//! for as long as they wait, and check [`Interrupter::take`] each time they
//! wake. [`Interrupter::interrupt`] sets the flag, runs the installed wake-up
//! and unparks the thread.
//!
//! # Examples
//!
//! ```
//! use safepoint::interrupt::Interrupter;
//! use std::thread;
//! use std::time::Duration;
//!
//! let (tx, rx) = std::sync::mpsc::channel();
//! let sleeper = thread::spawn(move || {
//!     let me = Interrupter::current();
//!     tx.send(me.clone()).unwrap();
//!     me.sleep(Duration::from_secs(60))
//! });
//!
//! let handle = rx.recv().unwrap();
//! handle.interrupt();
//! assert!(sleeper.join().unwrap().is_err());
//! ```

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, Thread, ThreadId};
use std::time::{Duration, Instant};

use crate::error::{SafepointError, SafepointResult};

type Wake = Arc<dyn Fn() + Send + Sync>;

thread_local! {
    static CURRENT: Arc<Interrupter> = Arc::new(Interrupter::new(thread::current()));
}

/// Interrupt state of one OS thread
pub struct Interrupter {
    interrupted: AtomicBool,
    thread: Thread,
    blocker: Mutex<Option<Wake>>,
}

impl Interrupter {
    fn new(thread: Thread) -> Self {
        Self {
            interrupted: AtomicBool::new(false),
            thread,
            blocker: Mutex::new(None),
        }
    }

    /// The interrupter of the calling thread.
    pub fn current() -> Arc<Interrupter> {
        CURRENT.with(Arc::clone)
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread.id()
    }

    /// Interrupt the thread: any interruptible wait it is in, or enters next,
    /// fails with `Interrupted`.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
        let wake = self.blocker.lock().clone();
        if let Some(wake) = wake {
            wake();
        }
        self.thread.unpark();
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Test and clear the interrupted flag.
    pub fn take(&self) -> bool {
        self.interrupted.swap(false, Ordering::SeqCst)
    }

    /// `Err(Interrupted)` if the flag was set, clearing it.
    pub fn check(&self) -> SafepointResult<()> {
        if self.take() {
            Err(SafepointError::Interrupted)
        } else {
            Ok(())
        }
    }

    /// Install `wake` as the callback `interrupt` runs while the returned
    /// guard is alive.
    ///
    /// The callback must be installed before the waiter last checks the
    /// flag, otherwise an interrupt landing in between is lost.
    pub fn block_on<F>(&self, wake: F) -> BlockOn<'_>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let previous = self.blocker.lock().replace(Arc::new(wake));
        BlockOn {
            interrupter: self,
            previous,
        }
    }

    /// Interruptible sleep. Must be called on the owning thread.
    pub fn sleep(&self, duration: Duration) -> SafepointResult<()> {
        debug_assert_eq!(thread::current().id(), self.thread.id());
        let deadline = Instant::now() + duration;
        loop {
            self.check()?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            thread::park_timeout(deadline - now);
        }
    }

    /// Interruptible park. Like `thread::park`, it may return spuriously.
    pub fn park(&self) -> SafepointResult<()> {
        debug_assert_eq!(thread::current().id(), self.thread.id());
        self.check()?;
        thread::park();
        self.check()
    }
}

impl fmt::Debug for Interrupter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interrupter")
            .field("thread", &self.thread.id())
            .field("interrupted", &self.is_interrupted())
            .finish()
    }
}

/// Keeps a wake-up callback installed on an [`Interrupter`]
pub struct BlockOn<'a> {
    interrupter: &'a Interrupter,
    previous: Option<Wake>,
}

impl Drop for BlockOn<'_> {
    fn drop(&mut self) {
        *self.interrupter.blocker.lock() = self.previous.take();
    }
}
