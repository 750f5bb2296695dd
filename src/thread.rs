//! Managed threads and the registry of safepoint participants.
//!
//! A [`ManagedThread`] is the runtime's view of one thread: its identity,
//! its status, and the queue of actions deferred until it resumes after a
//! pause. The [`ThreadRegistry`] tracks which OS threads take part in
//! safepoints and keeps the rendezvous [`Phaser`] sized to match.
//!
//! # Examples
//!
//! ```
//! use safepoint::interrupt::Interrupter;
//! use safepoint::thread::{ManagedThread, ThreadRegistry};
//!
//! let thread = ManagedThread::current();
//! let registry = ThreadRegistry::new();
//! assert!(registry.register(Interrupter::current(), Some(thread.clone()), true));
//!
//! assert_eq!(registry.len(), 1);
//! assert_eq!(registry.phaser().registered_parties(), 1);
//! assert_eq!(registry.get(thread.id()).unwrap().managed().unwrap().id(), thread.id());
//! ```

use crossbeam_utils::atomic::AtomicCell;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use std::{
    fmt, mem,
    sync::Arc,
    thread::{self, ThreadId},
};

use crate::interrupt::Interrupter;
use crate::phaser::Phaser;

/// Work queued during a pause to run on a specific thread once it resumes
pub type DeferredAction = Box<dyn FnOnce() + Send>;

/// Lifecycle status of a managed thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadStatus {
    Run,
    Sleep,
    /// Terminating; still takes part in pauses but skips their actions.
    Aborting,
    Dead,
}

struct ManagedInner {
    id: ThreadId,
    name: Option<String>,
    status: AtomicCell<ThreadStatus>,
    deferred: Mutex<Vec<DeferredAction>>,
}

/// The runtime's record for one thread.
///
/// Cloning yields another handle to the same record.
#[derive(Clone)]
pub struct ManagedThread {
    inner: Arc<ManagedInner>,
}

impl ManagedThread {
    /// A record for the calling thread, named after it.
    pub fn current() -> Self {
        let current = thread::current();
        Self::with_identity(current.id(), current.name().map(str::to_owned))
    }

    fn with_identity(id: ThreadId, name: Option<String>) -> Self {
        Self {
            inner: Arc::new(ManagedInner {
                id,
                name,
                status: AtomicCell::new(ThreadStatus::Run),
                deferred: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn id(&self) -> ThreadId {
        self.inner.id
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    pub fn status(&self) -> ThreadStatus {
        self.inner.status.load()
    }

    pub fn set_status(&self, status: ThreadStatus) {
        self.inner.status.store(status);
    }

    pub fn is_aborting(&self) -> bool {
        self.status() == ThreadStatus::Aborting
    }

    /// Queue `action` to run on this thread after it resumes from the
    /// current pause. Safe to call from any thread.
    pub fn defer<F>(&self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.deferred.lock().push(Box::new(action));
    }

    pub fn deferred_len(&self) -> usize {
        self.inner.deferred.lock().len()
    }

    /// Drain the deferred queue and run every action in queue order.
    ///
    /// Actions queued while draining wait for the next drain. Returns the
    /// number of actions run.
    pub(crate) fn run_deferred_actions(&self) -> usize {
        debug_assert_eq!(thread::current().id(), self.inner.id);
        let actions = mem::take(&mut *self.inner.deferred.lock());
        let count = actions.len();
        for action in actions {
            action();
        }
        count
    }

    pub fn ptr_eq(&self, other: &ManagedThread) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for ManagedThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedThread")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("status", &self.status())
            .finish()
    }
}

/// One participant in safepoints
#[derive(Clone, Debug)]
pub struct RegisteredThread {
    interrupter: Arc<Interrupter>,
    managed: Option<ManagedThread>,
    interruptible: bool,
}

impl RegisteredThread {
    pub fn identity(&self) -> ThreadId {
        self.interrupter.thread_id()
    }

    pub fn interruptible(&self) -> bool {
        self.interruptible
    }

    /// The runtime record bound at registration; `None` for foreign threads.
    pub fn managed(&self) -> Option<&ManagedThread> {
        self.managed.as_ref()
    }

    pub fn interrupter(&self) -> &Arc<Interrupter> {
        &self.interrupter
    }
}

/// Registry of safepoint participants
///
/// The phaser's party count always equals the number of registered threads.
#[derive(Default)]
pub struct ThreadRegistry {
    threads: DashMap<ThreadId, RegisteredThread>,
    phaser: Phaser,
}

impl ThreadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the thread owning `interrupter`. Returns `false`, changing
    /// nothing, if it is already registered.
    pub fn register(
        &self,
        interrupter: Arc<Interrupter>,
        managed: Option<ManagedThread>,
        interruptible: bool,
    ) -> bool {
        match self.threads.entry(interrupter.thread_id()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                self.phaser.register();
                slot.insert(RegisteredThread {
                    interrupter,
                    managed,
                    interruptible,
                });
                true
            }
        }
    }

    /// Remove `identity` from the registry and the phaser.
    ///
    /// Must not be called by a thread that is inside a pause's phases.
    pub fn deregister(&self, identity: ThreadId) -> Option<RegisteredThread> {
        let (_, removed) = self.threads.remove(&identity)?;
        self.phaser.arrive_and_deregister();
        Some(removed)
    }

    pub fn get(&self, identity: ThreadId) -> Option<RegisteredThread> {
        self.threads.get(&identity).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, identity: ThreadId) -> bool {
        self.threads.contains_key(&identity)
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    pub fn identities(&self) -> Vec<ThreadId> {
        self.threads.iter().map(|entry| *entry.key()).collect()
    }

    /// Call `f` for every registered thread that may be interrupted.
    pub fn for_each_interruptible<F>(&self, mut f: F)
    where
        F: FnMut(&RegisteredThread),
    {
        for entry in self.threads.iter() {
            if entry.interruptible {
                f(entry.value());
            }
        }
    }

    pub fn phaser(&self) -> &Phaser {
        &self.phaser
    }
}

impl fmt::Debug for ThreadRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadRegistry")
            .field("threads", &self.identities())
            .field("parties", &self.phaser.registered_parties())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn deferred_actions_run_in_queue_order_once() {
        let thread = ManagedThread::current();
        let log = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let log = Arc::clone(&log);
            thread.defer(move || log.lock().push(i));
        }
        assert_eq!(thread.deferred_len(), 3);

        assert_eq!(thread.run_deferred_actions(), 3);
        assert_eq!(*log.lock(), vec![0, 1, 2]);
        assert_eq!(thread.deferred_len(), 0);
        assert_eq!(thread.run_deferred_actions(), 0);
    }

    #[test]
    fn actions_deferred_while_draining_wait_for_next_drain() {
        let thread = ManagedThread::current();
        let runs = Arc::new(AtomicUsize::new(0));

        let requeue = thread.clone();
        let counter = Arc::clone(&runs);
        thread.defer(move || {
            let counter = Arc::clone(&counter);
            requeue.defer(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        });

        assert_eq!(thread.run_deferred_actions(), 1);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert_eq!(thread.run_deferred_actions(), 1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn status_round_trips() {
        let thread = ManagedThread::current();
        assert_eq!(thread.status(), ThreadStatus::Run);
        thread.set_status(ThreadStatus::Aborting);
        assert!(thread.is_aborting());
        assert!(thread.clone().is_aborting());
    }

    #[test]
    fn duplicate_registration_is_ignored() {
        let registry = ThreadRegistry::new();
        assert!(registry.register(Interrupter::current(), None, true));
        assert!(!registry.register(Interrupter::current(), None, false));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.phaser().registered_parties(), 1);
        assert!(registry.get(thread::current().id()).unwrap().interruptible());
    }

    #[test]
    fn deregister_removes_party() {
        let registry = ThreadRegistry::new();
        registry.register(Interrupter::current(), None, true);

        let removed = registry.deregister(thread::current().id()).unwrap();
        assert_eq!(removed.identity(), thread::current().id());
        assert!(registry.is_empty());
        assert_eq!(registry.phaser().registered_parties(), 0);
        assert!(registry.deregister(thread::current().id()).is_none());
    }

    #[test]
    fn for_each_interruptible_skips_uninterruptible_threads() {
        let registry = Arc::new(ThreadRegistry::new());
        registry.register(Interrupter::current(), None, true);

        let other = Arc::clone(&registry);
        thread::spawn(move || {
            other.register(Interrupter::current(), None, false);
        })
        .join()
        .unwrap();

        let mut seen = Vec::new();
        registry.for_each_interruptible(|t| seen.push(t.identity()));
        assert_eq!(seen, vec![thread::current().id()]);
        assert_eq!(registry.len(), 2);
    }
}
