//! Safepoint manager and the pause protocol

use arc_swap::{ArcSwap, ArcSwapOption};
use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Instant;

use super::{
    config::SafepointConfig,
    events::{EventBus, SafepointEvent},
    pause_lock::PauseLock,
    stats::{SafepointStats, StatsCounters},
};
use crate::epoch::EpochToken;
use crate::error::{SafepointError, SafepointResult};
use crate::global_lock::GlobalLock;
use crate::interrupt::Interrupter;
use crate::thread::{ManagedThread, ThreadRegistry};

type PanicPayload = Box<dyn Any + Send + 'static>;

/// The action a pause runs once on every participating thread
struct PendingAction(Box<dyn Fn(&ManagedThread) + Send + Sync>);

thread_local! {
    // Set while this thread is between its first and third barrier arrival.
    static IN_PAUSE: Cell<bool> = const { Cell::new(false) };
}

struct InPause;

impl InPause {
    fn enter() -> Self {
        IN_PAUSE.with(|flag| flag.set(true));
        InPause
    }

    fn is_active() -> bool {
        IN_PAUSE.with(Cell::get)
    }
}

impl Drop for InPause {
    fn drop(&mut self) {
        IN_PAUSE.with(|flag| flag.set(false));
    }
}

/// Coordinates pauses across every registered thread.
///
/// Threads [`enter_thread`](Self::enter_thread) once, then call
/// [`poll`](Self::poll) at their safe points. Any registered thread may call
/// [`pause_all_and_execute`](Self::pause_all_and_execute): the manager
/// invalidates the current epoch, interrupts blocked threads, and walks every
/// participant through three barrier phases:
///
/// 1. quiesce: everyone has left normal execution;
/// 2. republish: the driving thread has installed a fresh epoch;
/// 3. act: everyone has run the action.
///
/// Afterwards each thread reacquires the global lock if it held it and runs
/// the actions deferred to it during the pause.
///
/// # Examples
///
/// ```
/// use safepoint::global_lock::GlobalInterpreterLock;
/// use safepoint::safepoint::SafepointManager;
/// use safepoint::thread::ManagedThread;
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// let manager = SafepointManager::new(Arc::new(GlobalInterpreterLock::new()));
/// manager.enter_thread(ManagedThread::current()).unwrap();
/// manager.acquire_global_lock();
///
/// let runs = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&runs);
/// manager
///     .pause_all_and_execute(move |_thread| {
///         counter.fetch_add(1, Ordering::SeqCst);
///     })
///     .unwrap();
///
/// assert_eq!(runs.load(Ordering::SeqCst), 1);
/// manager.poll(); // the pause does not fire again
/// assert_eq!(runs.load(Ordering::SeqCst), 1);
///
/// manager.release_global_lock();
/// manager.leave_thread();
/// ```
pub struct SafepointManager {
    epoch: ArcSwap<EpochToken>,
    registry: ThreadRegistry,
    pause_lock: PauseLock,
    action: ArcSwapOption<PendingAction>,
    global_lock: Arc<dyn GlobalLock>,
    config: SafepointConfig,
    stats: StatsCounters,
    events: EventBus,
}

impl SafepointManager {
    pub fn new(global_lock: Arc<dyn GlobalLock>) -> Self {
        Self::with_config(global_lock, SafepointConfig::default())
    }

    pub fn with_config(global_lock: Arc<dyn GlobalLock>, config: SafepointConfig) -> Self {
        Self {
            epoch: ArcSwap::from_pointee(EpochToken::first()),
            registry: ThreadRegistry::new(),
            pause_lock: PauseLock::new(),
            action: ArcSwapOption::empty(),
            global_lock,
            config,
            stats: StatsCounters::default(),
            events: EventBus::default(),
        }
    }

    /// Register the calling thread as an interruptible participant whose
    /// identity in pause actions is `thread`.
    ///
    /// Call this before taking the global lock: registration waits for any
    /// in-flight pause to finish.
    pub fn enter_thread(&self, thread: ManagedThread) -> SafepointResult<()> {
        self.enter_thread_with(Some(thread), true)
    }

    /// Register the calling thread.
    ///
    /// `thread` is `None` for threads with no runtime identity; they take
    /// part in every pause but never run its action. Threads that must not
    /// be interrupted pass `interruptible = false`.
    pub fn enter_thread_with(
        &self,
        thread: Option<ManagedThread>,
        interruptible: bool,
    ) -> SafepointResult<()> {
        self.register_current(thread, interruptible).map(|_| ())
    }

    fn register_current(
        &self,
        thread: Option<ManagedThread>,
        interruptible: bool,
    ) -> SafepointResult<bool> {
        let identity = thread::current().id();
        if self.pause_lock.is_held_by(identity) || InPause::is_active() {
            return Err(SafepointError::ReentrantPause);
        }
        debug_assert!(thread.as_ref().is_none_or(|t| t.id() == identity));
        // A registered thread is a phaser party: waiting on the pause lock
        // here would hold every other party at the first phase.
        if self.registry.contains(identity) {
            tracing::debug!(?identity, "thread already registered");
            return Ok(false);
        }

        let _guard = self.pause_lock.lock();
        let added = self
            .registry
            .register(Interrupter::current(), thread, interruptible);
        if added {
            tracing::debug!(?identity, interruptible, "thread entered safepoint manager");
            self.events.publish(SafepointEvent::ThreadEntered(identity));
        } else {
            tracing::debug!(?identity, "thread already registered");
        }
        Ok(added)
    }

    /// Deregister the calling thread, first servicing any pending pause.
    ///
    /// A pause that starts after that poll but before deregistration does not
    /// wait for this thread, which therefore never runs that pause's action.
    /// Must not be called from inside a pause action.
    pub fn leave_thread(&self) {
        let identity = thread::current().id();
        if InPause::is_active() {
            tracing::warn!(?identity, "leave_thread called from inside a pause; ignored");
            return;
        }
        if !self.registry.contains(identity) {
            return;
        }

        self.poll_without_global_lock();
        if self.registry.deregister(identity).is_some() {
            tracing::debug!(?identity, "thread left safepoint manager");
            self.events.publish(SafepointEvent::ThreadLeft(identity));
        }
    }

    /// Safepoint check for a thread holding the global lock.
    #[inline]
    pub fn poll(&self) {
        self.poll_with(true);
    }

    /// Safepoint check for a thread not holding the global lock.
    #[inline]
    pub fn poll_without_global_lock(&self) {
        self.poll_with(false);
    }

    #[inline]
    fn poll_with(&self, holds_global_lock: bool) {
        if self.epoch.load().check().is_err() {
            self.stats.record_slow_poll();
            if let Err(payload) = self.epoch_invalidated(holds_global_lock) {
                panic::resume_unwind(payload);
            }
        }
    }

    /// Pause every registered thread and run `action` once on each,
    /// called by a thread that holds the global lock.
    ///
    /// Fails with `ReentrantPause` when called from inside a pause; that
    /// is a logic error and must not be retried.
    pub fn pause_all_and_execute<F>(&self, action: F) -> SafepointResult<()>
    where
        F: Fn(&ManagedThread) + Send + Sync + 'static,
    {
        self.pause_all_and_execute_with(true, action)
    }

    /// Pause from a thread that is not registered with the manager.
    ///
    /// The thread is registered as non-interruptible and without a runtime
    /// identity for the duration of the call.
    pub fn pause_all_and_execute_from_foreign_thread<F>(&self, action: F) -> SafepointResult<()>
    where
        F: Fn(&ManagedThread) + Send + Sync + 'static,
    {
        let registered = self.register_current(None, false)?;
        let _leave = LeaveOnDrop {
            manager: self,
            active: registered,
        };
        self.pause_all_and_execute_with(false, action)
    }

    pub fn pause_all_and_execute_with<F>(
        &self,
        holds_global_lock: bool,
        action: F,
    ) -> SafepointResult<()>
    where
        F: Fn(&ManagedThread) + Send + Sync + 'static,
    {
        let driver = thread::current().id();
        if self.pause_lock.is_held_by(driver) || InPause::is_active() {
            tracing::error!(?driver, "re-entrant safepoint pause");
            return Err(SafepointError::ReentrantPause);
        }
        let participant = self
            .registry
            .get(driver)
            .ok_or(SafepointError::NotRegistered(driver))?;

        let pending = || !self.epoch.load().is_valid();
        let guard = loop {
            match self
                .pause_lock
                .lock_interruptibly(participant.interrupter(), pending)
            {
                Ok(guard) => break guard,
                Err(_) => self.poll_with(holds_global_lock),
            }
        };

        let started = Instant::now();
        let participants = self.registry.len();
        tracing::debug!(?driver, participants, "pausing all threads");
        self.events.publish(SafepointEvent::PauseStarted { driver });

        self.action
            .store(Some(Arc::new(PendingAction(Box::new(action)))));

        // Invalidate before interrupting: a woken thread must see the stale
        // epoch in its poll instead of retrying its blocking call.
        self.epoch.load().invalidate();
        self.pause_lock.wake_waiters();
        if self.config.interrupt_blocked_threads {
            self.interrupt_all(driver);
        }

        let owner = holds_global_lock.then(|| self.global_lock.leave(driver));
        let outcome = {
            let _in_pause = InPause::enter();
            self.step(participant.managed(), true)
        };

        self.action.store(None);
        let duration = started.elapsed();
        self.stats.record_pause(duration);
        if self.config.is_slow(duration) {
            tracing::warn!(?driver, ?duration, participants, "slow safepoint pause");
        }
        // Released before reacquiring the global lock: a thread that takes the
        // global lock first may be waiting on this lock to start its own pause.
        drop(guard);
        tracing::debug!(?driver, ?duration, "all threads resumed");
        self.events.publish(SafepointEvent::PauseCompleted {
            driver,
            participants,
            duration,
        });

        if let Err(payload) = self.resume(owner, participant.managed(), outcome) {
            panic::resume_unwind(payload);
        }
        Ok(())
    }

    fn interrupt_all(&self, driver: ThreadId) {
        self.registry.for_each_interruptible(|thread| {
            if thread.identity() != driver {
                thread.interrupter().interrupt();
            }
        });
    }

    /// Slow path of a thread that observed an invalidated epoch.
    ///
    /// A panic from the action is returned only after the thread has
    /// completed all three phases and reacquired the global lock.
    #[cold]
    fn epoch_invalidated(&self, holds_global_lock: bool) -> Result<(), PanicPayload> {
        let identity = thread::current().id();
        let Some(participant) = self.registry.get(identity) else {
            tracing::warn!(?identity, "safepoint poll from an unregistered thread");
            return Ok(());
        };
        tracing::trace!(?identity, holds_global_lock, "joining safepoint");

        let owner = holds_global_lock.then(|| self.global_lock.leave(identity));
        let outcome = {
            let _in_pause = InPause::enter();
            self.step(participant.managed(), false)
        };
        self.resume(owner, participant.managed(), outcome)
    }

    /// Return to normal execution: reacquire the global lock, then run the
    /// actions deferred to this thread.
    fn resume(
        &self,
        owner: Option<ThreadId>,
        thread: Option<&ManagedThread>,
        outcome: Result<(), PanicPayload>,
    ) -> Result<(), PanicPayload> {
        if let Some(owner) = owner {
            self.global_lock.enter(owner);
        }
        outcome?;

        if let Some(thread) = thread {
            let ran = thread.run_deferred_actions();
            if ran > 0 {
                tracing::trace!(identity = ?thread.id(), ran, "ran deferred safepoint actions");
            }
        }
        Ok(())
    }

    fn step(&self, thread: Option<&ManagedThread>, is_driving: bool) -> Result<(), PanicPayload> {
        let phaser = self.registry.phaser();

        // wait for every thread to reach its safepoint
        phaser.arrive_and_await_advance();

        if is_driving {
            let fresh = self.epoch.load().successor();
            self.epoch.store(Arc::new(fresh));
        }

        // wait for the fresh epoch to be published
        phaser.arrive_and_await_advance();

        let action = self.action.load_full();
        let outcome = match (thread, action) {
            (Some(thread), Some(action)) if !thread.is_aborting() => {
                panic::catch_unwind(AssertUnwindSafe(|| (action.0)(thread)))
            }
            _ => Ok(()),
        };

        // wait for every thread to finish the action
        phaser.arrive_and_await_advance();
        outcome
    }

    /// Take the global lock, servicing pauses while waiting for it.
    pub fn acquire_global_lock(&self) {
        let identity = thread::current().id();
        let interrupter = Interrupter::current();
        while self
            .global_lock
            .enter_interruptibly(identity, &interrupter)
            .is_err()
        {
            self.poll_without_global_lock();
        }
    }

    pub fn release_global_lock(&self) {
        self.global_lock.leave(thread::current().id());
    }

    /// Run an interruptible blocking operation outside the global lock.
    ///
    /// Each time `action` fails with `Interrupted` the pending pause is
    /// serviced and `action` is retried. Any other error is returned. The
    /// global lock is released for the duration when `holds_global_lock`.
    pub fn run_blocking<T, F>(&self, holds_global_lock: bool, mut action: F) -> SafepointResult<T>
    where
        F: FnMut(&Interrupter) -> SafepointResult<T>,
    {
        let interrupter = Interrupter::current();
        if holds_global_lock {
            self.release_global_lock();
        }

        let result = loop {
            match action(&interrupter) {
                Err(SafepointError::Interrupted) => self.poll_without_global_lock(),
                other => break other,
            }
        };

        if holds_global_lock {
            self.acquire_global_lock();
        }
        result
    }

    pub fn is_registered(&self, identity: ThreadId) -> bool {
        self.registry.contains(identity)
    }

    pub fn registered_threads(&self) -> Vec<ThreadId> {
        self.registry.identities()
    }

    /// The runtime record bound to `identity` at registration.
    ///
    /// Lets an action running on one thread queue deferred work for another.
    pub fn managed_thread(&self, identity: ThreadId) -> Option<ManagedThread> {
        self.registry.get(identity)?.managed().cloned()
    }

    pub fn is_pause_in_progress(&self) -> bool {
        self.pause_lock.is_locked()
    }

    /// Generation of the current epoch; advances by one per completed pause.
    pub fn epoch_generation(&self) -> u64 {
        self.epoch.load().generation()
    }

    pub fn config(&self) -> &SafepointConfig {
        &self.config
    }

    pub fn stats(&self) -> SafepointStats {
        self.stats.snapshot()
    }

    pub fn subscribe(&self) -> flume::Receiver<SafepointEvent> {
        self.events.subscribe()
    }
}

impl fmt::Debug for SafepointManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SafepointManager")
            .field("epoch", &*self.epoch.load())
            .field("registry", &self.registry)
            .field("pause_in_progress", &self.is_pause_in_progress())
            .field("config", &self.config)
            .finish()
    }
}

struct LeaveOnDrop<'a> {
    manager: &'a SafepointManager,
    active: bool,
}

impl Drop for LeaveOnDrop<'_> {
    fn drop(&mut self) {
        if self.active {
            self.manager.leave_thread();
        }
    }
}
