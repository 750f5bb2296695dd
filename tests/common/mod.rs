//! Shared harness: mutator threads that hold the global lock and poll.

#![allow(dead_code)]

use safepoint::{GlobalInterpreterLock, ManagedThread, SafepointManager, ThreadStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread::{self, JoinHandle};

pub struct Harness {
    pub manager: Arc<SafepointManager>,
    pub gil: GlobalInterpreterLock,
    pub stop: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl Harness {
    pub fn new() -> Self {
        let gil = GlobalInterpreterLock::new();
        Self {
            manager: Arc::new(SafepointManager::new(Arc::new(gil.clone()))),
            gil,
            stop: Arc::new(AtomicBool::new(false)),
            handles: Vec::new(),
        }
    }

    /// Spawn a mutator that registers, waits on `ready`, then loops: poll,
    /// run `on_iteration` with the global lock held, briefly yield the lock.
    pub fn spawn_mutator<F>(
        &mut self,
        ready: &Arc<Barrier>,
        status: ThreadStatus,
        mut on_iteration: F,
    ) where
        F: FnMut(&SafepointManager, &ManagedThread) + Send + 'static,
    {
        let manager = Arc::clone(&self.manager);
        let gil = self.gil.clone();
        let stop = Arc::clone(&self.stop);
        let ready = Arc::clone(ready);

        self.handles.push(thread::spawn(move || {
            let me = ManagedThread::current();
            me.set_status(status);
            manager.enter_thread(me.clone()).unwrap();
            ready.wait();

            manager.acquire_global_lock();
            while !stop.load(Ordering::Acquire) {
                manager.poll();
                assert!(gil.is_held_by(me.id()), "global lock lost across a pause");
                on_iteration(&manager, &me);
                manager.release_global_lock();
                thread::yield_now();
                manager.acquire_global_lock();
            }
            manager.release_global_lock();
            manager.leave_thread();
        }));
    }

    pub fn finish(self) {
        self.stop.store(true, Ordering::Release);
        for handle in self.handles {
            handle.join().unwrap();
        }
    }
}
