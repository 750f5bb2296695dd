//! Demonstration of pausing every runtime thread
//!
//! Four threads share a global lock and poll at their safe points. The main
//! thread pauses them all, counts how many ran the action, and queues a
//! deferred action on each thread that runs once it has resumed.

use safepoint::{GlobalInterpreterLock, ManagedThread, SafepointManager};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

fn main() {
    println!("Safepoint Demo");
    println!("==============");

    let manager = Arc::new(SafepointManager::new(Arc::new(GlobalInterpreterLock::new())));
    let stop = Arc::new(AtomicBool::new(false));
    let ready = Arc::new(Barrier::new(4));
    manager.enter_thread(ManagedThread::current()).unwrap();

    println!("\n1. Starting three mutator threads");
    let handles: Vec<_> = (0..3)
        .map(|i| {
            let manager = Arc::clone(&manager);
            let stop = Arc::clone(&stop);
            let ready = Arc::clone(&ready);
            thread::Builder::new()
                .name(format!("mutator-{i}"))
                .spawn(move || {
                    manager.enter_thread(ManagedThread::current()).unwrap();
                    ready.wait();
                    manager.acquire_global_lock();
                    while !stop.load(Ordering::Acquire) {
                        manager.poll();
                        manager.release_global_lock();
                        thread::yield_now();
                        manager.acquire_global_lock();
                    }
                    manager.release_global_lock();
                    manager.leave_thread();
                })
                .unwrap()
        })
        .collect();
    ready.wait();

    println!("\n2. Pausing all threads");
    let visits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&visits);
    manager.acquire_global_lock();
    manager
        .pause_all_and_execute(move |thread| {
            counter.fetch_add(1, Ordering::SeqCst);
            let name = thread.name().unwrap_or("main").to_owned();
            thread.defer(move || println!("   {name} resumed"));
        })
        .unwrap();
    manager.release_global_lock();
    println!("   Action ran on {} threads", visits.load(Ordering::SeqCst));

    stop.store(true, Ordering::Release);
    for handle in handles {
        handle.join().unwrap();
    }
    manager.leave_thread();

    println!("\n3. Safepoint statistics:");
    let stats = manager.stats();
    println!("   Pauses: {}", stats.pauses);
    println!("   Slow-path polls: {}", stats.slow_path_polls);
    println!("   Longest pause: {:?}", stats.max_pause_time);
}
