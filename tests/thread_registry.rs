use safepoint::interrupt::Interrupter;
use safepoint::thread::{ManagedThread, ThreadRegistry};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

#[test]
fn registers_and_enumerates_participants() {
    let registry = Arc::new(ThreadRegistry::new());
    registry.register(Interrupter::current(), Some(ManagedThread::current()), true);

    let other = Arc::clone(&registry);
    let foreign = thread::spawn(move || {
        other.register(Interrupter::current(), None, false);
        thread::current().id()
    })
    .join()
    .unwrap();

    let ids: HashSet<_> = registry.identities().into_iter().collect();
    assert_eq!(ids, HashSet::from([thread::current().id(), foreign]));

    let foreign_entry = registry.get(foreign).unwrap();
    assert!(foreign_entry.managed().is_none());
    assert!(!foreign_entry.interruptible());
}

#[test]
fn registry_thread_safety() {
    let registry = Arc::new(ThreadRegistry::new());
    let mut handles = vec![];

    for _ in 0..5 {
        let registry_clone = Arc::clone(&registry);
        handles.push(thread::spawn(move || {
            registry_clone.register(Interrupter::current(), Some(ManagedThread::current()), true)
        }));
    }

    for handle in handles {
        assert!(handle.join().unwrap());
    }

    assert_eq!(registry.len(), 5);
    assert_eq!(registry.phaser().registered_parties(), 5);
}

#[test]
fn interruptible_threads_are_signalled() {
    let registry = Arc::new(ThreadRegistry::new());
    let (tx, rx) = std::sync::mpsc::channel();

    let sleeper = {
        let registry = Arc::clone(&registry);
        thread::spawn(move || {
            let me = Interrupter::current();
            registry.register(Arc::clone(&me), None, true);
            tx.send(()).unwrap();
            me.sleep(std::time::Duration::from_secs(60))
        })
    };

    rx.recv().unwrap();
    registry.for_each_interruptible(|thread| thread.interrupter().interrupt());
    assert!(sleeper.join().unwrap().is_err());
}

#[test]
fn managed_thread_handles_share_state() {
    let thread = ManagedThread::current();
    let clone = thread.clone();
    assert!(thread.ptr_eq(&clone));
    assert_eq!(thread.id(), clone.id());

    clone.defer(|| {});
    assert_eq!(thread.deferred_len(), 1);
    assert!(!thread.ptr_eq(&ManagedThread::current()));
}
