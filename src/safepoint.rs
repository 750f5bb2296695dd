//! Safepoint coordination
//!
//! This module lets one thread pause every other registered thread at a
//! well-defined point, run an action once on each of them, and resume them.
//!
//! ## Architecture
//!
//! - **Fast Path**: `poll` is a single acquire load of the current epoch token
//! - **Slow Path**: a thread that sees an invalidated epoch joins the pause
//!   and walks the three rendezvous phases with every other participant
//! - **Blocked Threads**: interrupted out of interruptible waits so they poll
//! - **Deferred Work**: actions queued for a thread during a pause run on that
//!   thread once it has resumed
//!
//! ## Usage
//!
//! ```
//! use safepoint::global_lock::GlobalInterpreterLock;
//! use safepoint::safepoint::SafepointManager;
//! use safepoint::thread::ManagedThread;
//! use std::sync::Arc;
//!
//! let manager = SafepointManager::new(Arc::new(GlobalInterpreterLock::new()));
//! manager.enter_thread(ManagedThread::current()).unwrap();
//! manager.acquire_global_lock();
//!
//! // In generated code or hot loops
//! manager.poll();
//!
//! // When the runtime needs every thread stopped
//! manager
//!     .pause_all_and_execute(|thread| {
//!         thread.defer(|| println!("resumed"));
//!     })
//!     .unwrap();
//!
//! manager.release_global_lock();
//! manager.leave_thread();
//! ```

mod config;
mod events;
mod manager;
mod pause_lock;
mod stats;


pub use config::SafepointConfig;
pub use events::SafepointEvent;
pub use manager::SafepointManager;
pub use stats::SafepointStats;
