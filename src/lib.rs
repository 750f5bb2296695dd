//! Safepoint coordination for multi-threaded language runtimes.
//!
//! The crate is built from small concurrency primitives:
//!
//! - [`epoch::EpochToken`] backs the cheap `poll` check;
//! - [`phaser::Phaser`] is the multi-phase rendezvous barrier;
//! - [`thread::ThreadRegistry`] tracks which threads take part;
//! - [`interrupt::Interrupter`] wakes threads parked in blocking waits;
//! - [`global_lock::GlobalLock`] is the contract with the runtime's global lock;
//! - [`safepoint::SafepointManager`] drives the pause protocol on top of them.

pub mod epoch;
pub mod error;
pub mod global_lock;
pub mod interrupt;
pub mod phaser;
pub mod safepoint;
pub mod thread;

pub use error::{SafepointError, SafepointResult};
pub use global_lock::{GlobalInterpreterLock, GlobalLock};
pub use safepoint::{SafepointConfig, SafepointEvent, SafepointManager, SafepointStats};
pub use thread::{ManagedThread, ThreadStatus};
