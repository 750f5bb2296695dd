//! Dynamically sized, multi-phase rendezvous barrier.
//!
//! Parties register and deregister at any time. Each call to
//! [`Phaser::arrive_and_await_advance`] blocks until every registered party
//! has arrived at the same phase; the last arrival advances the phase and
//! releases everyone. A deregistration during an in-flight phase lowers the
//! number of arrivals that phase needs, so a departing party is never
//! waited for.
//!
//! # Examples
//!
//! ```
//! use safepoint::phaser::Phaser;
//! use std::sync::Arc;
//! use std::thread;
//!
//! let phaser = Arc::new(Phaser::new());
//! phaser.register();
//! phaser.register();
//!
//! let other = Arc::clone(&phaser);
//! let handle = thread::spawn(move || other.arrive_and_await_advance());
//!
//! let phase = phaser.arrive_and_await_advance();
//! assert_eq!(handle.join().unwrap(), phase);
//! assert_eq!(phaser.phase(), 1);
//! ```

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct PhaserState {
    parties: usize,
    arrived: usize,
    phase: u64,
}

impl PhaserState {
    fn advance(&mut self) -> u64 {
        self.arrived = 0;
        self.phase = self.phase.wrapping_add(1);
        self.phase
    }
}

/// Party-counted cyclic barrier
#[derive(Debug, Default)]
pub struct Phaser {
    state: Mutex<PhaserState>,
    advanced: Condvar,
}

impl Phaser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one party. Returns the phase the party will first take part in.
    pub fn register(&self) -> u64 {
        let mut state = self.state.lock();
        state.parties += 1;
        state.phase
    }

    /// Remove one party without waiting for the phase to advance.
    ///
    /// If every remaining party has already arrived, the phase advances.
    pub fn arrive_and_deregister(&self) -> u64 {
        let mut state = self.state.lock();
        debug_assert!(state.parties > 0, "deregistering from an empty phaser");
        state.parties = state.parties.saturating_sub(1);
        if state.arrived > 0 && state.arrived >= state.parties {
            let phase = state.advance();
            self.advanced.notify_all();
            return phase;
        }
        state.phase
    }

    /// Arrive at the current phase and block until all parties have arrived.
    /// Returns the new phase number.
    pub fn arrive_and_await_advance(&self) -> u64 {
        let mut state = self.state.lock();
        let phase = state.phase;
        state.arrived += 1;
        if state.arrived >= state.parties {
            let next = state.advance();
            self.advanced.notify_all();
            return next;
        }
        while state.phase == phase {
            self.advanced.wait(&mut state);
        }
        state.phase
    }

    pub fn phase(&self) -> u64 {
        self.state.lock().phase
    }

    pub fn registered_parties(&self) -> usize {
        self.state.lock().parties
    }

    /// Parties that have arrived at the current phase.
    pub fn arrived_parties(&self) -> usize {
        self.state.lock().arrived
    }
}
