//! Epoch tokens backing the safepoint fast path.
//!
//! A token starts valid and can be invalidated exactly once. Checking a token
//! is a single acquire load, cheap enough to run at every poll site. The
//! manager publishes a fresh token through `arc_swap` whenever it resumes
//! normal execution, so a stale token never becomes valid again.
//!
//! # Examples
//!
//! ```
//! use safepoint::epoch::EpochToken;
//!
//! let token = EpochToken::first();
//! assert!(token.check().is_ok());
//!
//! token.invalidate();
//! assert!(token.check().is_err());
//!
//! let next = token.successor();
//! assert!(next.check().is_ok());
//! assert_eq!(next.generation(), token.generation() + 1);
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{SafepointError, SafepointResult};

/// Invalidatable validity marker
pub struct EpochToken {
    generation: u64,
    valid: AtomicBool,
}

impl EpochToken {
    /// The token a freshly created manager starts with.
    pub fn first() -> Self {
        Self::with_generation(0)
    }

    fn with_generation(generation: u64) -> Self {
        Self {
            generation,
            valid: AtomicBool::new(true),
        }
    }

    /// A new, valid token distinct from this one.
    pub fn successor(&self) -> Self {
        Self::with_generation(self.generation.wrapping_add(1))
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Fails with `EpochInvalidated` once `invalidate` has been called.
    #[inline(always)]
    pub fn check(&self) -> SafepointResult<()> {
        if self.valid.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(SafepointError::EpochInvalidated)
        }
    }

    #[inline(always)]
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Idempotent; never blocks.
    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
    }
}

impl fmt::Debug for EpochToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EpochToken")
            .field("generation", &self.generation)
            .field("valid", &self.is_valid())
            .finish()
    }
}
