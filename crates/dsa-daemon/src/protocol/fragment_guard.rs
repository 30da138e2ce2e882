//! Fragment backpressure guard.
//!
//! A peer may stream an arbitrarily large request one fragment at a time.
//! The guard is consulted on every fragment event, before the bytes are
//! buffered, and trips when the buffered total would exceed the per-connection
//! ceiling ([`IdmConfig::buffer_size`](dsa_core::config::IdmConfig)).
//!
//! # Invariants
//!
//! - [`FragmentGuard::observe`] returns [`FragmentVerdict::Abort`] at most
//!   once per guard, for the first delta with `enqueued + delta > ceiling`.
//! - A delta that keeps the sum at or below the ceiling never trips it.

use std::sync::atomic::{AtomicBool, Ordering};

use super::pdu::AbortReason;

/// Abort reason sent when the ceiling is exceeded.
pub const FRAGMENT_ABORT_REASON: AbortReason = AbortReason::UnboundRequest;

/// What to do after a fragment event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentVerdict {
    /// Keep buffering.
    Continue,
    /// Abort the association and unbind.
    Abort(AbortReason),
}

/// Per-connection ceiling on buffered, incomplete request bytes.
#[derive(Debug)]
pub struct FragmentGuard {
    ceiling: usize,
    tripped: AtomicBool,
}

impl FragmentGuard {
    /// Creates a guard with the given ceiling in bytes.
    #[must_use]
    pub const fn new(ceiling: usize) -> Self {
        Self {
            ceiling,
            tripped: AtomicBool::new(false),
        }
    }

    /// The configured ceiling.
    #[must_use]
    pub const fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Returns `true` once the guard has tripped.
    #[must_use]
    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }

    /// Checks a fragment of `delta` bytes against `enqueued` buffered bytes.
    pub fn observe(&self, enqueued: usize, delta: usize) -> FragmentVerdict {
        // Saturation counts as overflow.
        let total = enqueued.saturating_add(delta);
        if total <= self.ceiling {
            return FragmentVerdict::Continue;
        }
        if self.tripped.swap(true, Ordering::SeqCst) {
            return FragmentVerdict::Continue;
        }
        FragmentVerdict::Abort(FRAGMENT_ABORT_REASON)
    }
}
