//! Per-step timings and failure counters.

use std::time::Instant;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Timings and counts from the most recent fixed step.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProfileInfo {
    /// Broad-phase time in milliseconds.
    pub broad_phase_ms: f64,
    /// Narrow-phase time in milliseconds.
    pub narrow_phase_ms: f64,
    /// Contact solver time in milliseconds.
    pub solver_ms: f64,
    /// Force, position and sleep update time in milliseconds.
    pub integration_ms: f64,
    /// Live bodies that are neither static nor sleeping.
    pub active_body_count: usize,
    /// Live bodies.
    pub body_count: usize,
    /// Manifolds with at least one point.
    pub manifold_count: usize,
    /// Candidate pairs from the broad phase.
    pub pair_count: usize,
}

impl ProfileInfo {
    /// Sum of the stage timings.
    #[must_use]
    pub fn total_ms(&self) -> f64 {
        self.broad_phase_ms + self.narrow_phase_ms + self.solver_ms + self.integration_ms
    }
}

/// Running totals of recoverable numerical and capacity problems.
///
/// Counters only grow; `World::reset` zeroes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Diagnostics {
    /// Manifolds skipped by the solver (no dynamic body, or non-finite
    /// velocity).
    pub degenerate_pairs: u64,
    /// Bodies left in place because their state was not finite.
    pub non_finite_bodies: u64,
    /// Candidate pairs dropped because the pair buffer was full.
    pub dropped_pairs: u64,
    /// Manifolds dropped because the manifold buffer was full.
    pub dropped_manifolds: u64,
}

impl Diagnostics {
    /// Whether nothing has gone wrong.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }
}

/// Milliseconds since `start`.
pub(crate) fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
