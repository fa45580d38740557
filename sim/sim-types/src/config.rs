//! Configuration types for a physics world.
//!
//! A [`WorldConfig`] fixes every capacity up front: the engine sizes all of
//! its buffers from it at creation and never grows them while stepping.

use nalgebra::Vector3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default maximum number of bodies.
pub const DEFAULT_MAX_BODIES: usize = 10_000;
/// Default maximum number of contact manifolds per step.
pub const DEFAULT_MAX_MANIFOLDS: usize = 50_000;
/// Default fixed timestep (60 Hz).
pub const DEFAULT_TIMESTEP: f64 = 1.0 / 60.0;
/// Standard gravity along -Y.
pub const DEFAULT_GRAVITY: f64 = -9.81;

/// Main configuration for a physics world.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WorldConfig {
    /// Body store capacity.
    pub max_bodies: usize,
    /// Contact manifold capacity per step.
    pub max_manifolds: usize,
    /// Broad-phase candidate pair capacity per step.
    pub max_pairs: usize,
    /// Convex hull pool capacity.
    pub max_hulls: usize,
    /// Gravity acceleration (m/s²).
    pub gravity: Vector3<f64>,
    /// Fixed timestep for one pipeline pass (seconds).
    pub timestep: f64,
    /// Upper bound on fixed steps run by one `step_simulation` call.
    pub max_substeps: u32,
    /// Broad-phase settings.
    pub broad_phase: BroadPhaseConfig,
    /// Contact solver settings.
    pub solver: SolverConfig,
    /// Sleep settings.
    pub sleep: SleepConfig,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            max_bodies: DEFAULT_MAX_BODIES,
            max_manifolds: DEFAULT_MAX_MANIFOLDS,
            max_pairs: DEFAULT_MAX_BODIES * 10,
            max_hulls: 256,
            gravity: Vector3::new(0.0, DEFAULT_GRAVITY, 0.0),
            timestep: DEFAULT_TIMESTEP,
            max_substeps: 8,
            broad_phase: BroadPhaseConfig::default(),
            solver: SolverConfig::default(),
            sleep: SleepConfig::default(),
        }
    }
}

impl WorldConfig {
    /// Approximate bytes of preallocated state per body slot.
    ///
    /// Covers the struct-of-arrays columns plus the per-body share of the
    /// broad-phase, pair and manifold buffers.
    pub const BYTES_PER_BODY: usize = 2048;

    /// Real-time configuration (60 Hz, 10 iterations). Same as default.
    #[must_use]
    pub fn realtime() -> Self {
        Self::default()
    }

    /// Higher-fidelity configuration (120 Hz, 20 iterations).
    #[must_use]
    pub fn high_fidelity() -> Self {
        Self {
            timestep: 1.0 / 120.0,
            max_substeps: 16,
            solver: SolverConfig::high_accuracy(),
            ..Default::default()
        }
    }

    /// Cheaper configuration (60 Hz, 6 iterations).
    #[must_use]
    pub fn fast() -> Self {
        Self {
            solver: SolverConfig::fast(),
            ..Default::default()
        }
    }

    /// Configuration sized from a memory budget in bytes.
    ///
    /// Capacities scale with `bytes / BYTES_PER_BODY`; a budget too small
    /// for a single body yields a zero capacity that fails validation.
    #[must_use]
    pub fn with_arena_budget(bytes: usize) -> Self {
        let max_bodies = bytes / Self::BYTES_PER_BODY;
        Self {
            max_bodies,
            max_manifolds: max_bodies.saturating_mul(5),
            max_pairs: max_bodies.saturating_mul(10),
            ..Default::default()
        }
    }

    /// Set the body capacity, scaling pair and manifold capacity with it.
    #[must_use]
    pub fn with_max_bodies(mut self, max_bodies: usize) -> Self {
        self.max_bodies = max_bodies;
        self.max_manifolds = max_bodies.saturating_mul(5);
        self.max_pairs = max_bodies.saturating_mul(10);
        self
    }

    /// Set the fixed timestep.
    #[must_use]
    pub fn with_timestep(mut self, timestep: f64) -> Self {
        self.timestep = timestep;
        self
    }

    /// Set gravity.
    #[must_use]
    pub fn with_gravity(mut self, gravity: Vector3<f64>) -> Self {
        self.gravity = gravity;
        self
    }

    /// Disable gravity.
    #[must_use]
    pub fn zero_gravity(mut self) -> Self {
        self.gravity = Vector3::zeros();
        self
    }

    /// Set the solver configuration.
    #[must_use]
    pub fn with_solver(mut self, solver: SolverConfig) -> Self {
        self.solver = solver;
        self
    }

    /// Set the sleep configuration.
    #[must_use]
    pub fn with_sleep(mut self, sleep: SleepConfig) -> Self {
        self.sleep = sleep;
        self
    }

    /// Set the broad-phase configuration.
    #[must_use]
    pub fn with_broad_phase(mut self, broad_phase: BroadPhaseConfig) -> Self {
        self.broad_phase = broad_phase;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_bodies == 0 {
            return Err(crate::SimError::invalid_config("max_bodies must be > 0"));
        }
        if self.max_bodies >= u32::MAX as usize {
            return Err(crate::SimError::invalid_config(
                "max_bodies must fit a 32-bit body index",
            ));
        }
        if self.max_manifolds == 0 || self.max_pairs == 0 {
            return Err(crate::SimError::invalid_config(
                "max_manifolds and max_pairs must be > 0",
            ));
        }
        if !self.timestep.is_finite() || self.timestep <= 0.0 {
            return Err(crate::SimError::InvalidTimestep(self.timestep));
        }
        if self.timestep > 1.0 {
            return Err(crate::SimError::invalid_config(
                "timestep > 1 second is likely an error",
            ));
        }
        if self.max_substeps == 0 {
            return Err(crate::SimError::invalid_config("max_substeps must be > 0"));
        }
        if !self.gravity.iter().all(|g| g.is_finite()) {
            return Err(crate::SimError::invalid_config("gravity must be finite"));
        }
        self.broad_phase.validate()?;
        self.solver.validate()?;
        self.sleep.validate()?;
        Ok(())
    }

    /// Step frequency in Hz.
    #[must_use]
    pub fn frequency(&self) -> f64 {
        1.0 / self.timestep
    }
}

/// Broad-phase algorithm selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BroadPhaseAlgorithm {
    /// Uniform spatial hash grid. Near O(n) for evenly spread bodies.
    #[default]
    SpatialHash,
    /// All-pairs test. O(n²); reference and tiny scenes only.
    BruteForce,
}

impl std::fmt::Display for BroadPhaseAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SpatialHash => write!(f, "Spatial Hash"),
            Self::BruteForce => write!(f, "Brute Force"),
        }
    }
}

/// Configuration for the broad phase.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BroadPhaseConfig {
    /// Algorithm used to find candidate pairs.
    pub algorithm: BroadPhaseAlgorithm,
    /// Grid cell edge length; should match the typical body extent.
    pub cell_size: f64,
    /// Bodies covering more cells than this are handled separately
    /// (tested against every other body instead of being hashed).
    pub max_cells_per_body: usize,
}

impl Default for BroadPhaseConfig {
    fn default() -> Self {
        Self {
            algorithm: BroadPhaseAlgorithm::SpatialHash,
            cell_size: 2.0,
            max_cells_per_body: 64,
        }
    }
}

impl BroadPhaseConfig {
    /// Set the cell size.
    #[must_use]
    pub fn with_cell_size(mut self, cell_size: f64) -> Self {
        self.cell_size = cell_size;
        self
    }

    /// Select the algorithm.
    #[must_use]
    pub fn with_algorithm(mut self, algorithm: BroadPhaseAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if !self.cell_size.is_finite() || self.cell_size <= 0.0 {
            return Err(crate::SimError::invalid_config(format!(
                "cell_size must be positive, got {}",
                self.cell_size
            )));
        }
        if self.max_cells_per_body == 0 {
            return Err(crate::SimError::invalid_config(
                "max_cells_per_body must be > 0",
            ));
        }
        Ok(())
    }
}

/// Configuration for the sequential-impulse contact solver.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SolverConfig {
    /// Velocity passes over all contact points per step.
    pub iterations: usize,
    /// Fraction of penetration beyond the slop corrected per step.
    pub baumgarte: f64,
    /// Penetration tolerated without positional correction.
    pub penetration_slop: f64,
    /// Approach speed below which restitution is ignored.
    pub restitution_threshold: f64,
    /// Reuse last step's impulses as the initial guess.
    pub warm_starting: bool,
    /// Scale applied to cached impulses when warm-starting.
    pub warm_start_factor: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            iterations: 10,
            baumgarte: 0.2,
            penetration_slop: 0.005,
            restitution_threshold: 1.0,
            warm_starting: true,
            warm_start_factor: 0.9,
        }
    }
}

impl SolverConfig {
    /// More iterations, tighter slop.
    #[must_use]
    pub fn high_accuracy() -> Self {
        Self {
            iterations: 20,
            penetration_slop: 0.002,
            ..Default::default()
        }
    }

    /// Fewer iterations for large, loose scenes.
    #[must_use]
    pub fn fast() -> Self {
        Self {
            iterations: 6,
            ..Default::default()
        }
    }

    /// Set the iteration count.
    #[must_use]
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Enable or disable warm starting.
    #[must_use]
    pub fn with_warm_starting(mut self, enabled: bool) -> Self {
        self.warm_starting = enabled;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if self.iterations == 0 {
            return Err(crate::SimError::invalid_config(
                "solver iterations must be > 0",
            ));
        }
        if !(0.0..=1.0).contains(&self.baumgarte) {
            return Err(crate::SimError::invalid_config(
                "baumgarte must be in [0, 1]",
            ));
        }
        if !self.penetration_slop.is_finite() || self.penetration_slop < 0.0 {
            return Err(crate::SimError::invalid_config(
                "penetration_slop must be non-negative",
            ));
        }
        if !self.restitution_threshold.is_finite() || self.restitution_threshold < 0.0 {
            return Err(crate::SimError::invalid_config(
                "restitution_threshold must be non-negative",
            ));
        }
        if !(0.0..=1.0).contains(&self.warm_start_factor) {
            return Err(crate::SimError::invalid_config(
                "warm_start_factor must be in [0, 1]",
            ));
        }
        Ok(())
    }
}

/// Configuration for body sleeping.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SleepConfig {
    /// Whether bodies may fall asleep at all.
    pub enabled: bool,
    /// Linear speed below which a body counts as resting (m/s).
    pub linear_threshold: f64,
    /// Angular speed below which a body counts as resting (rad/s).
    pub angular_threshold: f64,
    /// Continuous resting time before sleeping (seconds).
    pub time_to_sleep: f64,
}

impl Default for SleepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            linear_threshold: 0.1,
            angular_threshold: 0.1,
            time_to_sleep: 1.0,
        }
    }
}

impl SleepConfig {
    /// Never put bodies to sleep.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if !self.linear_threshold.is_finite()
            || self.linear_threshold < 0.0
            || !self.angular_threshold.is_finite()
            || self.angular_threshold < 0.0
        {
            return Err(crate::SimError::invalid_config(
                "sleep thresholds must be non-negative",
            ));
        }
        if !self.time_to_sleep.is_finite() || self.time_to_sleep < 0.0 {
            return Err(crate::SimError::invalid_config(
                "time_to_sleep must be non-negative",
            ));
        }
        Ok(())
    }
}
