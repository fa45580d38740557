//! Core types for the rigid-body engine.
//!
//! This crate provides the plain data shared by every layer of the engine:
//!
//! - [`BodyId`] - Generation-tagged handle into the body store
//! - [`BodyFlags`] - Alive / static / sleeping state bits
//! - [`Pose`], [`Twist`] - Transform and velocity of a body
//! - [`MassProperties`] - Mass and principal moments of inertia
//! - [`Material`] - Density, restitution, friction, damping
//! - [`WorldConfig`] - Capacities, timestep, solver and sleep settings
//! - [`SimError`] - Error type for every fallible engine operation
//!
//! # Design Philosophy
//!
//! These types are **pure data**. They carry no collision or solver logic
//! and can be shared with a host game loop, serialized for replay (with the
//! `serde` feature), or inspected by a debug overlay.
//!
//! # Coordinate System
//!
//! - X: right
//! - Y: up (default gravity is `-9.81` along Y)
//! - Z: toward the viewer
//! - Right-handed
//!
//! # Example
//!
//! ```
//! use sim_types::{MassProperties, Material, WorldConfig};
//! use nalgebra::Vector3;
//!
//! let config = WorldConfig::realtime().with_max_bodies(1_000);
//! assert!(config.validate().is_ok());
//!
//! let steel = Material::new(7.8, 0.2, 0.6);
//! let props = MassProperties::cuboid(steel.density * 8.0, Vector3::new(1.0, 1.0, 1.0));
//! assert!(props.inverse_mass() > 0.0);
//! ```

#![doc(html_root_url = "https://docs.rs/sim-types/0.7.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,          // mul_add style changes aren't always clearer
    clippy::cast_precision_loss,       // usize to f64 is fine for counts
    clippy::missing_errors_doc,        // Error docs added where non-obvious
)]

mod body;
mod config;
mod error;
mod material;

pub use body::{BodyFlags, BodyId, MassProperties, Pose, Twist};
pub use config::{
    BroadPhaseAlgorithm, BroadPhaseConfig, SleepConfig, SolverConfig, WorldConfig,
    DEFAULT_GRAVITY, DEFAULT_MAX_BODIES, DEFAULT_MAX_MANIFOLDS, DEFAULT_TIMESTEP,
};
pub use error::SimError;
pub use material::{Material, DEFAULT_DENSITY, DEFAULT_FRICTION, DEFAULT_RESTITUTION};

// Re-export math types for convenience
pub use nalgebra::{Point3, UnitQuaternion, Vector3};

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, SimError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_pose_and_twist_compose() {
        let pose = Pose::from_position(Point3::new(1.0, 2.0, 3.0));
        let twist = Twist::new(Vector3::new(1.0, 0.0, 0.0), Vector3::zeros());

        assert_eq!(pose.position.y, 2.0);
        assert_eq!(twist.speed(), 1.0);
        assert!(pose.is_finite() && twist.is_finite());
    }

    #[test]
    fn test_result_alias() {
        fn fails() -> Result<()> {
            Err(SimError::invalid_config("nope"))
        }
        assert!(fails().is_err());
    }
}
