//! Real-time rigid-body simulation engine.
//!
//! This crate provides the world, collision pipeline and contact solver for
//! game-style rigid-body physics. It builds on [`sim_types`] for the plain
//! data and on [`sim_simd`] for batched vector kernels.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          World                              │
//! │  Owns: body store, hull pool, step buffers, solver          │
//! │  Provides: body management, forces, queries, counters       │
//! └─────────────────────────┬───────────────────────────────────┘
//!                           │ step()
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  integrate velocities → broad phase → narrow phase          │
//! │  → contact solver → integrate positions → sleep             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! - [`broad_phase`]: uniform spatial hash grid (brute force for testing)
//! - [`narrow_phase`]: closed-form pair tests, GJK/EPA for convex hulls
//! - [`solver`]: sequential impulses with warm starting and friction cones
//! - [`integrators`]: semi-implicit Euler over struct-of-arrays columns
//! - contact islands: bodies touching each other sleep and wake together
//! - [`query`]: ray casts and overlap tests
//!
//! Every buffer is sized once from [`WorldConfig`](sim_types::WorldConfig);
//! stepping does not allocate. Pairs and manifolds are processed in sorted
//! body order, so identical worlds stepped identically stay bit-identical.
//!
//! # Quick Start
//!
//! ```
//! use sim_core::{CollisionShape, World};
//! use sim_types::{Material, WorldConfig};
//! use nalgebra::{Point3, UnitQuaternion, Vector3};
//!
//! let mut world = World::new(WorldConfig::realtime().with_max_bodies(100)).unwrap();
//!
//! // Static ground.
//! let ground = world.create_body(Point3::origin(), UnitQuaternion::identity());
//! world.set_body_shape(ground, CollisionShape::ground_plane(0.0)).unwrap();
//!
//! // A crate dropped from two metres.
//! let crate_id = world.create_body(Point3::new(0.0, 2.0, 0.0), UnitQuaternion::identity());
//! world
//!     .set_body_shape(crate_id, CollisionShape::cuboid(Vector3::new(0.5, 0.5, 0.5)))
//!     .unwrap();
//! world.set_body_material(crate_id, Material::new(0.5, 0.1, 0.8)).unwrap();
//!
//! for _ in 0..120 {
//!     world.step_simulation(1.0 / 60.0).unwrap();
//! }
//!
//! let body = world.body(crate_id).unwrap();
//! assert!((body.position.y - 0.5).abs() < 0.02);
//! println!("broad phase: {:.3} ms", world.profile_info().broad_phase_ms);
//! ```
//!
//! # Diagnostics
//!
//! Recoverable problems never panic a step. Skipped manifolds, frozen
//! non-finite bodies and buffer overflows are counted in
//! [`Diagnostics`] and logged through `tracing`.

#![doc(html_root_url = "https://docs.rs/sim-core/0.7.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,          // mul_add style changes aren't always clearer
    clippy::cast_precision_loss,       // usize to f64 is fine for counts
    clippy::cast_possible_truncation,  // slot indices are bounded by max_bodies < u32::MAX
    clippy::missing_errors_doc,        // Error docs added where non-obvious
)]

mod body_store;
pub mod broad_phase;
pub mod contact;
pub mod gjk_epa;
pub mod integrators;
mod island;
pub mod narrow_phase;
mod profile;
pub mod query;
pub mod shape;
pub mod solver;
mod stepper;
mod world;

pub use body_store::RigidBody;
pub use broad_phase::{
    create_broad_phase, Aabb, BroadPhase, BroadPhaseInput, BroadPhasePair, BruteForce,
    SpatialHashGrid,
};
pub use contact::{ContactManifold, ContactPoint, MAX_CONTACT_POINTS};
pub use gjk_epa::{gjk_epa_contact, ConvexShape, GjkContact};
pub use narrow_phase::{collide, CONTACT_EPSILON};
pub use profile::{Diagnostics, ProfileInfo};
pub use query::{RayHit, RaycastHit};
pub use shape::{
    create_box, create_capsule, create_plane, create_sphere, CollisionShape, ConvexHull, HullId,
    HullPool,
};
pub use solver::ContactSolver;
pub use world::World;

// Re-export the shared types so most users need a single import.
pub use sim_types::{
    BodyFlags, BodyId, BroadPhaseAlgorithm, BroadPhaseConfig, Material, Pose, Result, SimError,
    SleepConfig, SolverConfig, Twist, WorldConfig,
};
