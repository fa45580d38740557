//! Batched math kernels for the rigid-body engine.
//!
//! This crate is the batch half of the engine's math library. Scalar vector
//! and quaternion work goes through `nalgebra`; the loops that touch every
//! body or every hull vertex go through the 4-lane types here.
//!
//! # Architecture
//!
//! - [`Vec3x4`] - 4 `Vector3<f64>` values in structure-of-arrays layout
//! - [`Aabb4`] - 4 axis-aligned boxes for batched overlap tests
//!
//! # Hot Paths
//!
//! 1. **Integration** - gravity, force and position updates over the body
//!    store columns ([`batch_add_scaled`], [`batch_integrate_positions`])
//! 2. **Convex hull support search** - [`find_max_dot`]
//! 3. **Scene queries** - AABB scans ([`for_each_aabb_overlap`])
//!
//! # Example
//!
//! ```
//! use sim_simd::batch_integrate_positions;
//! use nalgebra::{Point3, Vector3};
//!
//! let mut positions = vec![Point3::origin(); 5];
//! let velocities = vec![Vector3::new(1.0, 0.0, 0.0); 5];
//! // Body 2 is static: its step is zero.
//! let steps = [0.5, 0.5, 0.0, 0.5, 0.5];
//!
//! batch_integrate_positions(&mut positions, &velocities, &steps);
//! assert_eq!(positions[0].x, 0.5);
//! assert_eq!(positions[2].x, 0.0);
//! assert_eq!(positions[4].x, 0.5);
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic, missing_docs)]
// SIMD code intentionally uses indexed loops for auto-vectorization patterns
#![allow(clippy::needless_range_loop)]
// Suboptimal mul_add is intentional for auto-vectorization patterns
#![allow(clippy::suboptimal_flops)]
#![allow(clippy::missing_const_for_fn)]

mod batch_ops;
mod vec3x4;

pub use batch_ops::*;
pub use vec3x4::*;
