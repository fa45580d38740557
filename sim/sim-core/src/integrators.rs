//! Semi-implicit Euler integration over the body store.
//!
//! Velocities are updated first (gravity, accumulated force and torque,
//! damping), the contact solver then corrects them, and positions advance
//! with the corrected velocities:
//!
//! ```text
//! v(t+dt) = v(t) + (g + F/m) * dt
//! x(t+dt) = x(t) + v(t+dt) * dt
//! q(t+dt) = normalize(exp(ω(t+dt) * dt) * q(t))
//! ```
//!
//! This ordering is symplectic and keeps resting contact stable at large
//! timesteps. Linear updates run through the `sim_simd` batch kernels with
//! a per-body scale that is zero for static and sleeping bodies.
//!
//! # Example
//!
//! ```
//! use sim_core::integrators::integrate_orientation;
//! use nalgebra::{UnitQuaternion, Vector3};
//!
//! // Half a turn about Y in one second.
//! let q = integrate_orientation(
//!     &UnitQuaternion::identity(),
//!     &Vector3::new(0.0, std::f64::consts::PI, 0.0),
//!     1.0,
//! );
//! let forward = q * Vector3::z();
//! assert!((forward.z + 1.0).abs() < 1e-9);
//! ```

use nalgebra::{UnitQuaternion, Vector3};

use crate::body_store::BodyStore;
use crate::profile::Diagnostics;
use crate::shape::HullPool;

/// Angular speeds below this leave the orientation untouched.
pub const MIN_ANGULAR_SPEED: f64 = 1e-9;

/// Rotate `q` by world-frame angular velocity `omega` over `dt`.
///
/// The result is renormalized so drift never accumulates.
#[must_use]
pub fn integrate_orientation(
    q: &UnitQuaternion<f64>,
    omega: &Vector3<f64>,
    dt: f64,
) -> UnitQuaternion<f64> {
    if omega.norm() < MIN_ANGULAR_SPEED {
        return *q;
    }
    let delta = UnitQuaternion::from_scaled_axis(omega * dt);
    UnitQuaternion::new_normalize((delta * q).into_inner())
}

/// Velocity scale after linear damping `c` over `dt`: `max(0, 1 - c·dt)`.
#[must_use]
pub fn damping_factor(c: f64, dt: f64) -> f64 {
    (1.0 - c * dt).max(0.0)
}

/// Per-body scales reused by every step.
#[derive(Debug, Clone, Default)]
pub(crate) struct IntegrationScratch {
    steps: Vec<f64>,
    force_scales: Vec<f64>,
}

impl IntegrationScratch {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            steps: Vec::with_capacity(capacity),
            force_scales: Vec::with_capacity(capacity),
        }
    }
}

/// Apply gravity, accumulated forces and damping to awake dynamic bodies.
pub(crate) fn integrate_velocities(
    bodies: &mut BodyStore,
    gravity: &Vector3<f64>,
    dt: f64,
    scratch: &mut IntegrationScratch,
) {
    scratch.steps.clear();
    scratch.force_scales.clear();
    for i in 0..bodies.len() {
        if bodies.flags[i].is_awake_dynamic() {
            scratch.steps.push(dt);
            scratch.force_scales.push(bodies.inverse_masses[i] * dt);
        } else {
            scratch.steps.push(0.0);
            scratch.force_scales.push(0.0);
        }
    }

    sim_simd::batch_add_splat_scaled(&mut bodies.linear_velocities, gravity, &scratch.steps);
    sim_simd::batch_add_scaled(
        &mut bodies.linear_velocities,
        &bodies.forces,
        &scratch.force_scales,
    );

    for i in 0..bodies.len() {
        if scratch.steps[i] == 0.0 {
            continue;
        }
        let dw = bodies.inv_inertia_world(i, &bodies.torques[i]) * dt;
        bodies.angular_velocities[i] += dw;

        let material = bodies.materials[i];
        bodies.linear_velocities[i] *= damping_factor(material.linear_damping, dt);
        bodies.angular_velocities[i] *= damping_factor(material.angular_damping, dt);
    }
}

/// Advance positions and orientations of awake dynamic bodies and refresh
/// their bounding boxes.
///
/// Bodies with non-finite velocity stay where they are; their velocity is
/// zeroed and the event is counted.
pub(crate) fn integrate_positions(
    bodies: &mut BodyStore,
    hulls: &HullPool,
    dt: f64,
    scratch: &mut IntegrationScratch,
    diagnostics: &mut Diagnostics,
) {
    scratch.steps.clear();
    for i in 0..bodies.len() {
        let step = if !bodies.flags[i].is_awake_dynamic() {
            0.0
        } else if bodies.linear_velocities[i].iter().all(|v| v.is_finite())
            && bodies.angular_velocities[i].iter().all(|v| v.is_finite())
        {
            dt
        } else {
            diagnostics.non_finite_bodies += 1;
            tracing::warn!(body = %bodies.id_at(i), "non-finite velocity, body not advanced");
            bodies.linear_velocities[i] = Vector3::zeros();
            bodies.angular_velocities[i] = Vector3::zeros();
            0.0
        };
        scratch.steps.push(step);
    }

    sim_simd::batch_integrate_positions(
        &mut bodies.positions,
        &bodies.linear_velocities,
        &scratch.steps,
    );

    for i in 0..bodies.len() {
        if scratch.steps[i] == 0.0 {
            continue;
        }
        bodies.orientations[i] =
            integrate_orientation(&bodies.orientations[i], &bodies.angular_velocities[i], dt);
        bodies.refresh_aabb(i, hulls);
    }
}

/// Zero every accumulated force and torque.
pub(crate) fn clear_forces(bodies: &mut BodyStore) {
    bodies.forces.fill(Vector3::zeros());
    bodies.torques.fill(Vector3::zeros());
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Point3;
    use sim_types::{BodyFlags, Material};

    fn one_body() -> (BodyStore, HullPool, IntegrationScratch) {
        let hulls = HullPool::with_capacity(0);
        let mut bodies = BodyStore::with_capacity(2);
        bodies
            .allocate(Point3::new(0.0, 10.0, 0.0), UnitQuaternion::identity(), &hulls)
            .unwrap();
        bodies.materials[0] = Material::default().with_damping(0.0, 0.0);
        (bodies, hulls, IntegrationScratch::with_capacity(2))
    }

    #[test]
    fn test_free_fall_semi_implicit() {
        let (mut bodies, hulls, mut scratch) = one_body();
        let g = Vector3::new(0.0, -10.0, 0.0);
        let dt = 0.1;
        let mut diag = Diagnostics::default();
        for _ in 0..10 {
            integrate_velocities(&mut bodies, &g, dt, &mut scratch);
            integrate_positions(&mut bodies, &hulls, dt, &mut scratch, &mut diag);
        }
        // v_n = -10 * n * dt, x_n = x0 - 10 * dt² * n(n+1)/2
        assert_relative_eq!(bodies.linear_velocities[0].y, -10.0, epsilon = 1e-9);
        assert_relative_eq!(bodies.positions[0].y, 10.0 - 5.5, epsilon = 1e-9);
        assert_relative_eq!(bodies.aabb_mins[0].y, 4.0, epsilon = 1e-9);
        assert!(diag.is_clean());
    }

    #[test]
    fn test_force_scaled_by_inverse_mass() {
        let (mut bodies, _, mut scratch) = one_body();
        let m = bodies.masses[0];
        bodies.forces[0] = Vector3::new(2.0 * m, 0.0, 0.0);
        integrate_velocities(&mut bodies, &Vector3::zeros(), 0.5, &mut scratch);
        assert_relative_eq!(bodies.linear_velocities[0].x, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_static_and_sleeping_untouched() {
        let (mut bodies, hulls, mut scratch) = one_body();
        bodies.flags[0].insert(BodyFlags::SLEEPING);
        let g = Vector3::new(0.0, -10.0, 0.0);
        integrate_velocities(&mut bodies, &g, 0.1, &mut scratch);
        integrate_positions(&mut bodies, &hulls, 0.1, &mut scratch, &mut Diagnostics::default());
        assert_eq!(bodies.linear_velocities[0], Vector3::zeros());
        assert_eq!(bodies.positions[0], Point3::new(0.0, 10.0, 0.0));
    }

    #[test]
    fn test_damping() {
        let (mut bodies, _, mut scratch) = one_body();
        bodies.materials[0] = Material::default().with_damping(2.0, 20.0);
        bodies.linear_velocities[0] = Vector3::new(1.0, 0.0, 0.0);
        bodies.angular_velocities[0] = Vector3::new(0.0, 1.0, 0.0);
        integrate_velocities(&mut bodies, &Vector3::zeros(), 0.1, &mut scratch);
        assert_relative_eq!(bodies.linear_velocities[0].x, 0.8, epsilon = 1e-12);
        assert_eq!(bodies.angular_velocities[0].y, 0.0);
    }

    #[test]
    fn test_non_finite_body_not_advanced() {
        let (mut bodies, hulls, mut scratch) = one_body();
        bodies.linear_velocities[0] = Vector3::new(f64::NAN, 0.0, 0.0);
        let mut diag = Diagnostics::default();
        integrate_positions(&mut bodies, &hulls, 0.1, &mut scratch, &mut diag);
        assert_eq!(diag.non_finite_bodies, 1);
        assert_eq!(bodies.positions[0], Point3::new(0.0, 10.0, 0.0));
        assert_eq!(bodies.linear_velocities[0], Vector3::zeros());
    }

    #[test]
    fn test_orientation_stays_normalized() {
        let mut q = UnitQuaternion::identity();
        let omega = Vector3::new(0.3, -1.2, 2.0);
        for _ in 0..1000 {
            q = integrate_orientation(&q, &omega, 1.0 / 60.0);
        }
        assert_relative_eq!(q.into_inner().norm(), 1.0, epsilon = 1e-12);
        assert_eq!(
            integrate_orientation(&q, &Vector3::new(1e-12, 0.0, 0.0), 1.0),
            q
        );
    }

    #[test]
    fn test_clear_forces() {
        let (mut bodies, _, _) = one_body();
        bodies.forces[0] = Vector3::x();
        bodies.torques[0] = Vector3::y();
        clear_forces(&mut bodies);
        assert_eq!(bodies.forces[0], Vector3::zeros());
        assert_eq!(bodies.torques[0], Vector3::zeros());
    }
}
