//! Sequential-impulse contact solver with warm starting.
//!
//! Each step the solver:
//!
//! 1. **Prepares** every manifold: lever arms, effective masses along the
//!    normal and both tangents, and a velocity bias combining restitution
//!    with Baumgarte position correction
//! 2. **Warm-starts** points that match a point of last step's manifold for
//!    the same pair (including generations) and feature id, reapplying the
//!    cached impulses scaled by `warm_start_factor`
//! 3. Runs a **fixed number of iterations** over manifolds in sorted pair
//!    order, each applying a clamped normal impulse and then friction
//!    clamped to the Coulomb cone
//!
//! The iteration count never depends on convergence, so identical inputs
//! always give identical outputs.
//!
//! Static and sleeping bodies take part with infinite mass: they push but
//! are never pushed.

use nalgebra::Vector3;
use sim_types::SolverConfig;

use crate::body_store::BodyStore;
use crate::contact::{tangent_basis, ContactManifold, ContactPoint};
use crate::profile::Diagnostics;

/// Mass data for the two bodies of a manifold, as seen by the solver.
#[derive(Debug, Clone, Copy)]
struct PairMass {
    a: usize,
    b: usize,
    inv_mass_a: f64,
    inv_mass_b: f64,
    dynamic_a: bool,
    dynamic_b: bool,
}

impl PairMass {
    fn new(bodies: &BodyStore, manifold: &ContactManifold) -> Self {
        let a = manifold.body_a.index() as usize;
        let b = manifold.body_b.index() as usize;
        let dynamic_a = bodies.flags[a].is_awake_dynamic() && bodies.inverse_masses[a] > 0.0;
        let dynamic_b = bodies.flags[b].is_awake_dynamic() && bodies.inverse_masses[b] > 0.0;
        Self {
            a,
            b,
            inv_mass_a: if dynamic_a { bodies.inverse_masses[a] } else { 0.0 },
            inv_mass_b: if dynamic_b { bodies.inverse_masses[b] } else { 0.0 },
            dynamic_a,
            dynamic_b,
        }
    }

    fn inv_inertia_a(&self, bodies: &BodyStore, v: &Vector3<f64>) -> Vector3<f64> {
        if self.dynamic_a {
            bodies.inv_inertia_world(self.a, v)
        } else {
            Vector3::zeros()
        }
    }

    fn inv_inertia_b(&self, bodies: &BodyStore, v: &Vector3<f64>) -> Vector3<f64> {
        if self.dynamic_b {
            bodies.inv_inertia_world(self.b, v)
        } else {
            Vector3::zeros()
        }
    }

    /// Inverse effective mass along `dir` at lever arms `r_a`, `r_b`.
    fn effective_inverse(
        &self,
        bodies: &BodyStore,
        r_a: &Vector3<f64>,
        r_b: &Vector3<f64>,
        dir: &Vector3<f64>,
    ) -> f64 {
        let ra_x = r_a.cross(dir);
        let rb_x = r_b.cross(dir);
        self.inv_mass_a
            + self.inv_mass_b
            + ra_x.dot(&self.inv_inertia_a(bodies, &ra_x))
            + rb_x.dot(&self.inv_inertia_b(bodies, &rb_x))
    }

    /// Velocity of B relative to A at the contact.
    fn relative_velocity(&self, bodies: &BodyStore, point: &ContactPoint) -> Vector3<f64> {
        let va = bodies.linear_velocities[self.a]
            + bodies.angular_velocities[self.a].cross(&point.r_a);
        let vb = bodies.linear_velocities[self.b]
            + bodies.angular_velocities[self.b].cross(&point.r_b);
        vb - va
    }

    /// Apply `impulse` to B and its opposite to A.
    fn apply(&self, bodies: &mut BodyStore, point: &ContactPoint, impulse: &Vector3<f64>) {
        if self.dynamic_a {
            let dw = self.inv_inertia_a(bodies, &point.r_a.cross(impulse));
            bodies.linear_velocities[self.a] -= impulse * self.inv_mass_a;
            bodies.angular_velocities[self.a] -= dw;
        }
        if self.dynamic_b {
            let dw = self.inv_inertia_b(bodies, &point.r_b.cross(impulse));
            bodies.linear_velocities[self.b] += impulse * self.inv_mass_b;
            bodies.angular_velocities[self.b] += dw;
        }
    }

    fn velocities_finite(&self, bodies: &BodyStore) -> bool {
        [self.a, self.b].iter().all(|&i| {
            bodies.linear_velocities[i].iter().all(|v| v.is_finite())
                && bodies.angular_velocities[i].iter().all(|v| v.is_finite())
        })
    }
}

/// Sequential-impulse solver over a step's contact manifolds.
#[derive(Debug, Clone)]
pub struct ContactSolver {
    config: SolverConfig,
}

impl ContactSolver {
    /// Create a solver with the given settings.
    #[must_use]
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    /// Solver settings.
    #[must_use]
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Run prepare, warm start and all velocity iterations.
    ///
    /// `manifolds` and `previous` must both be sorted by [`ContactManifold::key`].
    pub(crate) fn solve(
        &self,
        bodies: &mut BodyStore,
        manifolds: &mut [ContactManifold],
        previous: &[ContactManifold],
        dt: f64,
        diagnostics: &mut Diagnostics,
    ) {
        for manifold in manifolds.iter_mut() {
            self.prepare(bodies, manifold, dt, diagnostics);
            if !manifold.degenerate {
                self.warm_start(bodies, manifold, previous);
            }
        }

        for _ in 0..self.config.iterations {
            for manifold in manifolds.iter_mut() {
                if !manifold.degenerate {
                    solve_manifold(bodies, manifold);
                }
            }
        }
    }

    fn prepare(
        &self,
        bodies: &BodyStore,
        manifold: &mut ContactManifold,
        dt: f64,
        diagnostics: &mut Diagnostics,
    ) {
        let pair = PairMass::new(bodies, manifold);
        manifold.degenerate = (!pair.dynamic_a && !pair.dynamic_b) || !pair.velocities_finite(bodies);
        if manifold.degenerate {
            diagnostics.degenerate_pairs += 1;
            return;
        }

        let restitution = manifold.restitution;
        let cfg = &self.config;
        let pa = bodies.positions[pair.a];
        let pb = bodies.positions[pair.b];

        for point in manifold.points_mut() {
            point.r_a = point.position - pa;
            point.r_b = point.position - pb;
            point.tangents = tangent_basis(&point.normal);
            point.normal_impulse = 0.0;
            point.tangent_impulse = [0.0; 2];

            let k_n = pair.effective_inverse(bodies, &point.r_a, &point.r_b, &point.normal);
            point.normal_mass = if k_n > 0.0 { 1.0 / k_n } else { 0.0 };
            for k in 0..2 {
                let k_t = pair.effective_inverse(bodies, &point.r_a, &point.r_b, &point.tangents[k]);
                point.tangent_mass[k] = if k_t > 0.0 { 1.0 / k_t } else { 0.0 };
            }

            let vn = pair.relative_velocity(bodies, point).dot(&point.normal);
            let bounce = if vn < -cfg.restitution_threshold {
                -restitution * vn
            } else {
                0.0
            };
            let push = cfg.baumgarte / dt * (point.depth - cfg.penetration_slop).max(0.0);
            point.velocity_bias = bounce.max(push);
        }
    }

    fn warm_start(
        &self,
        bodies: &mut BodyStore,
        manifold: &mut ContactManifold,
        previous: &[ContactManifold],
    ) {
        if !self.config.warm_starting {
            return;
        }
        let Ok(found) = previous.binary_search_by_key(&manifold.key(), ContactManifold::key) else {
            return;
        };
        let old = &previous[found];
        // Same slots, different bodies.
        if old.body_a != manifold.body_a || old.body_b != manifold.body_b {
            return;
        }

        let pair = PairMass::new(bodies, manifold);
        let factor = self.config.warm_start_factor;
        for point in manifold.points_mut() {
            let Some(cached) = old.points().iter().find(|p| p.feature == point.feature) else {
                continue;
            };
            point.normal_impulse = cached.normal_impulse * factor;
            point.tangent_impulse = [
                cached.tangent_impulse[0] * factor,
                cached.tangent_impulse[1] * factor,
            ];
            let impulse = point.normal * point.normal_impulse
                + point.tangents[0] * point.tangent_impulse[0]
                + point.tangents[1] * point.tangent_impulse[1];
            pair.apply(bodies, point, &impulse);
        }
    }
}

fn solve_manifold(bodies: &mut BodyStore, manifold: &mut ContactManifold) {
    let pair = PairMass::new(bodies, manifold);
    let friction = manifold.friction;

    for point in manifold.points_mut() {
        let vn = pair.relative_velocity(bodies, point).dot(&point.normal);
        let lambda = point.normal_mass * (point.velocity_bias - vn);
        let old = point.normal_impulse;
        point.normal_impulse = (old + lambda).max(0.0);
        let impulse = point.normal * (point.normal_impulse - old);
        pair.apply(bodies, point, &impulse);
    }

    for point in manifold.points_mut() {
        let v = pair.relative_velocity(bodies, point);
        let old = point.tangent_impulse;
        let mut new = [0.0; 2];
        for k in 0..2 {
            new[k] = old[k] - point.tangent_mass[k] * v.dot(&point.tangents[k]);
        }
        // Clamp to the friction cone, not per tangent.
        let limit = friction * point.normal_impulse;
        let magnitude = new[0].hypot(new[1]);
        if magnitude > limit {
            let scale = if magnitude > 0.0 { limit / magnitude } else { 0.0 };
            new[0] *= scale;
            new[1] *= scale;
        }
        point.tangent_impulse = new;
        let impulse =
            point.tangents[0] * (new[0] - old[0]) + point.tangents[1] * (new[1] - old[1]);
        pair.apply(bodies, point, &impulse);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::contact::ContactPoint;
    use crate::shape::HullPool;
    use approx::assert_relative_eq;
    use nalgebra::{Point3, UnitQuaternion};
    use sim_types::BodyFlags;

    /// Sphere `b` resting on static sphere `a`, touching at the origin.
    fn resting_pair(approach: f64) -> (BodyStore, ContactManifold) {
        let hulls = HullPool::with_capacity(0);
        let mut bodies = BodyStore::with_capacity(2);
        let a = bodies
            .allocate(Point3::new(0.0, -0.5, 0.0), UnitQuaternion::identity(), &hulls)
            .unwrap();
        let b = bodies
            .allocate(Point3::new(0.0, 0.5, 0.0), UnitQuaternion::identity(), &hulls)
            .unwrap();
        bodies.flags[0].insert(BodyFlags::STATIC);
        bodies.update_mass(0, &hulls);
        bodies.linear_velocities[1] = Vector3::new(0.0, -approach, 0.0);

        let mut m = ContactManifold::new(a, b);
        m.friction = 0.5;
        m.restitution = 0.0;
        m.add_point(ContactPoint::new(Point3::origin(), Vector3::y(), 0.0, 0));
        (bodies, m)
    }

    #[test]
    fn test_normal_impulse_stops_approach() {
        let (mut bodies, m) = resting_pair(2.0);
        let solver = ContactSolver::new(SolverConfig::default());
        let mut manifolds = [m];
        let mut diag = Diagnostics::default();
        solver.solve(&mut bodies, &mut manifolds, &[], 1.0 / 60.0, &mut diag);

        assert_relative_eq!(bodies.linear_velocities[1].y, 0.0, epsilon = 1e-9);
        assert_eq!(bodies.linear_velocities[0], Vector3::zeros());
        assert!(manifolds[0].points()[0].normal_impulse > 0.0);
        assert!(diag.is_clean());
    }

    #[test]
    fn test_restitution_above_threshold() {
        let (mut bodies, mut m) = resting_pair(4.0);
        m.restitution = 0.5;
        let solver = ContactSolver::new(SolverConfig::default());
        let mut manifolds = [m];
        solver.solve(&mut bodies, &mut manifolds, &[], 1.0 / 60.0, &mut Diagnostics::default());
        assert_relative_eq!(bodies.linear_velocities[1].y, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_separating_contact_adds_no_impulse() {
        let (mut bodies, m) = resting_pair(-1.0);
        let solver = ContactSolver::new(SolverConfig::default());
        let mut manifolds = [m];
        solver.solve(&mut bodies, &mut manifolds, &[], 1.0 / 60.0, &mut Diagnostics::default());
        assert_eq!(manifolds[0].points()[0].normal_impulse, 0.0);
        assert_relative_eq!(bodies.linear_velocities[1].y, 1.0);
    }

    #[test]
    fn test_friction_bounded_by_cone() {
        let (mut bodies, m) = resting_pair(1.0);
        bodies.linear_velocities[1].x = 10.0;
        let solver = ContactSolver::new(SolverConfig::default());
        let mut manifolds = [m];
        solver.solve(&mut bodies, &mut manifolds, &[], 1.0 / 60.0, &mut Diagnostics::default());

        let p = manifolds[0].points()[0];
        let tangent = p.tangent_impulse[0].hypot(p.tangent_impulse[1]);
        assert!(tangent <= 0.5 * p.normal_impulse + 1e-12);
        assert!(bodies.linear_velocities[1].x < 10.0);
    }

    #[test]
    fn test_two_static_bodies_are_degenerate() {
        let (mut bodies, m) = resting_pair(0.0);
        bodies.flags[1].insert(BodyFlags::STATIC);
        let solver = ContactSolver::new(SolverConfig::default());
        let mut manifolds = [m];
        let mut diag = Diagnostics::default();
        solver.solve(&mut bodies, &mut manifolds, &[], 1.0 / 60.0, &mut diag);
        assert_eq!(diag.degenerate_pairs, 1);
        assert!(manifolds[0].degenerate);
    }

    #[test]
    fn test_warm_start_requires_matching_feature() {
        let (mut bodies, m) = resting_pair(0.0);
        let mut previous = m.clone();
        previous.points_mut()[0].normal_impulse = 1.0;

        let solver = ContactSolver::new(SolverConfig::default().with_iterations(1));
        let mut manifolds = [m.clone()];
        solver.warm_start(&mut bodies, &mut manifolds[0], std::slice::from_ref(&previous));
        assert_relative_eq!(manifolds[0].points()[0].normal_impulse, 0.9);

        previous.points_mut()[0].feature = 7;
        let mut manifolds = [m];
        solver.warm_start(&mut bodies, &mut manifolds[0], std::slice::from_ref(&previous));
        assert_eq!(manifolds[0].points()[0].normal_impulse, 0.0);
    }
}
