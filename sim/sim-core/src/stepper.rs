//! Simulation stepping and control flow.
//!
//! One fixed step runs, in order:
//!
//! 1. Velocity integration (gravity, accumulated force and torque, damping)
//! 2. Broad phase over the cached AABBs
//! 3. Narrow phase, one manifold per touching pair, waking sleepers hit by
//!    bodies that were moving when the step began
//! 4. Contact solve (prepare, warm start, iterations)
//! 5. Position and orientation integration, AABB refresh
//! 6. Island sleep update over this step's manifolds, then force clearing
//!
//! The previous step's manifolds are kept in a second buffer for warm
//! starting; the two buffers swap at the start of every narrow phase.
//!
//! # Example
//!
//! ```
//! use sim_core::{CollisionShape, World};
//! use sim_types::WorldConfig;
//! use nalgebra::{Point3, UnitQuaternion};
//!
//! let mut world = World::new(WorldConfig::default()).unwrap();
//! let ground = world.create_body(Point3::origin(), UnitQuaternion::identity());
//! world.set_body_shape(ground, CollisionShape::ground_plane(0.0)).unwrap();
//! let ball = world.create_body(Point3::new(0.0, 2.0, 0.0), UnitQuaternion::identity());
//!
//! // Half a frame is banked, one and a half frames run one step.
//! assert_eq!(world.step_simulation(0.5 / 60.0).unwrap(), 0);
//! assert_eq!(world.step_simulation(1.0 / 60.0).unwrap(), 1);
//!
//! for _ in 0..120 {
//!     world.step();
//! }
//! let y = world.body(ball).unwrap().position.y;
//! assert!((y - 0.5).abs() < 0.02);
//! ```

use std::time::Instant;

use sim_types::{BodyFlags, Material, Result, SimError};

use crate::broad_phase::BroadPhaseInput;
use crate::contact::ContactManifold;
use crate::integrators::{clear_forces, integrate_positions, integrate_velocities};
use crate::island::update_sleep;
use crate::narrow_phase::collide;
use crate::profile::elapsed_ms;
use crate::world::World;

impl World {
    /// Advance by `dt` seconds of wall time.
    ///
    /// Time accumulates and whole fixed steps run, at most
    /// `max_substeps` per call; surplus time beyond that is dropped.
    /// Returns the number of steps taken.
    pub fn step_simulation(&mut self, dt: f64) -> Result<u32> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(SimError::InvalidTimestep(dt));
        }

        let timestep = self.config.timestep;
        self.accumulator += dt;
        let mut steps = 0;
        while self.accumulator >= timestep && steps < self.config.max_substeps {
            self.step();
            self.accumulator -= timestep;
            steps += 1;
        }

        if self.accumulator >= timestep {
            tracing::warn!(
                dropped_s = self.accumulator - self.accumulator % timestep,
                max_substeps = self.config.max_substeps,
                "falling behind, dropping simulation time"
            );
            self.accumulator %= timestep;
        }
        Ok(steps)
    }

    /// Run exactly one fixed step of `config.timestep` seconds.
    pub fn step(&mut self) {
        let dt = self.config.timestep;

        let start = Instant::now();
        self.islands.record_motion(&self.bodies, &self.config.sleep);
        integrate_velocities(&mut self.bodies, &self.config.gravity, dt, &mut self.scratch);
        let mut integration_ms = elapsed_ms(start);

        let start = Instant::now();
        self.run_broad_phase();
        let broad_phase_ms = elapsed_ms(start);

        let start = Instant::now();
        self.run_narrow_phase();
        let narrow_phase_ms = elapsed_ms(start);

        let start = Instant::now();
        self.solver.solve(
            &mut self.bodies,
            &mut self.manifolds,
            &self.previous_manifolds,
            dt,
            &mut self.diagnostics,
        );
        let solver_ms = elapsed_ms(start);

        let start = Instant::now();
        integrate_positions(
            &mut self.bodies,
            &self.hulls,
            dt,
            &mut self.scratch,
            &mut self.diagnostics,
        );
        update_sleep(
            &mut self.bodies,
            &self.manifolds,
            &self.config.sleep,
            dt,
            &mut self.islands,
        );
        clear_forces(&mut self.bodies);
        integration_ms += elapsed_ms(start);

        self.time += dt;
        self.step_count += 1;

        self.profile.broad_phase_ms = broad_phase_ms;
        self.profile.narrow_phase_ms = narrow_phase_ms;
        self.profile.solver_ms = solver_ms;
        self.profile.integration_ms = integration_ms;
        self.profile.body_count = self.body_count();
        self.profile.active_body_count = self.active_body_count();
        self.profile.manifold_count = self.manifolds.len();
        self.profile.pair_count = self.pairs.len();

        tracing::trace!(
            step = self.step_count,
            pairs = self.profile.pair_count,
            manifolds = self.profile.manifold_count,
            active = self.profile.active_body_count,
            total_ms = self.profile.total_ms(),
            "step"
        );
    }

    fn run_broad_phase(&mut self) {
        let input = BroadPhaseInput::new(
            &self.bodies.aabb_mins,
            &self.bodies.aabb_maxs,
            &self.bodies.flags,
        );
        let dropped = self.broad_phase.find_pairs(&input, &mut self.pairs);
        if dropped > 0 {
            self.diagnostics.dropped_pairs += dropped as u64;
            tracing::warn!(
                dropped,
                max_pairs = self.config.max_pairs,
                "pair buffer full"
            );
        }
    }

    fn run_narrow_phase(&mut self) {
        std::mem::swap(&mut self.manifolds, &mut self.previous_manifolds);
        self.manifolds.clear();

        let mut dropped = 0_u64;
        for k in 0..self.pairs.len() {
            let pair = self.pairs[k];
            let (a, b) = (pair.a as usize, pair.b as usize);

            let mut manifold = ContactManifold::new(self.bodies.id_at(a), self.bodies.id_at(b));
            let touching = collide(
                &self.bodies.shapes[a],
                &self.bodies.pose(a),
                &self.bodies.shapes[b],
                &self.bodies.pose(b),
                &self.hulls,
                &mut manifold,
            );
            if !touching {
                continue;
            }
            if self.manifolds.len() >= self.config.max_manifolds {
                dropped += 1;
                continue;
            }

            let (ma, mb) = (&self.bodies.materials[a], &self.bodies.materials[b]);
            manifold.restitution = Material::combine_restitution(ma, mb);
            manifold.friction = Material::combine_friction(ma, mb);
            self.wake_on_contact(a, b);
            self.manifolds.push(manifold);
        }

        if dropped > 0 {
            self.diagnostics.dropped_manifolds += dropped;
            tracing::warn!(
                dropped,
                max_manifolds = self.config.max_manifolds,
                "manifold buffer full"
            );
        }
    }

    /// Wake a sleeping body (and its island) touched by an awake body
    /// that was above the sleep thresholds when the step began.
    fn wake_on_contact(&mut self, a: usize, b: usize) {
        for (sleeper, other) in [(a, b), (b, a)] {
            if self.bodies.flags[sleeper].contains(BodyFlags::SLEEPING)
                && self.bodies.flags[other].is_awake_dynamic()
                && self.islands.was_moving(other)
            {
                self.bodies.wake(sleeper);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use crate::shape::CollisionShape;
    use crate::world::World;
    use approx::assert_relative_eq;
    use nalgebra::{Point3, UnitQuaternion, Vector3};
    use sim_types::{SleepConfig, WorldConfig};

    fn world(max_bodies: usize) -> World {
        World::new(WorldConfig::default().with_max_bodies(max_bodies)).unwrap()
    }

    fn ground(w: &mut World) {
        let g = w.create_body(Point3::origin(), UnitQuaternion::identity());
        w.set_body_shape(g, CollisionShape::ground_plane(0.0)).unwrap();
    }

    #[test]
    fn test_step_simulation_rejects_bad_dt() {
        let mut w = world(4);
        assert!(w.step_simulation(0.0).is_err());
        assert!(w.step_simulation(-1.0).is_err());
        assert!(w.step_simulation(f64::NAN).is_err());
        assert_eq!(w.step_count(), 0);
    }

    #[test]
    fn test_step_simulation_caps_substeps() {
        let mut w = world(4);
        let max = w.config().max_substeps;
        let steps = w.step_simulation(100.0).unwrap();
        assert_eq!(steps, max);
        // Surplus beyond the cap is dropped.
        assert!(w.accumulator < w.config().timestep);
        assert_eq!(w.step_count(), u64::from(max));
    }

    #[test]
    fn test_free_fall() {
        let mut w = world(4);
        let id = w.create_body(Point3::new(0.0, 10.0, 0.0), UnitQuaternion::identity());
        for _ in 0..60 {
            w.step();
        }
        let body = w.body(id).unwrap();
        // Damping of 0.01/s shaves a little off the ideal 9.81 m/s.
        assert!(body.linear_velocity.y < -9.5 && body.linear_velocity.y > -9.81);
        assert_relative_eq!(w.time(), 1.0, epsilon = 1e-9);
        assert_eq!(w.profile_info().body_count, 1);
    }

    #[test]
    fn test_sphere_rests_on_plane() {
        let mut w = world(4);
        ground(&mut w);
        let ball = w.create_body(Point3::new(0.0, 1.0, 0.0), UnitQuaternion::identity());
        // Settled after the bounce, not yet asleep.
        for _ in 0..60 {
            w.step();
        }
        let body = w.body(ball).unwrap();
        assert!((body.position.y - 0.5).abs() < 0.01, "y = {}", body.position.y);
        assert_eq!(w.manifold_count(), 1);
        assert!(w.diagnostics().is_clean());
    }

    #[test]
    fn test_resting_sphere_falls_asleep() {
        let mut w = world(4);
        ground(&mut w);
        let ball = w.create_body(Point3::new(0.0, 0.5, 0.0), UnitQuaternion::identity());
        for _ in 0..240 {
            w.step();
        }
        assert!(w.is_body_sleeping(ball));
        assert_eq!(w.active_body_count(), 0);

        w.apply_force(ball, Vector3::new(0.0, 100.0, 0.0), Point3::new(0.0, 0.5, 0.0))
            .unwrap();
        assert!(!w.is_body_sleeping(ball));
    }

    #[test]
    fn test_sleep_disabled_keeps_bodies_awake() {
        let config = WorldConfig::default()
            .with_max_bodies(4)
            .with_sleep(SleepConfig::disabled());
        let mut w = World::new(config).unwrap();
        ground(&mut w);
        let ball = w.create_body(Point3::new(0.0, 0.5, 0.0), UnitQuaternion::identity());
        for _ in 0..240 {
            w.step();
        }
        assert!(!w.is_body_sleeping(ball));
    }

    #[test]
    fn test_moving_body_wakes_sleeper() {
        let mut w = world(4);
        ground(&mut w);
        let sleeper = w.create_body(Point3::new(0.0, 0.5, 0.0), UnitQuaternion::identity());
        for _ in 0..240 {
            w.step();
        }
        assert!(w.is_body_sleeping(sleeper));

        let striker = w.create_body(Point3::new(-3.0, 0.5, 0.0), UnitQuaternion::identity());
        w.set_body_velocity(striker, Vector3::new(10.0, 0.0, 0.0), Vector3::zeros())
            .unwrap();
        for _ in 0..60 {
            w.step();
        }
        assert!(w.body(sleeper).unwrap().position.x > 0.1);
    }

    #[test]
    fn test_static_body_never_moves() {
        let mut w = world(4);
        let wall = w.create_body(Point3::new(0.0, 2.0, 0.0), UnitQuaternion::identity());
        w.set_body_shape(wall, CollisionShape::cuboid(Vector3::new(1.0, 1.0, 1.0)))
            .unwrap();
        w.set_body_static(wall, true).unwrap();
        let ball = w.create_body(Point3::new(0.0, 5.0, 0.0), UnitQuaternion::identity());
        for _ in 0..120 {
            w.apply_force(wall, Vector3::new(1e6, 0.0, 0.0), Point3::origin())
                .unwrap();
            w.step();
        }
        let body = w.body(wall).unwrap();
        assert_eq!(body.position, Point3::new(0.0, 2.0, 0.0));
        assert_eq!(body.linear_velocity, Vector3::zeros());
        assert!(w.body(ball).unwrap().position.y > 3.4);
    }

    #[test]
    fn test_manifold_overflow_counted() {
        let config = WorldConfig {
            max_manifolds: 1,
            ..WorldConfig::default().with_max_bodies(8)
        };
        let mut w = World::new(config).unwrap();
        ground(&mut w);
        for x in [-2.0, 0.0, 2.0] {
            w.create_body(Point3::new(x, 0.45, 0.0), UnitQuaternion::identity());
        }
        w.step();
        assert_eq!(w.manifold_count(), 1);
        assert_eq!(w.diagnostics().dropped_manifolds, 2);
    }
}
