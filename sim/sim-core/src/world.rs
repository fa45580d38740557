//! Simulation world container and body management.
//!
//! The [`World`] is the central data structure for simulation state. It
//! owns the body store, the hull pool, every step buffer and the solver,
//! and hands out generation-tagged [`BodyId`] handles.
//!
//! All buffers are sized once from [`WorldConfig`]; nothing grows after
//! construction. Stepping lives in the `stepper` module and scene queries
//! in [`query`](crate::query).

use nalgebra::{Point3, UnitQuaternion, Vector3};
use sim_types::{BodyFlags, BodyId, Material, Result, SimError, WorldConfig};

use crate::body_store::{BodyStore, RigidBody};
use crate::broad_phase::{create_broad_phase, BroadPhase, BroadPhasePair};
use crate::contact::ContactManifold;
use crate::integrators::IntegrationScratch;
use crate::island::IslandScratch;
use crate::profile::{Diagnostics, ProfileInfo};
use crate::shape::{CollisionShape, ConvexHull, HullId, HullPool};
use crate::solver::ContactSolver;

/// A rigid-body simulation.
///
/// # Example
///
/// ```
/// use sim_core::{CollisionShape, World};
/// use sim_types::WorldConfig;
/// use nalgebra::{Point3, UnitQuaternion};
///
/// let mut world = World::new(WorldConfig::default()).unwrap();
/// let ball = world.create_body(Point3::new(0.0, 5.0, 0.0), UnitQuaternion::identity());
/// world.set_body_shape(ball, CollisionShape::sphere(0.25)).unwrap();
///
/// world.step_simulation(1.0 / 60.0).unwrap();
/// assert!(world.body(ball).unwrap().position.y < 5.0);
/// ```
#[derive(Debug)]
pub struct World {
    pub(crate) config: WorldConfig,
    pub(crate) bodies: BodyStore,
    pub(crate) hulls: HullPool,
    pub(crate) broad_phase: Box<dyn BroadPhase>,
    pub(crate) pairs: Vec<BroadPhasePair>,
    pub(crate) manifolds: Vec<ContactManifold>,
    pub(crate) previous_manifolds: Vec<ContactManifold>,
    pub(crate) solver: ContactSolver,
    pub(crate) scratch: IntegrationScratch,
    pub(crate) islands: IslandScratch,
    pub(crate) accumulator: f64,
    pub(crate) time: f64,
    pub(crate) step_count: u64,
    pub(crate) profile: ProfileInfo,
    pub(crate) diagnostics: Diagnostics,
}

impl World {
    /// Create a world, preallocating every buffer from `config`.
    ///
    /// Fails with [`SimError::InvalidConfig`] when the configuration does
    /// not validate.
    pub fn new(config: WorldConfig) -> Result<Self> {
        config.validate()?;

        let world = Self {
            bodies: BodyStore::with_capacity(config.max_bodies),
            hulls: HullPool::with_capacity(config.max_hulls),
            broad_phase: create_broad_phase(
                &config.broad_phase,
                config.max_bodies,
                config.max_pairs,
            ),
            pairs: Vec::with_capacity(config.max_pairs),
            manifolds: Vec::with_capacity(config.max_manifolds),
            previous_manifolds: Vec::with_capacity(config.max_manifolds),
            solver: ContactSolver::new(config.solver.clone()),
            scratch: IntegrationScratch::with_capacity(config.max_bodies),
            islands: IslandScratch::with_capacity(config.max_bodies),
            accumulator: 0.0,
            time: 0.0,
            step_count: 0,
            profile: ProfileInfo::default(),
            diagnostics: Diagnostics::default(),
            config,
        };

        tracing::info!(
            max_bodies = world.config.max_bodies,
            max_manifolds = world.config.max_manifolds,
            max_pairs = world.config.max_pairs,
            broad_phase = %world.config.broad_phase.algorithm,
            timestep = world.config.timestep,
            "world created"
        );
        Ok(world)
    }

    /// Create a world sized from a memory budget in bytes.
    pub fn with_arena_budget(bytes: usize) -> Result<Self> {
        Self::new(WorldConfig::with_arena_budget(bytes))
    }

    /// Remove every body, hull and manifold and zero all counters.
    ///
    /// Capacity is kept. Handles issued before the reset no longer resolve.
    pub fn reset(&mut self) {
        let removed = self.bodies.live_count();
        self.bodies.clear();
        self.hulls.clear();
        self.pairs.clear();
        self.manifolds.clear();
        self.previous_manifolds.clear();
        self.accumulator = 0.0;
        self.time = 0.0;
        self.step_count = 0;
        self.profile = ProfileInfo::default();
        self.diagnostics = Diagnostics::default();
        tracing::debug!(removed, "world reset");
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Simulated time in seconds.
    #[must_use]
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Fixed steps taken since creation or reset.
    #[must_use]
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    // ---------------------------------------------------------------------
    // Bodies
    // ---------------------------------------------------------------------

    /// Create a dynamic body with the default shape (sphere, radius 0.5)
    /// and material.
    ///
    /// Returns [`BodyId::INVALID`] when the body store is full.
    pub fn create_body(
        &mut self,
        position: Point3<f64>,
        orientation: UnitQuaternion<f64>,
    ) -> BodyId {
        match self.try_create_body(position, orientation) {
            Ok(id) => id,
            Err(err) => {
                tracing::warn!(%err, "body creation failed");
                BodyId::INVALID
            }
        }
    }

    /// Create a dynamic body, reporting a full store as an error.
    pub fn try_create_body(
        &mut self,
        position: Point3<f64>,
        orientation: UnitQuaternion<f64>,
    ) -> Result<BodyId> {
        self.bodies.allocate(position, orientation, &self.hulls)
    }

    /// Snapshot of a body, or `None` for a stale or invalid handle.
    #[must_use]
    pub fn body(&self, id: BodyId) -> Option<RigidBody> {
        self.bodies.resolve(id).map(|i| self.bodies.snapshot(i))
    }

    /// Free a body's slot. Its handle and any copies go stale.
    ///
    /// Its sleeping island wakes, and so does any sleeper whose bounding
    /// box touches the removed body's, so nothing is left resting on air.
    pub fn destroy_body(&mut self, id: BodyId) -> Result<()> {
        let i = self.slot(id)?;
        let footprint = self.bodies.aabb(i);
        self.bodies.wake(i);
        self.bodies.free(i);
        for k in 0..self.bodies.len() {
            if self.bodies.is_sleeping(k) && self.bodies.aabb(k).overlaps(&footprint) {
                self.bodies.wake(k);
            }
        }
        Ok(())
    }

    /// Replace a body's shape, recomputing mass, inertia and AABB.
    ///
    /// Planes make the body static.
    pub fn set_body_shape(&mut self, id: BodyId, shape: CollisionShape) -> Result<()> {
        let i = self.slot(id)?;
        shape.validate(&self.hulls)?;

        if shape.is_plane() {
            self.make_static(i);
        }
        self.bodies.shapes[i] = shape;
        self.bodies.update_mass(i, &self.hulls);
        self.bodies.refresh_aabb(i, &self.hulls);
        self.bodies.wake(i);
        Ok(())
    }

    /// Replace a body's material; density changes update the mass.
    pub fn set_body_material(&mut self, id: BodyId, material: Material) -> Result<()> {
        let i = self.slot(id)?;
        self.bodies.materials[i] = material;
        self.bodies.update_mass(i, &self.hulls);
        Ok(())
    }

    /// Set linear and angular (world frame) velocity and wake the body.
    ///
    /// Static bodies cannot move and return [`SimError::StaticBody`].
    pub fn set_body_velocity(
        &mut self,
        id: BodyId,
        linear: Vector3<f64>,
        angular: Vector3<f64>,
    ) -> Result<()> {
        let i = self.slot(id)?;
        if self.bodies.is_static(i) {
            return Err(SimError::StaticBody(id));
        }
        self.bodies.linear_velocities[i] = linear;
        self.bodies.angular_velocities[i] = angular;
        self.bodies.wake(i);
        Ok(())
    }

    /// Teleport a body. Works on static bodies too.
    ///
    /// Non-finite positions or orientations are rejected with
    /// [`SimError::NonFiniteTransform`] and leave the body untouched.
    pub fn set_body_transform(
        &mut self,
        id: BodyId,
        position: Point3<f64>,
        orientation: UnitQuaternion<f64>,
    ) -> Result<()> {
        let i = self.slot(id)?;
        let finite = position.iter().all(|v| v.is_finite())
            && orientation.coords.iter().all(|v| v.is_finite());
        if !finite {
            return Err(SimError::NonFiniteTransform(id));
        }
        self.bodies.positions[i] = position;
        self.bodies.orientations[i] = UnitQuaternion::new_normalize(orientation.into_inner());
        self.bodies.refresh_aabb(i, &self.hulls);
        self.bodies.wake(i);
        Ok(())
    }

    /// Make a body static (infinite mass, never integrated) or dynamic.
    ///
    /// Plane bodies cannot become dynamic.
    pub fn set_body_static(&mut self, id: BodyId, is_static: bool) -> Result<()> {
        let i = self.slot(id)?;
        if is_static {
            self.make_static(i);
        } else {
            if self.bodies.shapes[i].is_plane() {
                return Err(SimError::invalid_shape("plane bodies are always static"));
            }
            self.bodies.flags[i].remove(BodyFlags::STATIC);
            self.bodies.sleep_timers[i] = 0.0;
        }
        self.bodies.update_mass(i, &self.hulls);
        Ok(())
    }

    fn make_static(&mut self, i: usize) {
        self.bodies.flags[i].insert(BodyFlags::STATIC);
        self.bodies.clear_sleep(i);
        self.bodies.linear_velocities[i] = Vector3::zeros();
        self.bodies.angular_velocities[i] = Vector3::zeros();
        self.bodies.forces[i] = Vector3::zeros();
        self.bodies.torques[i] = Vector3::zeros();
    }

    /// Whether a live body is static. Stale handles report `false`.
    #[must_use]
    pub fn is_body_static(&self, id: BodyId) -> bool {
        self.bodies
            .resolve(id)
            .is_some_and(|i| self.bodies.is_static(i))
    }

    /// Whether a live body is asleep. Stale handles report `false`.
    #[must_use]
    pub fn is_body_sleeping(&self, id: BodyId) -> bool {
        self.bodies
            .resolve(id)
            .is_some_and(|i| self.bodies.flags[i].contains(BodyFlags::SLEEPING))
    }

    // ---------------------------------------------------------------------
    // Forces
    // ---------------------------------------------------------------------

    /// Accumulate a force at a world point for the next step.
    ///
    /// Off-centre points also add torque `(p - x) × f`. Static bodies
    /// ignore forces.
    pub fn apply_force(
        &mut self,
        id: BodyId,
        force: Vector3<f64>,
        world_point: Point3<f64>,
    ) -> Result<()> {
        let i = self.slot(id)?;
        if self.bodies.is_static(i) {
            return Ok(());
        }
        let r = world_point - self.bodies.positions[i];
        self.bodies.forces[i] += force;
        self.bodies.torques[i] += r.cross(&force);
        self.bodies.wake(i);
        Ok(())
    }

    /// Change a body's velocity immediately by an impulse at a world point.
    ///
    /// Static bodies ignore impulses.
    pub fn apply_impulse(
        &mut self,
        id: BodyId,
        impulse: Vector3<f64>,
        world_point: Point3<f64>,
    ) -> Result<()> {
        let i = self.slot(id)?;
        if self.bodies.is_static(i) {
            return Ok(());
        }
        let r = world_point - self.bodies.positions[i];
        let dw = self.bodies.inv_inertia_world(i, &r.cross(&impulse));
        self.bodies.linear_velocities[i] += impulse * self.bodies.inverse_masses[i];
        self.bodies.angular_velocities[i] += dw;
        self.bodies.wake(i);
        Ok(())
    }

    /// Set world gravity.
    pub fn set_gravity(&mut self, gravity: Vector3<f64>) {
        self.config.gravity = gravity;
    }

    /// World gravity.
    #[must_use]
    pub fn gravity(&self) -> Vector3<f64> {
        self.config.gravity
    }

    // ---------------------------------------------------------------------
    // Hulls
    // ---------------------------------------------------------------------

    /// Register a convex hull (points in body frame) for use by
    /// [`CollisionShape::ConvexHull`].
    pub fn add_convex_hull(&mut self, points: &[Point3<f64>]) -> Result<HullId> {
        let hull = ConvexHull::new(points)?;
        self.hulls.insert(hull).map_err(|err| {
            tracing::warn!(%err, "convex hull rejected");
            err
        })
    }

    /// Look up a registered hull.
    #[must_use]
    pub fn hull(&self, id: HullId) -> Option<&ConvexHull> {
        self.hulls.get(id)
    }

    // ---------------------------------------------------------------------
    // Counters
    // ---------------------------------------------------------------------

    /// Timings and counts from the most recent step.
    #[must_use]
    pub fn profile_info(&self) -> ProfileInfo {
        self.profile
    }

    /// Running failure counters.
    #[must_use]
    pub fn diagnostics(&self) -> Diagnostics {
        self.diagnostics
    }

    /// Live bodies.
    #[must_use]
    pub fn body_count(&self) -> usize {
        self.bodies.live_count()
    }

    /// Live bodies that are neither static nor asleep.
    #[must_use]
    pub fn active_body_count(&self) -> usize {
        self.bodies
            .flags
            .iter()
            .filter(|f| f.is_awake_dynamic())
            .count()
    }

    /// Manifolds produced by the most recent step.
    #[must_use]
    pub fn manifold_count(&self) -> usize {
        self.manifolds.len()
    }

    /// Candidate pairs produced by the most recent broad phase.
    #[must_use]
    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    /// Contact manifolds from the most recent step, sorted by body slot.
    #[must_use]
    pub fn manifolds(&self) -> &[ContactManifold] {
        &self.manifolds
    }

    /// Body capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.bodies.capacity()
    }

    fn slot(&self, id: BodyId) -> Result<usize> {
        self.bodies.resolve(id).ok_or(SimError::InvalidBodyId(id))
    }
}

impl Drop for World {
    fn drop(&mut self) {
        tracing::debug!(
            bodies = self.bodies.live_count(),
            steps = self.step_count,
            "world dropped"
        );
    }
}
