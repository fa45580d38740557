//! Struct-of-arrays storage for rigid bodies.
//!
//! Every per-body quantity lives in its own column, indexed by slot. The
//! integrator walks whole columns through `sim_simd` batch kernels and the
//! broad phase reads the AABB columns directly, without gathering.
//!
//! Columns are reserved to the configured capacity up front; a slot is
//! pushed the first time it is used and afterwards recycled through a free
//! list, so no column ever reallocates.

use nalgebra::{Point3, UnitQuaternion, Vector3};
use sim_types::{BodyFlags, BodyId, Material, MassProperties, Pose, Result, SimError, Twist};

use crate::broad_phase::Aabb;
use crate::island::NO_ISLAND;
use crate::shape::{CollisionShape, HullPool};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Value snapshot of one body, returned by `World::body`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RigidBody {
    /// Handle the snapshot was taken through.
    pub id: BodyId,
    /// World position of the body origin.
    pub position: Point3<f64>,
    /// Orientation (unit quaternion).
    pub orientation: UnitQuaternion<f64>,
    /// Linear velocity (m/s).
    pub linear_velocity: Vector3<f64>,
    /// Angular velocity in world frame (rad/s).
    pub angular_velocity: Vector3<f64>,
    /// Mass, zero for static bodies.
    pub mass: f64,
    /// Inverse mass, zero for static bodies.
    pub inverse_mass: f64,
    /// Diagonal of the body-frame inverse inertia tensor.
    pub inverse_inertia: Vector3<f64>,
    /// Collision shape.
    pub shape: CollisionShape,
    /// Surface and bulk material.
    pub material: Material,
    /// Cached world-space bounding box.
    pub aabb: Aabb,
    /// State flags.
    pub flags: BodyFlags,
    /// Seconds spent below the sleep thresholds.
    pub sleep_timer: f64,
    /// Force accumulated since the last step.
    pub force: Vector3<f64>,
    /// Torque accumulated since the last step.
    pub torque: Vector3<f64>,
}

impl RigidBody {
    /// Whether the body has infinite mass.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(BodyFlags::STATIC)
    }

    /// Whether the body is asleep.
    #[must_use]
    pub fn is_sleeping(&self) -> bool {
        self.flags.contains(BodyFlags::SLEEPING)
    }

    /// Position and orientation.
    #[must_use]
    pub fn pose(&self) -> Pose {
        Pose::from_position_rotation(self.position, self.orientation)
    }

    /// Linear and angular velocity.
    #[must_use]
    pub fn twist(&self) -> Twist {
        Twist::new(self.linear_velocity, self.angular_velocity)
    }
}

/// Fixed-capacity body table.
#[derive(Debug, Clone)]
pub(crate) struct BodyStore {
    pub(crate) positions: Vec<Point3<f64>>,
    pub(crate) orientations: Vec<UnitQuaternion<f64>>,
    pub(crate) linear_velocities: Vec<Vector3<f64>>,
    pub(crate) angular_velocities: Vec<Vector3<f64>>,
    pub(crate) forces: Vec<Vector3<f64>>,
    pub(crate) torques: Vec<Vector3<f64>>,
    pub(crate) masses: Vec<f64>,
    pub(crate) inverse_masses: Vec<f64>,
    pub(crate) inverse_inertias: Vec<Vector3<f64>>,
    pub(crate) shapes: Vec<CollisionShape>,
    pub(crate) materials: Vec<Material>,
    pub(crate) aabb_mins: Vec<Point3<f64>>,
    pub(crate) aabb_maxs: Vec<Point3<f64>>,
    pub(crate) flags: Vec<BodyFlags>,
    pub(crate) sleep_timers: Vec<f64>,
    /// Sleeping island a body belongs to, or [`NO_ISLAND`].
    pub(crate) island_tags: Vec<u32>,
    generations: Vec<u32>,
    free_list: Vec<u32>,
    capacity: usize,
    live: usize,
}

impl BodyStore {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            positions: Vec::with_capacity(capacity),
            orientations: Vec::with_capacity(capacity),
            linear_velocities: Vec::with_capacity(capacity),
            angular_velocities: Vec::with_capacity(capacity),
            forces: Vec::with_capacity(capacity),
            torques: Vec::with_capacity(capacity),
            masses: Vec::with_capacity(capacity),
            inverse_masses: Vec::with_capacity(capacity),
            inverse_inertias: Vec::with_capacity(capacity),
            shapes: Vec::with_capacity(capacity),
            materials: Vec::with_capacity(capacity),
            aabb_mins: Vec::with_capacity(capacity),
            aabb_maxs: Vec::with_capacity(capacity),
            flags: Vec::with_capacity(capacity),
            sleep_timers: Vec::with_capacity(capacity),
            island_tags: Vec::with_capacity(capacity),
            generations: Vec::with_capacity(capacity),
            free_list: Vec::with_capacity(capacity),
            capacity,
            live: 0,
        }
    }

    /// Slots ever used (live or free).
    pub(crate) fn len(&self) -> usize {
        self.positions.len()
    }

    pub(crate) fn live_count(&self) -> usize {
        self.live
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Take a slot for a new dynamic body with the default shape and
    /// material.
    pub(crate) fn allocate(
        &mut self,
        position: Point3<f64>,
        orientation: UnitQuaternion<f64>,
        hulls: &HullPool,
    ) -> Result<BodyId> {
        let index = if let Some(index) = self.free_list.pop() {
            index as usize
        } else if self.len() < self.capacity {
            self.push_slot();
            self.len() - 1
        } else {
            return Err(SimError::capacity("body", self.capacity));
        };

        self.positions[index] = position;
        self.orientations[index] = UnitQuaternion::new_normalize(orientation.into_inner());
        self.linear_velocities[index] = Vector3::zeros();
        self.angular_velocities[index] = Vector3::zeros();
        self.forces[index] = Vector3::zeros();
        self.torques[index] = Vector3::zeros();
        self.shapes[index] = CollisionShape::default();
        self.materials[index] = Material::default();
        self.flags[index] = BodyFlags::ALIVE;
        self.sleep_timers[index] = 0.0;
        self.island_tags[index] = NO_ISLAND;
        self.update_mass(index, hulls);
        self.refresh_aabb(index, hulls);
        self.live += 1;

        Ok(self.id_at(index))
    }

    fn push_slot(&mut self) {
        self.positions.push(Point3::origin());
        self.orientations.push(UnitQuaternion::identity());
        self.linear_velocities.push(Vector3::zeros());
        self.angular_velocities.push(Vector3::zeros());
        self.forces.push(Vector3::zeros());
        self.torques.push(Vector3::zeros());
        self.masses.push(0.0);
        self.inverse_masses.push(0.0);
        self.inverse_inertias.push(Vector3::zeros());
        self.shapes.push(CollisionShape::default());
        self.materials.push(Material::default());
        self.aabb_mins.push(Point3::origin());
        self.aabb_maxs.push(Point3::origin());
        self.flags.push(BodyFlags::empty());
        self.sleep_timers.push(0.0);
        self.island_tags.push(NO_ISLAND);
        self.generations.push(0);
    }

    /// Release a live slot; its handles go stale.
    pub(crate) fn free(&mut self, index: usize) {
        self.flags[index] = BodyFlags::empty();
        self.island_tags[index] = NO_ISLAND;
        self.generations[index] = self.generations[index].wrapping_add(1);
        self.linear_velocities[index] = Vector3::zeros();
        self.angular_velocities[index] = Vector3::zeros();
        self.free_list.push(index as u32);
        self.live -= 1;
    }

    /// Kill every body and invalidate every handle, keeping the columns.
    pub(crate) fn clear(&mut self) {
        for (flags, generation) in self.flags.iter_mut().zip(self.generations.iter_mut()) {
            *flags = BodyFlags::empty();
            *generation = generation.wrapping_add(1);
        }
        self.island_tags.fill(NO_ISLAND);
        self.free_list.clear();
        // Reversed so slot 0 is handed out first again.
        self.free_list.extend((0..self.len() as u32).rev());
        self.live = 0;
    }

    /// Slot index for a handle that still refers to a live body.
    pub(crate) fn resolve(&self, id: BodyId) -> Option<usize> {
        let index = id.index() as usize;
        (index < self.len()
            && self.generations[index] == id.generation()
            && self.flags[index].contains(BodyFlags::ALIVE))
        .then_some(index)
    }

    pub(crate) fn id_at(&self, index: usize) -> BodyId {
        BodyId::new(index as u32, self.generations[index])
    }

    pub(crate) fn is_alive(&self, index: usize) -> bool {
        self.flags[index].contains(BodyFlags::ALIVE)
    }

    pub(crate) fn is_static(&self, index: usize) -> bool {
        self.flags[index].contains(BodyFlags::STATIC)
    }

    pub(crate) fn is_sleeping(&self, index: usize) -> bool {
        self.flags[index].contains(BodyFlags::SLEEPING)
    }

    pub(crate) fn pose(&self, index: usize) -> Pose {
        Pose::from_position_rotation(self.positions[index], self.orientations[index])
    }

    pub(crate) fn refresh_aabb(&mut self, index: usize, hulls: &HullPool) {
        let aabb = self.shapes[index].world_aabb(&self.pose(index), hulls);
        self.aabb_mins[index] = aabb.min;
        self.aabb_maxs[index] = aabb.max;
    }

    pub(crate) fn aabb(&self, index: usize) -> Aabb {
        Aabb::new(self.aabb_mins[index], self.aabb_maxs[index])
    }

    /// Recompute mass and inverse inertia from shape, density and flags.
    pub(crate) fn update_mass(&mut self, index: usize, hulls: &HullPool) {
        let props = if self.is_static(index) || self.shapes[index].is_plane() {
            MassProperties::infinite()
        } else {
            self.shapes[index].mass_properties(self.materials[index].density, hulls)
        };
        self.masses[index] = props.mass;
        self.inverse_masses[index] = props.inverse_mass();
        self.inverse_inertias[index] = props.inverse_inertia();
    }

    /// Wake a body together with every body of its sleeping island.
    pub(crate) fn wake(&mut self, index: usize) {
        if !self.is_sleeping(index) {
            return;
        }
        let tag = self.island_tags[index];
        if tag == NO_ISLAND {
            self.wake_slot(index);
            return;
        }
        for i in 0..self.len() {
            if self.island_tags[i] == tag {
                self.wake_slot(i);
            }
        }
    }

    fn wake_slot(&mut self, index: usize) {
        self.flags[index].remove(BodyFlags::SLEEPING);
        self.sleep_timers[index] = 0.0;
        self.island_tags[index] = NO_ISLAND;
    }

    /// Put a body to sleep as a member of island `tag`.
    pub(crate) fn sleep(&mut self, index: usize, tag: u32) {
        self.flags[index].insert(BodyFlags::SLEEPING);
        self.island_tags[index] = tag;
        self.linear_velocities[index] = Vector3::zeros();
        self.angular_velocities[index] = Vector3::zeros();
    }

    /// Move every sleeper tagged `from` into island `to`.
    pub(crate) fn retag_island(&mut self, from: u32, to: u32) {
        for tag in &mut self.island_tags {
            if *tag == from {
                *tag = to;
            }
        }
    }

    /// Drop a body's sleep state without waking the rest of its island.
    pub(crate) fn clear_sleep(&mut self, index: usize) {
        self.flags[index].remove(BodyFlags::SLEEPING);
        self.sleep_timers[index] = 0.0;
        self.island_tags[index] = NO_ISLAND;
    }

    /// `I⁻¹ v` with the inverse inertia rotated into world frame.
    pub(crate) fn inv_inertia_world(&self, index: usize, v: &Vector3<f64>) -> Vector3<f64> {
        let q = &self.orientations[index];
        let local = q.inverse_transform_vector(v);
        q * self.inverse_inertias[index].component_mul(&local)
    }

    pub(crate) fn snapshot(&self, index: usize) -> RigidBody {
        RigidBody {
            id: self.id_at(index),
            position: self.positions[index],
            orientation: self.orientations[index],
            linear_velocity: self.linear_velocities[index],
            angular_velocity: self.angular_velocities[index],
            mass: self.masses[index],
            inverse_mass: self.inverse_masses[index],
            inverse_inertia: self.inverse_inertias[index],
            shape: self.shapes[index],
            material: self.materials[index],
            aabb: self.aabb(index),
            flags: self.flags[index],
            sleep_timer: self.sleep_timers[index],
            force: self.forces[index],
            torque: self.torques[index],
        }
    }
}
