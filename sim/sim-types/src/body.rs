//! Rigid body handle and state types.
//!
//! Bodies live in a fixed-capacity store owned by the world. Callers hold
//! [`BodyId`] handles made of a slot index and a generation counter; a
//! handle whose generation no longer matches its slot is stale and every
//! lookup through it fails.

use nalgebra::{Point3, UnitQuaternion, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Generation-tagged handle to a body slot.
///
/// # Example
///
/// ```
/// use sim_types::BodyId;
///
/// let id = BodyId::new(3, 1);
/// assert_eq!(id.index(), 3);
/// assert!(id.is_valid());
/// assert!(!BodyId::INVALID.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BodyId {
    index: u32,
    generation: u32,
}

impl BodyId {
    /// Sentinel returned when a body cannot be created.
    pub const INVALID: Self = Self {
        index: u32::MAX,
        generation: 0,
    };

    /// Create a handle from a slot index and generation.
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index in the body store.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Generation the slot had when this handle was issued.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// Whether this is anything other than [`BodyId::INVALID`].
    ///
    /// A valid-looking handle can still be stale; only the world can tell.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.index != u32::MAX
    }
}

impl Default for BodyId {
    fn default() -> Self {
        Self::INVALID
    }
}

impl std::fmt::Display for BodyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_valid() {
            write!(f, "Body({}v{})", self.index, self.generation)
        } else {
            write!(f, "Body(invalid)")
        }
    }
}

bitflags::bitflags! {
    /// Simulation state flags for a body slot.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    pub struct BodyFlags: u8 {
        /// Slot holds a live body.
        const ALIVE = 0b0000_0001;
        /// Infinite mass; never integrated.
        const STATIC = 0b0000_0010;
        /// At rest and excluded from the step until woken.
        const SLEEPING = 0b0000_0100;
    }
}

impl BodyFlags {
    /// Live, dynamic and not sleeping.
    #[must_use]
    pub fn is_awake_dynamic(self) -> bool {
        self.contains(Self::ALIVE) && !self.intersects(Self::STATIC | Self::SLEEPING)
    }
}

/// Position and orientation of a rigid body.
///
/// # Example
///
/// ```
/// use sim_types::Pose;
/// use nalgebra::Point3;
///
/// let pose = Pose::from_position(Point3::new(1.0, 2.0, 3.0));
/// let world = pose.transform_point(&Point3::new(1.0, 0.0, 0.0));
/// assert_eq!(world, Point3::new(2.0, 2.0, 3.0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Pose {
    /// Position of the body origin in world coordinates.
    pub position: Point3<f64>,
    /// Orientation as a unit quaternion.
    pub rotation: UnitQuaternion<f64>,
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose {
    /// Pose at the origin with no rotation.
    #[must_use]
    pub fn identity() -> Self {
        Self {
            position: Point3::origin(),
            rotation: UnitQuaternion::identity(),
        }
    }

    /// Pose at a position with no rotation.
    #[must_use]
    pub fn from_position(position: Point3<f64>) -> Self {
        Self {
            position,
            rotation: UnitQuaternion::identity(),
        }
    }

    /// Pose from position and rotation.
    #[must_use]
    pub fn from_position_rotation(position: Point3<f64>, rotation: UnitQuaternion<f64>) -> Self {
        Self { position, rotation }
    }

    /// Transform a point from body frame to world frame.
    #[must_use]
    pub fn transform_point(&self, local: &Point3<f64>) -> Point3<f64> {
        self.position + self.rotation * local.coords
    }

    /// Rotate a vector from body frame to world frame.
    #[must_use]
    pub fn transform_vector(&self, local: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * local
    }

    /// Transform a point from world frame to body frame.
    #[must_use]
    pub fn inverse_transform_point(&self, world: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation.inverse_transform_vector(&(world - self.position)))
    }

    /// Rotate a vector from world frame to body frame.
    #[must_use]
    pub fn inverse_transform_vector(&self, world: &Vector3<f64>) -> Vector3<f64> {
        self.rotation.inverse_transform_vector(world)
    }

    /// Check that no component is NaN or infinite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.position.coords.iter().all(|x| x.is_finite())
            && self.rotation.coords.iter().all(|x| x.is_finite())
    }
}

/// Linear and angular velocity of a rigid body, both in world frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Twist {
    /// Linear velocity of the body origin (m/s).
    pub linear: Vector3<f64>,
    /// Angular velocity (rad/s).
    pub angular: Vector3<f64>,
}

impl Twist {
    /// Create a twist.
    #[must_use]
    pub fn new(linear: Vector3<f64>, angular: Vector3<f64>) -> Self {
        Self { linear, angular }
    }

    /// Zero velocity.
    #[must_use]
    pub fn zero() -> Self {
        Self::default()
    }

    /// Velocity of a point at `offset` from the body origin.
    #[must_use]
    pub fn velocity_at_point(&self, offset: &Vector3<f64>) -> Vector3<f64> {
        self.linear + self.angular.cross(offset)
    }

    /// Linear speed.
    #[must_use]
    pub fn speed(&self) -> f64 {
        self.linear.norm()
    }

    /// Angular speed.
    #[must_use]
    pub fn angular_speed(&self) -> f64 {
        self.angular.norm()
    }

    /// Check that no component is NaN or infinite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.linear.iter().all(|x| x.is_finite()) && self.angular.iter().all(|x| x.is_finite())
    }
}

/// Mass and diagonal body-frame inertia of a rigid body.
///
/// Shapes are symmetric about their body axes, so the inertia tensor is
/// diagonal and stored as a vector of principal moments.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MassProperties {
    /// Mass in kg.
    pub mass: f64,
    /// Principal moments of inertia (kg·m²).
    pub inertia: Vector3<f64>,
}

impl MassProperties {
    /// Infinite mass: the static-body convention.
    #[must_use]
    pub fn infinite() -> Self {
        Self {
            mass: 0.0,
            inertia: Vector3::zeros(),
        }
    }

    /// Solid sphere: I = (2/5) m r².
    #[must_use]
    pub fn sphere(mass: f64, radius: f64) -> Self {
        let i = 0.4 * mass * radius * radius;
        Self {
            mass,
            inertia: Vector3::new(i, i, i),
        }
    }

    /// Solid box from half-extents.
    #[must_use]
    pub fn cuboid(mass: f64, half_extents: Vector3<f64>) -> Self {
        let full = half_extents * 2.0;
        let (x2, y2, z2) = (full.x * full.x, full.y * full.y, full.z * full.z);
        Self {
            mass,
            inertia: Vector3::new(y2 + z2, x2 + z2, x2 + y2) * (mass / 12.0),
        }
    }

    /// Capsule along the local Y axis: cylinder of length `height` plus two
    /// hemispherical caps.
    #[must_use]
    pub fn capsule(mass: f64, radius: f64, height: f64) -> Self {
        let r2 = radius * radius;
        let cylinder_volume = std::f64::consts::PI * r2 * height;
        let sphere_volume = 4.0 / 3.0 * std::f64::consts::PI * r2 * radius;
        let total = cylinder_volume + sphere_volume;
        if total <= 0.0 {
            return Self::sphere(mass, radius);
        }
        let m_cyl = mass * cylinder_volume / total;
        let m_caps = mass * sphere_volume / total;

        let axial = 0.5 * m_cyl * r2 + 0.4 * m_caps * r2;
        let half = 0.5 * height;
        let transverse = m_cyl * (3.0 * r2 + height * height) / 12.0
            + m_caps * (0.4 * r2 + half * half + 0.375 * radius * height);
        Self {
            mass,
            inertia: Vector3::new(transverse, axial, transverse),
        }
    }

    /// Inverse mass, zero for infinite mass.
    #[must_use]
    pub fn inverse_mass(&self) -> f64 {
        if self.mass > 0.0 { 1.0 / self.mass } else { 0.0 }
    }

    /// Inverse principal moments, zero where a moment is not positive.
    #[must_use]
    pub fn inverse_inertia(&self) -> Vector3<f64> {
        self.inertia.map(|i| if i > 0.0 { 1.0 / i } else { 0.0 })
    }

    /// Validate that mass and inertia are finite and non-negative.
    pub fn validate(&self) -> crate::Result<()> {
        if !self.mass.is_finite() || self.mass < 0.0 {
            return Err(crate::SimError::invalid_mass(format!(
                "mass must be finite and non-negative, got {}",
                self.mass
            )));
        }
        if self.inertia.iter().any(|i| !i.is_finite() || *i < 0.0) {
            return Err(crate::SimError::invalid_mass(
                "principal moments must be finite and non-negative",
            ));
        }
        Ok(())
    }
}
