//! Collision shapes and the convex hull pool.
//!
//! [`CollisionShape`] is a small `Copy` enum stored in a column of the body
//! store. Shapes that need variable-size data (convex hulls) hold a
//! [`HullId`] into the world's [`HullPool`] instead of owning their points,
//! which keeps the body table fixed-size.
//!
//! # Local frames
//!
//! | Shape | Local geometry |
//! |-------|----------------|
//! | Sphere | Centred on the origin |
//! | Box | Centred, half-extents along X/Y/Z |
//! | Capsule | Segment of length `height` along Y, swept by `radius` |
//! | Plane | Half-space `normal · x <= distance` (solid side below) |
//! | Convex hull | Points relative to the body origin |

use nalgebra::{Point3, Vector3};
use sim_types::{MassProperties, Pose, Result, SimError};

use crate::broad_phase::Aabb;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Smallest dimension a shape constructor will produce.
pub const MIN_DIMENSION: f64 = 0.001;

/// Half-size of the bounding box used for planes.
pub const PLANE_EXTENT: f64 = 1e6;

/// Thickness added above a plane's surface in its bounding box.
const PLANE_AABB_MARGIN: f64 = 0.01;

/// Collision shape for contact detection.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CollisionShape {
    /// Sphere with given radius.
    Sphere {
        /// Sphere radius in meters.
        radius: f64,
    },
    /// Box with half-extents.
    Box {
        /// Half-extents of the box in each axis.
        half_extents: Vector3<f64>,
    },
    /// Capsule (cylinder with hemispherical caps).
    ///
    /// The core segment runs from `-height / 2` to `+height / 2` on the
    /// local Y axis.
    Capsule {
        /// Radius of the capsule.
        radius: f64,
        /// Length of the core segment.
        height: f64,
    },
    /// Static half-space.
    /// The plane equation is: normal · x = distance
    Plane {
        /// Unit normal vector, pointing out of the solid side.
        normal: Vector3<f64>,
        /// Distance from origin along the normal.
        distance: f64,
    },
    /// Convex hull stored in the world's hull pool.
    ConvexHull {
        /// Handle returned by `World::add_convex_hull`.
        hull: HullId,
    },
}

impl Default for CollisionShape {
    fn default() -> Self {
        Self::Sphere { radius: 0.5 }
    }
}

impl CollisionShape {
    /// Create a sphere collision shape.
    #[must_use]
    pub fn sphere(radius: f64) -> Self {
        Self::Sphere {
            radius: radius.max(MIN_DIMENSION),
        }
    }

    /// Create a box collision shape.
    #[must_use]
    pub fn cuboid(half_extents: Vector3<f64>) -> Self {
        Self::Box {
            half_extents: half_extents.map(|h| h.max(MIN_DIMENSION)),
        }
    }

    /// Create a capsule collision shape.
    ///
    /// `height` is the length of the core segment, not counting the caps.
    #[must_use]
    pub fn capsule(radius: f64, height: f64) -> Self {
        Self::Capsule {
            radius: radius.max(MIN_DIMENSION),
            height: height.max(MIN_DIMENSION),
        }
    }

    /// Create a plane with custom normal and distance.
    ///
    /// A zero or non-finite normal falls back to +Y.
    #[must_use]
    pub fn plane(normal: Vector3<f64>, distance: f64) -> Self {
        let normal = normal
            .try_normalize(1e-12)
            .filter(|n| n.iter().all(|c| c.is_finite()))
            .unwrap_or_else(Vector3::y);
        Self::Plane {
            normal,
            distance: if distance.is_finite() { distance } else { 0.0 },
        }
    }

    /// Create a ground plane (Y-up at given height).
    #[must_use]
    pub fn ground_plane(height: f64) -> Self {
        Self::plane(Vector3::y(), height)
    }

    /// Create a convex hull shape from a pooled hull.
    #[must_use]
    pub fn convex_hull(hull: HullId) -> Self {
        Self::ConvexHull { hull }
    }

    /// Whether this shape is a plane (and therefore always static).
    #[must_use]
    pub fn is_plane(&self) -> bool {
        matches!(self, Self::Plane { .. })
    }

    /// Check that the shape's parameters can be simulated.
    pub fn validate(&self, hulls: &HullPool) -> Result<()> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        match self {
            Self::Sphere { radius } if !positive(*radius) => Err(SimError::invalid_shape(
                format!("sphere radius must be positive, got {radius}"),
            )),
            Self::Box { half_extents } if !half_extents.iter().all(|h| positive(*h)) => Err(
                SimError::invalid_shape("box half-extents must be positive"),
            ),
            Self::Capsule { radius, height } if !positive(*radius) || !positive(*height) => Err(
                SimError::invalid_shape("capsule radius and height must be positive"),
            ),
            Self::Plane { normal, distance } => {
                let len = normal.norm();
                if !distance.is_finite() || !len.is_finite() || (len - 1.0).abs() > 1e-6 {
                    Err(SimError::invalid_shape(
                        "plane needs a unit normal and finite distance",
                    ))
                } else {
                    Ok(())
                }
            }
            Self::ConvexHull { hull } => hulls.get(*hull).map(|_| ()).ok_or_else(|| {
                SimError::invalid_shape(format!("unknown convex hull {}", hull.index()))
            }),
            _ => Ok(()),
        }
    }

    /// Solid volume, or infinity for planes.
    ///
    /// Convex hulls use the volume of their local bounding box.
    #[must_use]
    pub fn volume(&self, hulls: &HullPool) -> f64 {
        use std::f64::consts::PI;
        match self {
            Self::Sphere { radius } => 4.0 / 3.0 * PI * radius.powi(3),
            Self::Box { half_extents } => 8.0 * half_extents.x * half_extents.y * half_extents.z,
            Self::Capsule { radius, height } => {
                PI * radius * radius * height + 4.0 / 3.0 * PI * radius.powi(3)
            }
            Self::Plane { .. } => f64::INFINITY,
            Self::ConvexHull { hull } => hulls.get(*hull).map_or(0.0, |h| {
                let e = h.half_extents();
                8.0 * e.x * e.y * e.z
            }),
        }
    }

    /// Mass and inertia for a solid of the given density.
    ///
    /// Planes have infinite mass. Convex hulls are treated as their
    /// bounding box for inertia.
    #[must_use]
    pub fn mass_properties(&self, density: f64, hulls: &HullPool) -> MassProperties {
        let mass = density * self.volume(hulls);
        match self {
            Self::Sphere { radius } => MassProperties::sphere(mass, *radius),
            Self::Box { half_extents } => MassProperties::cuboid(mass, *half_extents),
            Self::Capsule { radius, height } => MassProperties::capsule(mass, *radius, *height),
            Self::Plane { .. } => MassProperties::infinite(),
            Self::ConvexHull { hull } => hulls.get(*hull).map_or_else(
                MassProperties::infinite,
                |h| MassProperties::cuboid(mass, h.half_extents()),
            ),
        }
    }

    /// World-space bounding box of the shape at `pose`.
    #[must_use]
    pub fn world_aabb(&self, pose: &Pose, hulls: &HullPool) -> Aabb {
        let center = pose.position;
        match self {
            Self::Sphere { radius } => Aabb::from_center(center, Vector3::repeat(*radius)),
            Self::Box { half_extents } => {
                // |R| * h bounds every rotated corner.
                let abs_rot = pose.rotation.to_rotation_matrix().into_inner().abs();
                Aabb::from_center(center, abs_rot * half_extents)
            }
            Self::Capsule { radius, height } => {
                let (p, q) = capsule_segment(pose, *height);
                Aabb::new(
                    Point3::from(p.coords.inf(&q.coords)),
                    Point3::from(p.coords.sup(&q.coords)),
                )
                .expanded(*radius)
            }
            Self::Plane { normal, distance } => {
                let (n, d) = world_plane(pose, normal, *distance);
                let mut min = Point3::from(Vector3::repeat(-PLANE_EXTENT));
                let mut max = Point3::from(Vector3::repeat(PLANE_EXTENT));
                // Axis-aligned planes only need to reach their surface.
                for k in 0..3 {
                    if n[k] > 0.999 {
                        max[k] = d * n[k] + PLANE_AABB_MARGIN;
                    } else if n[k] < -0.999 {
                        min[k] = d * n[k] - PLANE_AABB_MARGIN;
                    }
                }
                Aabb::new(min, max)
            }
            Self::ConvexHull { hull } => match hulls.get(*hull) {
                Some(h) => {
                    let mut aabb = Aabb::empty();
                    for p in h.points() {
                        aabb.grow(&(center + pose.rotation * p));
                    }
                    aabb
                }
                None => Aabb::from_center(center, Vector3::zeros()),
            },
        }
    }
}

/// World-space endpoints of a capsule's core segment.
#[must_use]
pub fn capsule_segment(pose: &Pose, height: f64) -> (Point3<f64>, Point3<f64>) {
    let half = pose.rotation * Vector3::new(0.0, 0.5 * height, 0.0);
    (pose.position - half, pose.position + half)
}

/// World-space normal and offset of a plane attached to a body.
#[must_use]
pub fn world_plane(pose: &Pose, normal: &Vector3<f64>, distance: f64) -> (Vector3<f64>, f64) {
    let n = pose.rotation * normal;
    let on_plane = pose.transform_point(&Point3::from(normal * distance));
    (n, n.dot(&on_plane.coords))
}

/// Create a sphere shape.
#[must_use]
pub fn create_sphere(radius: f64) -> CollisionShape {
    CollisionShape::sphere(radius)
}

/// Create a box shape from half-extents.
#[must_use]
pub fn create_box(half_extents: Vector3<f64>) -> CollisionShape {
    CollisionShape::cuboid(half_extents)
}

/// Create a capsule shape along local Y.
#[must_use]
pub fn create_capsule(radius: f64, height: f64) -> CollisionShape {
    CollisionShape::capsule(radius, height)
}

/// Create a static half-space.
#[must_use]
pub fn create_plane(normal: Vector3<f64>, distance: f64) -> CollisionShape {
    CollisionShape::plane(normal, distance)
}

// =============================================================================
// Convex Hulls
// =============================================================================

/// Handle to a convex hull in a world's [`HullPool`].
///
/// Handles carry the pool epoch, so a handle from before
/// [`World::reset`](crate::World::reset) no longer resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HullId {
    index: u32,
    epoch: u32,
}

impl HullId {
    /// Slot in the pool.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }
}

/// Point cloud treated as its convex hull.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvexHull {
    points: Vec<Vector3<f64>>,
    half_extents: Vector3<f64>,
}

impl ConvexHull {
    /// Minimum number of points for a solid hull.
    pub const MIN_POINTS: usize = 4;

    /// Build a hull from points in the body frame.
    ///
    /// Points need not be on the hull; interior points never win a
    /// support query.
    pub fn new(points: &[Point3<f64>]) -> Result<Self> {
        if points.len() < Self::MIN_POINTS {
            return Err(SimError::invalid_shape(format!(
                "hull needs at least {} points, got {}",
                Self::MIN_POINTS,
                points.len()
            )));
        }
        if points.iter().any(|p| !p.coords.iter().all(|c| c.is_finite())) {
            return Err(SimError::invalid_shape("hull points must be finite"));
        }

        let points: Vec<Vector3<f64>> = points.iter().map(|p| p.coords).collect();
        let mut half_extents = Vector3::zeros();
        for p in &points {
            half_extents = half_extents.sup(&p.abs());
        }
        Ok(Self {
            points,
            half_extents: half_extents.map(|h| h.max(MIN_DIMENSION)),
        })
    }

    /// Points in the body frame.
    #[must_use]
    pub fn points(&self) -> &[Vector3<f64>] {
        &self.points
    }

    /// Half-extents of the origin-centred box that holds every point.
    #[must_use]
    pub fn half_extents(&self) -> Vector3<f64> {
        self.half_extents
    }

    /// Index and position of the point furthest along a body-frame direction.
    #[must_use]
    pub fn support_local(&self, direction: &Vector3<f64>) -> (usize, Vector3<f64>) {
        let (index, _) = sim_simd::find_max_dot(&self.points, direction);
        (index, self.points[index])
    }
}

/// Fixed-capacity storage for convex hulls.
#[derive(Debug, Clone)]
pub struct HullPool {
    hulls: Vec<ConvexHull>,
    capacity: usize,
    epoch: u32,
}

impl HullPool {
    /// Create an empty pool.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            hulls: Vec::with_capacity(capacity),
            capacity,
            epoch: 0,
        }
    }

    /// Add a hull.
    pub fn insert(&mut self, hull: ConvexHull) -> Result<HullId> {
        if self.hulls.len() >= self.capacity {
            return Err(SimError::capacity("convex hull", self.capacity));
        }
        let index = u32::try_from(self.hulls.len())
            .map_err(|_| SimError::capacity("convex hull", self.capacity))?;
        self.hulls.push(hull);
        Ok(HullId {
            index,
            epoch: self.epoch,
        })
    }

    /// Look up a hull, rejecting handles from an earlier epoch.
    #[must_use]
    pub fn get(&self, id: HullId) -> Option<&ConvexHull> {
        if id.epoch != self.epoch {
            return None;
        }
        self.hulls.get(id.index as usize)
    }

    /// Number of stored hulls.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hulls.len()
    }

    /// Whether the pool is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hulls.is_empty()
    }

    /// Drop every hull and invalidate outstanding handles.
    pub fn clear(&mut self) {
        self.hulls.clear();
        self.epoch = self.epoch.wrapping_add(1);
    }
}
