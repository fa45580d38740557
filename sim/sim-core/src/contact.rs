//! Contact points and manifolds.
//!
//! A [`ContactManifold`] holds up to [`MAX_CONTACT_POINTS`] points for one
//! body pair in a fixed array, so the manifold buffers in the world never
//! grow during a step.

use nalgebra::{Point3, Vector3};
use sim_types::BodyId;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Maximum points per manifold.
pub const MAX_CONTACT_POINTS: usize = 4;

/// Points closer than this are merged, keeping the deeper one.
pub const CONTACT_MERGE_DISTANCE: f64 = 1e-3;

/// A single contact point between two bodies.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContactPoint {
    /// Contact position in world space.
    pub position: Point3<f64>,
    /// Contact normal (unit vector from A toward B).
    pub normal: Vector3<f64>,
    /// Penetration depth (positive when overlapping).
    pub depth: f64,
    /// Stable id of the touching feature pair, used for warm starting.
    pub feature: u32,
    /// Accumulated normal impulse.
    pub normal_impulse: f64,
    /// Accumulated friction impulses along the two tangents.
    pub tangent_impulse: [f64; 2],

    // Solver scratch, recomputed every step.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub(crate) r_a: Vector3<f64>,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub(crate) r_b: Vector3<f64>,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub(crate) tangents: [Vector3<f64>; 2],
    #[cfg_attr(feature = "serde", serde(skip))]
    pub(crate) normal_mass: f64,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub(crate) tangent_mass: [f64; 2],
    #[cfg_attr(feature = "serde", serde(skip))]
    pub(crate) velocity_bias: f64,
}

impl ContactPoint {
    /// Create a contact with no accumulated impulse.
    #[must_use]
    pub fn new(position: Point3<f64>, normal: Vector3<f64>, depth: f64, feature: u32) -> Self {
        Self {
            position,
            normal,
            depth,
            feature,
            ..Self::default()
        }
    }
}

/// Contacts between one pair of bodies.
///
/// `body_a` always has the lower slot index.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContactManifold {
    /// First body (lower slot index).
    pub body_a: BodyId,
    /// Second body.
    pub body_b: BodyId,
    /// Normal of the deepest point (from A toward B).
    pub normal: Vector3<f64>,
    /// Friction directions orthogonal to `normal`.
    pub tangents: [Vector3<f64>; 2],
    /// Combined restitution (minimum of the two materials).
    pub restitution: f64,
    /// Combined friction (geometric mean of the two materials).
    pub friction: f64,
    points: [ContactPoint; MAX_CONTACT_POINTS],
    point_count: usize,
    /// Skipped by the solver this step.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub(crate) degenerate: bool,
}

impl ContactManifold {
    /// Empty manifold for a pair.
    #[must_use]
    pub fn new(body_a: BodyId, body_b: BodyId) -> Self {
        Self {
            body_a,
            body_b,
            ..Self::default()
        }
    }

    /// Slot indices of the two bodies.
    #[must_use]
    pub fn key(&self) -> (u32, u32) {
        (self.body_a.index(), self.body_b.index())
    }

    /// Number of contact points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.point_count
    }

    /// Whether the manifold has no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.point_count == 0
    }

    /// The active contact points.
    #[must_use]
    pub fn points(&self) -> &[ContactPoint] {
        &self.points[..self.point_count]
    }

    /// The active contact points, mutably.
    pub fn points_mut(&mut self) -> &mut [ContactPoint] {
        &mut self.points[..self.point_count]
    }

    /// Deepest penetration among the points, or zero when empty.
    #[must_use]
    pub fn max_depth(&self) -> f64 {
        self.points().iter().map(|p| p.depth).fold(0.0, f64::max)
    }

    /// Remove every point.
    pub fn clear_points(&mut self) {
        self.point_count = 0;
    }

    /// Add a point, keeping the deepest [`MAX_CONTACT_POINTS`].
    ///
    /// A point within [`CONTACT_MERGE_DISTANCE`] of an existing one merges
    /// with it. When full, the new point replaces the shallowest one if it
    /// is deeper. Returns whether the point was kept.
    pub fn add_point(&mut self, point: ContactPoint) -> bool {
        let merge_sq = CONTACT_MERGE_DISTANCE * CONTACT_MERGE_DISTANCE;
        let duplicate = self
            .points()
            .iter()
            .position(|p| (p.position - point.position).norm_squared() < merge_sq);

        let kept = if let Some(i) = duplicate {
            if point.depth > self.points[i].depth {
                self.points[i] = point;
                true
            } else {
                false
            }
        } else if self.point_count < MAX_CONTACT_POINTS {
            self.points[self.point_count] = point;
            self.point_count += 1;
            true
        } else {
            let mut shallowest = 0;
            for i in 1..MAX_CONTACT_POINTS {
                if self.points[i].depth < self.points[shallowest].depth {
                    shallowest = i;
                }
            }
            if point.depth > self.points[shallowest].depth {
                self.points[shallowest] = point;
                true
            } else {
                false
            }
        };
        if kept {
            self.refresh_normal();
        }
        kept
    }

    /// Reverse the normal direction of every point (A and B swapped roles).
    pub fn flip_normals(&mut self) {
        for p in self.points_mut() {
            p.normal = -p.normal;
        }
        self.refresh_normal();
    }

    fn refresh_normal(&mut self) {
        if self.point_count == 0 {
            return;
        }
        let mut deepest = 0;
        for i in 1..self.point_count {
            if self.points[i].depth > self.points[deepest].depth {
                deepest = i;
            }
        }
        self.normal = self.points[deepest].normal;
        self.tangents = tangent_basis(&self.normal);
    }
}

/// Two unit tangents completing `normal` to a right-handed basis.
#[must_use]
pub fn tangent_basis(normal: &Vector3<f64>) -> [Vector3<f64>; 2] {
    let t1 = if normal.x.abs() >= 0.577_35 {
        Vector3::new(normal.y, -normal.x, 0.0)
    } else {
        Vector3::new(0.0, normal.z, -normal.y)
    };
    let t1 = t1.try_normalize(1e-12).unwrap_or_else(Vector3::x);
    let t2 = normal.cross(&t1);
    [t1, t2]
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn point(depth: f64, feature: u32) -> ContactPoint {
        let x = f64::from(feature);
        ContactPoint::new(Point3::new(x, 0.0, 0.0), Vector3::y(), depth, feature)
    }

    #[test]
    fn test_keeps_four_deepest() {
        let mut m = ContactManifold::new(BodyId::new(0, 0), BodyId::new(1, 0));
        for (i, depth) in [0.1, 0.5, 0.2, 0.3, 0.05, 0.4].iter().enumerate() {
            m.add_point(point(*depth, i as u32));
        }
        assert_eq!(m.len(), 4);
        let mut features: Vec<u32> = m.points().iter().map(|p| p.feature).collect();
        features.sort_unstable();
        assert_eq!(features, vec![1, 2, 3, 5]);
        assert_relative_eq!(m.max_depth(), 0.5);
    }

    #[test]
    fn test_nearby_points_merge() {
        let mut m = ContactManifold::default();
        assert!(m.add_point(ContactPoint::new(Point3::origin(), Vector3::y(), 0.1, 0)));
        assert!(m.add_point(ContactPoint::new(Point3::new(1e-4, 0.0, 0.0), Vector3::y(), 0.2, 1)));
        assert!(!m.add_point(ContactPoint::new(Point3::new(0.0, 1e-4, 0.0), Vector3::y(), 0.05, 2)));
        assert_eq!(m.len(), 1);
        assert_eq!(m.points()[0].feature, 1);
    }

    #[test]
    fn test_normal_follows_deepest_point() {
        let mut m = ContactManifold::default();
        m.add_point(ContactPoint::new(Point3::origin(), Vector3::x(), 0.1, 0));
        m.add_point(ContactPoint::new(Point3::new(1.0, 0.0, 0.0), Vector3::y(), 0.3, 1));
        assert_eq!(m.normal, Vector3::y());

        m.flip_normals();
        assert_eq!(m.normal, -Vector3::y());
        assert_eq!(m.points()[0].normal, -Vector3::x());
    }

    #[test]
    fn test_tangent_basis_is_orthonormal() {
        for n in [
            Vector3::x(),
            Vector3::y(),
            -Vector3::z(),
            Vector3::new(1.0, 2.0, -3.0).normalize(),
        ] {
            let [t1, t2] = tangent_basis(&n);
            assert_relative_eq!(t1.norm(), 1.0, epsilon = 1e-12);
            assert_relative_eq!(t2.norm(), 1.0, epsilon = 1e-12);
            assert_relative_eq!(t1.dot(&n), 0.0, epsilon = 1e-12);
            assert_relative_eq!(t2.dot(&n), 0.0, epsilon = 1e-12);
            assert_relative_eq!(t1.dot(&t2), 0.0, epsilon = 1e-12);
        }
    }
}
