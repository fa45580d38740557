//! Scene queries: ray casts and overlap tests.
//!
//! # Supported Shapes
//!
//! - Sphere: analytic ray-sphere intersection
//! - Plane: analytic ray-plane intersection
//! - Box: slab test in the box frame
//! - Capsule: infinite cylinder about local Y plus the two cap spheres
//! - `ConvexHull`: slab test against the cached world AABB
//!
//! Queries read the cached AABB columns first and only run exact tests on
//! bodies whose box is touched. They include static and sleeping bodies.

#![allow(clippy::suspicious_operation_groupings, clippy::many_single_char_names)]

use nalgebra::{Point3, Vector3};
use sim_types::{BodyId, Pose};

use crate::broad_phase::Aabb;
use crate::contact::ContactManifold;
use crate::narrow_phase::collide;
use crate::shape::{world_plane, CollisionShape};
use crate::world::World;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Result of a ray cast against a shape.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RaycastHit {
    /// Distance from ray origin to hit point.
    pub distance: f64,
    /// Hit point in world coordinates.
    pub point: Point3<f64>,
    /// Surface normal at hit point (pointing away from surface).
    pub normal: Vector3<f64>,
}

impl RaycastHit {
    /// Create a new ray hit.
    #[must_use]
    pub fn new(distance: f64, point: Point3<f64>, normal: Vector3<f64>) -> Self {
        Self {
            distance,
            point,
            normal,
        }
    }
}

/// Nearest body hit by [`World::ray_cast`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RayHit {
    /// Body that was hit.
    pub body: BodyId,
    /// Hit point in world coordinates.
    pub point: Point3<f64>,
    /// Outward surface normal at the hit point.
    pub normal: Vector3<f64>,
    /// Distance along the (normalized) ray.
    pub distance: f64,
}

#[inline]
fn safe_normalize(v: &Vector3<f64>, fallback: Vector3<f64>) -> Vector3<f64> {
    let n = v.norm();
    if n > 1e-10 { v / n } else { fallback }
}

/// Cast a ray against one posed shape.
///
/// `direction` must be unit length. Convex hulls are hit at their world
/// bounding box, which the caller passes as `aabb`.
#[must_use]
pub fn raycast_shape(
    shape: &CollisionShape,
    pose: &Pose,
    aabb: &Aabb,
    origin: &Point3<f64>,
    direction: &Vector3<f64>,
    max_distance: f64,
) -> Option<RaycastHit> {
    match shape {
        CollisionShape::Sphere { radius } => {
            raycast_sphere(&pose.position, *radius, origin, direction, max_distance)
        }
        CollisionShape::Box { half_extents } => {
            raycast_box(pose, half_extents, origin, direction, max_distance)
        }
        CollisionShape::Capsule { radius, height } => {
            raycast_capsule(pose, 0.5 * height, *radius, origin, direction, max_distance)
        }
        CollisionShape::Plane { normal, distance } => {
            let (n, d) = world_plane(pose, normal, *distance);
            raycast_plane(&n, d, origin, direction, max_distance)
        }
        CollisionShape::ConvexHull { .. } => {
            raycast_aabb(aabb, origin, direction, max_distance)
        }
    }
}

/// Ray-sphere intersection by the quadratic formula.
///
/// A ray starting inside the sphere hits the far side.
#[must_use]
pub fn raycast_sphere(
    center: &Point3<f64>,
    radius: f64,
    origin: &Point3<f64>,
    direction: &Vector3<f64>,
    max_distance: f64,
) -> Option<RaycastHit> {
    let oc = origin - center;
    let b = oc.dot(direction);
    let c = oc.norm_squared() - radius * radius;
    let discriminant = b * b - c;
    // NaN fails this too.
    if !(discriminant >= 0.0) {
        return None;
    }

    let sqrt_d = discriminant.sqrt();
    let mut t = -b - sqrt_d;
    if t < 0.0 {
        t = -b + sqrt_d;
    }
    if t < 0.0 || t > max_distance {
        return None;
    }

    let point = origin + direction * t;
    let normal = safe_normalize(&(point - center), -direction);
    Some(RaycastHit::new(t, point, normal))
}

/// Ray-plane intersection for the plane `n·x = d`.
///
/// The returned normal faces the ray.
#[must_use]
pub fn raycast_plane(
    normal: &Vector3<f64>,
    offset: f64,
    origin: &Point3<f64>,
    direction: &Vector3<f64>,
    max_distance: f64,
) -> Option<RaycastHit> {
    let denom = normal.dot(direction);
    if !(denom.abs() >= 1e-10) {
        return None;
    }

    let t = (offset - normal.dot(&origin.coords)) / denom;
    if t < 0.0 || t > max_distance {
        return None;
    }

    let facing = if denom > 0.0 { -normal } else { *normal };
    Some(RaycastHit::new(t, origin + direction * t, facing))
}

/// Slab test against a box given in its own frame.
///
/// Returns the entry distance and the local normal of the entry face;
/// the normal is zero when the ray starts inside.
fn slab_test(
    min: &Vector3<f64>,
    max: &Vector3<f64>,
    origin: &Vector3<f64>,
    direction: &Vector3<f64>,
    max_distance: f64,
) -> Option<(f64, Vector3<f64>)> {
    let mut t_min = 0.0_f64;
    let mut t_max = max_distance;
    let mut hit_normal = Vector3::zeros();

    for i in 0..3 {
        if direction[i].abs() < 1e-10 {
            if origin[i] < min[i] || origin[i] > max[i] {
                return None;
            }
            continue;
        }
        let inv = 1.0 / direction[i];
        let t1 = (min[i] - origin[i]) * inv;
        let t2 = (max[i] - origin[i]) * inv;
        let (t_near, t_far, sign) = if t1 < t2 { (t1, t2, -1.0) } else { (t2, t1, 1.0) };

        if t_near > t_min {
            t_min = t_near;
            hit_normal = Vector3::zeros();
            hit_normal[i] = sign;
        }
        t_max = t_max.min(t_far);
        if t_min > t_max {
            return None;
        }
    }
    Some((t_min, hit_normal))
}

/// Ray-box intersection, slab test in the box frame.
#[must_use]
pub fn raycast_box(
    pose: &Pose,
    half_extents: &Vector3<f64>,
    origin: &Point3<f64>,
    direction: &Vector3<f64>,
    max_distance: f64,
) -> Option<RaycastHit> {
    let local_origin = pose.inverse_transform_point(origin);
    let local_dir = pose.inverse_transform_vector(direction);

    let (t, local_normal) = slab_test(
        &(-half_extents),
        half_extents,
        &local_origin.coords,
        &local_dir,
        max_distance,
    )?;
    let normal = safe_normalize(&pose.transform_vector(&local_normal), -direction);
    Some(RaycastHit::new(t, origin + direction * t, normal))
}

/// Ray-AABB intersection.
#[must_use]
pub fn raycast_aabb(
    aabb: &Aabb,
    origin: &Point3<f64>,
    direction: &Vector3<f64>,
    max_distance: f64,
) -> Option<RaycastHit> {
    let (t, normal) = slab_test(
        &aabb.min.coords,
        &aabb.max.coords,
        &origin.coords,
        direction,
        max_distance,
    )?;
    let normal = safe_normalize(&normal, -direction);
    Some(RaycastHit::new(t, origin + direction * t, normal))
}

/// Ray-capsule intersection for a capsule along local Y.
///
/// Tests the infinite cylinder, keeping hits between the caps, and the two
/// cap spheres; the nearest wins.
#[must_use]
pub fn raycast_capsule(
    pose: &Pose,
    half_height: f64,
    radius: f64,
    origin: &Point3<f64>,
    direction: &Vector3<f64>,
    max_distance: f64,
) -> Option<RaycastHit> {
    let local_origin = pose.inverse_transform_point(origin);
    let local_dir = pose.inverse_transform_vector(direction);

    let mut closest: Option<(f64, Point3<f64>, Vector3<f64>)> = None;
    let mut check_hit = |t: f64, pt: Point3<f64>, normal: Vector3<f64>| {
        if t >= 0.0 && t <= max_distance && closest.map_or(true, |(best, _, _)| t < best) {
            closest = Some((t, pt, normal));
        }
    };

    // Cylinder body: XZ components only.
    let oc = Vector3::new(local_origin.x, 0.0, local_origin.z);
    let dir_xz = Vector3::new(local_dir.x, 0.0, local_dir.z);
    let a = dir_xz.norm_squared();
    let b = oc.dot(&dir_xz);
    let c = oc.norm_squared() - radius * radius;
    if a > 1e-10 {
        let discriminant = b * b - a * c;
        if discriminant >= 0.0 && discriminant.is_finite() {
            let sqrt_d = discriminant.sqrt();
            for t in [(-b - sqrt_d) / a, (-b + sqrt_d) / a] {
                let pt = local_origin + local_dir * t;
                if t >= 0.0 && pt.y.abs() <= half_height {
                    let radial = Vector3::new(pt.x, 0.0, pt.z);
                    check_hit(t, pt, safe_normalize(&radial, Vector3::x()));
                }
            }
        }
    }

    for cap in [
        Point3::new(0.0, -half_height, 0.0),
        Point3::new(0.0, half_height, 0.0),
    ] {
        let oc = local_origin - cap;
        let b = oc.dot(&local_dir);
        let c = oc.norm_squared() - radius * radius;
        let discriminant = b * b - c;
        if discriminant >= 0.0 && discriminant.is_finite() {
            let sqrt_d = discriminant.sqrt();
            let mut t = -b - sqrt_d;
            if t < 0.0 {
                t = -b + sqrt_d;
            }
            let pt = local_origin + local_dir * t;
            check_hit(t, pt, safe_normalize(&(pt - cap), -local_dir));
        }
    }

    closest.map(|(t, local_pt, local_normal)| {
        let normal = safe_normalize(&pose.transform_vector(&local_normal), local_normal);
        RaycastHit::new(t, pose.transform_point(&local_pt), normal)
    })
}

impl World {
    /// Nearest body hit by a ray.
    ///
    /// `direction` need not be normalized; a zero or non-finite direction
    /// hits nothing. Ties go to the lower slot index.
    #[must_use]
    pub fn ray_cast(
        &self,
        origin: Point3<f64>,
        direction: Vector3<f64>,
        max_distance: f64,
    ) -> Option<RayHit> {
        let len = direction.norm();
        if !(len > 1e-12) || !len.is_finite() || !(max_distance >= 0.0) {
            return None;
        }
        let dir = direction / len;

        let mut best: Option<RayHit> = None;
        for i in 0..self.bodies.len() {
            if !self.bodies.is_alive(i) {
                continue;
            }
            let limit = best.map_or(max_distance, |hit| hit.distance);
            let aabb = self.bodies.aabb(i);
            if raycast_aabb(&aabb, &origin, &dir, limit).is_none() {
                continue;
            }
            let hit = raycast_shape(
                &self.bodies.shapes[i],
                &self.bodies.pose(i),
                &aabb,
                &origin,
                &dir,
                limit,
            );
            if let Some(hit) = hit {
                if best.map_or(true, |b| hit.distance < b.distance) {
                    best = Some(RayHit {
                        body: self.bodies.id_at(i),
                        point: hit.point,
                        normal: hit.normal,
                        distance: hit.distance,
                    });
                }
            }
        }
        best
    }

    /// Bodies whose shape touches a sphere.
    ///
    /// Clears `out`, fills it in slot order and returns the count.
    pub fn overlap_sphere(
        &self,
        center: Point3<f64>,
        radius: f64,
        out: &mut Vec<BodyId>,
    ) -> usize {
        out.clear();
        if !(radius > 0.0) || !radius.is_finite() {
            return 0;
        }
        let probe = CollisionShape::Sphere { radius };
        let probe_pose = Pose::from_position(center);
        let half = Vector3::repeat(radius);
        let (qmin, qmax) = (center - half, center + half);

        let mut scratch = ContactManifold::default();
        sim_simd::for_each_aabb_overlap(
            &self.bodies.aabb_mins,
            &self.bodies.aabb_maxs,
            &qmin,
            &qmax,
            |i| {
                if self.bodies.is_alive(i)
                    && collide(
                        &probe,
                        &probe_pose,
                        &self.bodies.shapes[i],
                        &self.bodies.pose(i),
                        &self.hulls,
                        &mut scratch,
                    )
                {
                    out.push(self.bodies.id_at(i));
                }
            },
        );
        out.len()
    }

    /// Bodies whose bounding box overlaps an axis-aligned box.
    ///
    /// Clears `out`, fills it in slot order and returns the count.
    pub fn overlap_box(
        &self,
        center: Point3<f64>,
        half_extents: Vector3<f64>,
        out: &mut Vec<BodyId>,
    ) -> usize {
        out.clear();
        let half = half_extents.abs();
        sim_simd::for_each_aabb_overlap(
            &self.bodies.aabb_mins,
            &self.bodies.aabb_maxs,
            &(center - half),
            &(center + half),
            |i| {
                if self.bodies.is_alive(i) {
                    out.push(self.bodies.id_at(i));
                }
            },
        );
        out.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::UnitQuaternion;

    #[test]
    fn test_raycast_sphere_hit() {
        let hit = raycast_sphere(
            &Point3::new(0.0, 0.0, 5.0),
            1.0,
            &Point3::origin(),
            &Vector3::z(),
            100.0,
        )
        .unwrap();
        assert_relative_eq!(hit.distance, 4.0, epsilon = 1e-12);
        assert_relative_eq!(hit.normal, -Vector3::z(), epsilon = 1e-12);
    }

    #[test]
    fn test_raycast_sphere_miss_and_max_distance() {
        let center = Point3::new(0.0, 0.0, 5.0);
        assert!(raycast_sphere(&center, 1.0, &Point3::new(3.0, 0.0, 0.0), &Vector3::z(), 100.0)
            .is_none());
        assert!(raycast_sphere(&center, 1.0, &Point3::origin(), &Vector3::z(), 3.9).is_none());
    }

    #[test]
    fn test_raycast_sphere_from_inside() {
        let hit =
            raycast_sphere(&Point3::origin(), 2.0, &Point3::origin(), &Vector3::x(), 10.0).unwrap();
        assert_relative_eq!(hit.distance, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_raycast_plane_normal_faces_ray() {
        let hit = raycast_plane(
            &Vector3::y(),
            0.0,
            &Point3::new(0.0, 3.0, 0.0),
            &-Vector3::y(),
            10.0,
        )
        .unwrap();
        assert_relative_eq!(hit.distance, 3.0, epsilon = 1e-12);
        assert_relative_eq!(hit.normal, Vector3::y());

        // Parallel rays miss.
        assert!(raycast_plane(&Vector3::y(), 0.0, &Point3::new(0.0, 1.0, 0.0), &Vector3::x(), 10.0)
            .is_none());
    }

    #[test]
    fn test_raycast_rotated_box() {
        let pose = Pose::from_position_rotation(
            Point3::new(5.0, 0.0, 0.0),
            UnitQuaternion::from_axis_angle(&Vector3::y_axis(), std::f64::consts::FRAC_PI_4),
        );
        let hit = raycast_box(
            &pose,
            &Vector3::new(1.0, 1.0, 1.0),
            &Point3::origin(),
            &Vector3::x(),
            100.0,
        )
        .unwrap();
        // Hits the vertical edge at distance 5 - √2.
        assert_relative_eq!(hit.distance, 5.0 - 2.0_f64.sqrt(), epsilon = 1e-9);
        assert!(hit.normal.x < 0.0);
    }

    #[test]
    fn test_raycast_capsule_body_and_cap() {
        let pose = Pose::from_position(Point3::new(0.0, 0.0, 0.0));
        let side = raycast_capsule(
            &pose,
            1.0,
            0.5,
            &Point3::new(-5.0, 0.5, 0.0),
            &Vector3::x(),
            100.0,
        )
        .unwrap();
        assert_relative_eq!(side.distance, 4.5, epsilon = 1e-12);
        assert_relative_eq!(side.normal, -Vector3::x(), epsilon = 1e-12);

        let top = raycast_capsule(
            &pose,
            1.0,
            0.5,
            &Point3::new(0.0, 5.0, 0.0),
            &-Vector3::y(),
            100.0,
        )
        .unwrap();
        assert_relative_eq!(top.distance, 3.5, epsilon = 1e-12);
        assert_relative_eq!(top.normal, Vector3::y(), epsilon = 1e-12);
    }

    #[test]
    fn test_raycast_aabb() {
        let aabb = Aabb::new(Point3::new(-1.0, -1.0, -1.0), Point3::new(1.0, 1.0, 1.0));
        let hit =
            raycast_aabb(&aabb, &Point3::new(0.0, -4.0, 0.0), &Vector3::y(), 10.0).unwrap();
        assert_relative_eq!(hit.distance, 3.0);
        assert_relative_eq!(hit.normal, -Vector3::y());
    }
}
