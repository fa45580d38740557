//! Narrow-phase contact generation.
//!
//! [`collide`] turns one candidate pair into a [`ContactManifold`]. Pairs
//! with a closed-form test use it; anything involving a convex hull falls
//! back to GJK/EPA. Normals always point from the first shape toward the
//! second.
//!
//! | Pair | Method | Points |
//! |------|--------|--------|
//! | sphere-sphere | center distance | 1 |
//! | sphere-box | closest point on the oriented box | 1 |
//! | sphere-capsule | closest point on the core segment | 1 |
//! | capsule-capsule | segment-segment closest points plus endpoints | 1-4 |
//! | capsule-box | endpoints plus deepest segment point as spheres | 1-3 |
//! | box-box | SAT with face clipping | 1-4 |
//! | \*-plane | deepest support points below the plane | 1-4 |
//! | hull-\* | GJK/EPA | 1 |
//!
//! A contact is emitted when its depth exceeds `-CONTACT_EPSILON`, so
//! resting bodies keep a contact across steps where the solver pushed
//! them exactly to the surface. Reported depths are never negative: a pair
//! separated by less than the epsilon is reported at depth zero.

use nalgebra::{Point3, Vector3};
use sim_types::Pose;

use crate::contact::{ContactManifold, ContactPoint};
use crate::gjk_epa::{gjk_epa_contact, ConvexShape};
use crate::shape::{capsule_segment, world_plane, CollisionShape, HullPool};

/// Separation still reported as touching, at depth zero.
pub const CONTACT_EPSILON: f64 = 1e-4;

/// Lengths below this are treated as zero.
const GEOM_EPSILON: f64 = 1e-12;

/// Edge axes must beat the best face axis by this factor to be chosen.
const EDGE_AXIS_BIAS: f64 = 0.95;

/// Ternary-search steps for the deepest capsule point inside a box.
const SEGMENT_SEARCH_ITERATIONS: usize = 40;

/// Feature ids of edge-edge box contacts start here.
const EDGE_FEATURE_BASE: u32 = 0x100;

/// Generate contacts between two posed shapes.
///
/// Clears `manifold`'s points and refills them. Returns whether any contact
/// was found. Shapes up to [`CONTACT_EPSILON`] apart still touch, with
/// every reported depth clamped to `>= 0`. Plane-plane pairs and hulls
/// missing from `hulls` never collide.
pub fn collide(
    shape_a: &CollisionShape,
    pose_a: &Pose,
    shape_b: &CollisionShape,
    pose_b: &Pose,
    hulls: &HullPool,
    manifold: &mut ContactManifold,
) -> bool {
    use CollisionShape as S;

    manifold.clear_points();
    match (shape_a, shape_b) {
        (S::Plane { .. }, S::Plane { .. }) => {}
        (_, S::Plane { normal, distance }) => {
            let (n, d) = world_plane(pose_b, normal, *distance);
            collide_with_plane(shape_a, pose_a, &n, d, hulls, manifold);
        }
        (S::Plane { .. }, _)
        | (S::Box { .. } | S::Capsule { .. }, S::Sphere { .. })
        | (S::Box { .. }, S::Capsule { .. }) => {
            collide(shape_b, pose_b, shape_a, pose_a, hulls, manifold);
            manifold.flip_normals();
        }
        (S::ConvexHull { .. }, _) | (_, S::ConvexHull { .. }) => {
            collide_convex(shape_a, pose_a, shape_b, pose_b, hulls, manifold);
        }
        (S::Sphere { radius: ra }, S::Sphere { radius: rb }) => {
            sphere_sphere(manifold, &pose_a.position, *ra, &pose_b.position, *rb, 0);
        }
        (S::Sphere { radius }, S::Box { half_extents }) => {
            if let Some((position, normal, depth)) =
                sphere_box(&pose_a.position, *radius, pose_b, half_extents)
            {
                emit(manifold, position, normal, depth, 0);
            }
        }
        (S::Sphere { radius }, S::Capsule { radius: rc, height }) => {
            let (p, q) = capsule_segment(pose_b, *height);
            let closest = closest_point_segment(&p, &q, &pose_a.position);
            sphere_sphere(manifold, &pose_a.position, *radius, &closest, *rc, 0);
        }
        (
            S::Capsule {
                radius: ra,
                height: ha,
            },
            S::Capsule {
                radius: rb,
                height: hb,
            },
        ) => capsule_capsule(manifold, pose_a, *ra, *ha, pose_b, *rb, *hb),
        (S::Capsule { radius, height }, S::Box { half_extents }) => {
            capsule_box(manifold, pose_a, *radius, *height, pose_b, half_extents);
        }
        (S::Box { half_extents: ha }, S::Box { half_extents: hb }) => {
            box_box(manifold, pose_a, ha, pose_b, hb);
        }
    }
    !manifold.is_empty()
}

fn emit(
    manifold: &mut ContactManifold,
    position: Point3<f64>,
    normal: Vector3<f64>,
    depth: f64,
    feature: u32,
) {
    if depth > -CONTACT_EPSILON && depth.is_finite() {
        manifold.add_point(ContactPoint::new(position, normal, depth.max(0.0), feature));
    }
}

fn collide_convex(
    shape_a: &CollisionShape,
    pose_a: &Pose,
    shape_b: &CollisionShape,
    pose_b: &Pose,
    hulls: &HullPool,
    manifold: &mut ContactManifold,
) {
    let (Some(a), Some(b)) = (
        ConvexShape::resolve(shape_a, hulls),
        ConvexShape::resolve(shape_b, hulls),
    ) else {
        return;
    };
    if let Some(contact) = gjk_epa_contact(&a, pose_a, &b, pose_b) {
        emit(
            manifold,
            contact.point,
            contact.normal,
            contact.penetration,
            contact.feature,
        );
    }
}

// =============================================================================
// Spheres and Capsules
// =============================================================================

fn sphere_sphere(
    manifold: &mut ContactManifold,
    center_a: &Point3<f64>,
    radius_a: f64,
    center_b: &Point3<f64>,
    radius_b: f64,
    feature: u32,
) {
    let delta = center_b - center_a;
    let dist = delta.norm();
    let depth = radius_a + radius_b - dist;
    if depth <= -CONTACT_EPSILON {
        return;
    }
    // Coincident centers have no preferred direction.
    let normal = if dist > GEOM_EPSILON {
        delta / dist
    } else {
        Vector3::y()
    };
    let position = center_a + normal * (radius_a - 0.5 * depth);
    emit(manifold, position, normal, depth, feature);
}

/// Sphere against an oriented box.
///
/// Returns `(position, normal from sphere to box, depth)`.
fn sphere_box(
    center: &Point3<f64>,
    radius: f64,
    box_pose: &Pose,
    half_extents: &Vector3<f64>,
) -> Option<(Point3<f64>, Vector3<f64>, f64)> {
    let local = box_pose.inverse_transform_point(center).coords;
    let clamped = local.sup(&(-half_extents)).inf(half_extents);
    let diff = local - clamped;
    let dist_sq = diff.norm_squared();

    let (outward, depth, surface) = if dist_sq > GEOM_EPSILON * GEOM_EPSILON {
        let dist = dist_sq.sqrt();
        (diff / dist, radius - dist, clamped)
    } else {
        // Center inside the box: push out through the nearest face.
        let mut axis = 0;
        let mut best = f64::INFINITY;
        for k in 0..3 {
            let gap = half_extents[k] - local[k].abs();
            if gap < best {
                best = gap;
                axis = k;
            }
        }
        let sign = if local[axis] >= 0.0 { 1.0 } else { -1.0 };
        let mut outward = Vector3::zeros();
        outward[axis] = sign;
        let mut surface = local;
        surface[axis] = sign * half_extents[axis];
        (outward, radius + best, surface)
    };
    if depth <= -CONTACT_EPSILON {
        return None;
    }

    let outward = box_pose.transform_vector(&outward);
    let surface = box_pose.transform_point(&Point3::from(surface));
    let deepest = center - outward * radius;
    Some((nalgebra::center(&surface, &deepest), -outward, depth))
}

#[allow(clippy::too_many_arguments)]
fn capsule_capsule(
    manifold: &mut ContactManifold,
    pose_a: &Pose,
    radius_a: f64,
    height_a: f64,
    pose_b: &Pose,
    radius_b: f64,
    height_b: f64,
) {
    let (a0, a1) = capsule_segment(pose_a, height_a);
    let (b0, b1) = capsule_segment(pose_b, height_b);

    let (on_a, on_b) = closest_points_segments(&a0, &a1, &b0, &b1);
    sphere_sphere(manifold, &on_a, radius_a, &on_b, radius_b, 2);

    // Endpoints give the second support point when the capsules lie along
    // each other.
    for (k, end) in [a0, a1].iter().enumerate() {
        let on_b = closest_point_segment(&b0, &b1, end);
        sphere_sphere(manifold, end, radius_a, &on_b, radius_b, k as u32);
    }
    for (k, end) in [b0, b1].iter().enumerate() {
        let on_a = closest_point_segment(&a0, &a1, end);
        sphere_sphere(manifold, &on_a, radius_a, end, radius_b, 3 + k as u32);
    }
}

fn capsule_box(
    manifold: &mut ContactManifold,
    capsule_pose: &Pose,
    radius: f64,
    height: f64,
    box_pose: &Pose,
    half_extents: &Vector3<f64>,
) {
    let (p, q) = capsule_segment(capsule_pose, height);
    for (k, end) in [p, q].iter().enumerate() {
        if let Some((position, normal, depth)) = sphere_box(end, radius, box_pose, half_extents) {
            emit(manifold, position, normal, depth, k as u32);
        }
    }

    // The box distance is convex along the segment.
    let lp = box_pose.inverse_transform_point(&p).coords;
    let lq = box_pose.inverse_transform_point(&q).coords;
    let (mut lo, mut hi) = (0.0_f64, 1.0_f64);
    for _ in 0..SEGMENT_SEARCH_ITERATIONS {
        let m1 = lo + (hi - lo) / 3.0;
        let m2 = hi - (hi - lo) / 3.0;
        let d1 = box_signed_distance(&(lp + (lq - lp) * m1), half_extents);
        let d2 = box_signed_distance(&(lp + (lq - lp) * m2), half_extents);
        if d1 < d2 {
            hi = m2;
        } else {
            lo = m1;
        }
    }
    let t = 0.5 * (lo + hi);
    let deepest = p + (q - p) * t;
    if let Some((position, normal, depth)) = sphere_box(&deepest, radius, box_pose, half_extents) {
        emit(manifold, position, normal, depth, 2);
    }
}

/// Signed distance from a box-local point to an origin-centered box.
fn box_signed_distance(p: &Vector3<f64>, half_extents: &Vector3<f64>) -> f64 {
    let q = p.abs() - half_extents;
    let outside = q.map(|x| x.max(0.0)).norm();
    let inside = q.max().min(0.0);
    outside + inside
}

// =============================================================================
// Box-Box (SAT)
// =============================================================================

#[derive(Debug, Clone, Copy)]
enum SatAxis {
    FaceA(usize),
    FaceB(usize),
    Edge(usize, usize),
}

struct BoxFrame<'a> {
    center: Point3<f64>,
    axes: [Vector3<f64>; 3],
    half_extents: &'a Vector3<f64>,
}

impl<'a> BoxFrame<'a> {
    fn new(pose: &Pose, half_extents: &'a Vector3<f64>) -> Self {
        let rot = pose.rotation.to_rotation_matrix();
        let m = rot.matrix();
        Self {
            center: pose.position,
            axes: [
                m.column(0).into_owned(),
                m.column(1).into_owned(),
                m.column(2).into_owned(),
            ],
            half_extents,
        }
    }

    /// Half-length of the box's projection onto `axis`.
    fn projected_radius(&self, axis: &Vector3<f64>) -> f64 {
        (0..3)
            .map(|k| self.half_extents[k] * self.axes[k].dot(axis).abs())
            .sum()
    }
}

fn sat_penetration(a: &BoxFrame<'_>, b: &BoxFrame<'_>, axis: &Vector3<f64>) -> f64 {
    let dist = (b.center - a.center).dot(axis).abs();
    a.projected_radius(axis) + b.projected_radius(axis) - dist
}

fn box_box(
    manifold: &mut ContactManifold,
    pose_a: &Pose,
    half_a: &Vector3<f64>,
    pose_b: &Pose,
    half_b: &Vector3<f64>,
) {
    let a = BoxFrame::new(pose_a, half_a);
    let b = BoxFrame::new(pose_b, half_b);

    let mut best: Option<(f64, Vector3<f64>, SatAxis)> = None;
    for k in 0..6 {
        let (axis, kind) = if k < 3 {
            (a.axes[k], SatAxis::FaceA(k))
        } else {
            (b.axes[k - 3], SatAxis::FaceB(k - 3))
        };
        let pen = sat_penetration(&a, &b, &axis);
        if pen <= -CONTACT_EPSILON {
            return;
        }
        if best.map_or(true, |(best_pen, _, _)| pen < best_pen) {
            best = Some((pen, axis, kind));
        }
    }
    for i in 0..3 {
        for j in 0..3 {
            let axis = a.axes[i].cross(&b.axes[j]);
            let len = axis.norm();
            if len < 1e-6 {
                continue;
            }
            let axis = axis / len;
            let pen = sat_penetration(&a, &b, &axis);
            if pen <= -CONTACT_EPSILON {
                return;
            }
            if best.map_or(true, |(best_pen, _, _)| pen < best_pen * EDGE_AXIS_BIAS) {
                best = Some((pen, axis, SatAxis::Edge(i, j)));
            }
        }
    }
    let Some((pen, axis, kind)) = best else {
        return;
    };
    let normal = if axis.dot(&(b.center - a.center)) < 0.0 {
        -axis
    } else {
        axis
    };

    match kind {
        SatAxis::FaceA(k) => clip_box_faces(manifold, &a, k, &b, normal, normal, 0),
        SatAxis::FaceB(k) => clip_box_faces(manifold, &b, k, &a, -normal, normal, 6),
        SatAxis::Edge(i, j) => {
            let mut on_a = a.center;
            let mut on_b = b.center;
            for k in 0..3 {
                if k != i {
                    let s = if a.axes[k].dot(&normal) > 0.0 { 1.0 } else { -1.0 };
                    on_a += a.axes[k] * (a.half_extents[k] * s);
                }
                if k != j {
                    let s = if b.axes[k].dot(&normal) > 0.0 { -1.0 } else { 1.0 };
                    on_b += b.axes[k] * (b.half_extents[k] * s);
                }
            }
            let ea = a.axes[i] * a.half_extents[i];
            let eb = b.axes[j] * b.half_extents[j];
            let (pa, pb) = closest_points_segments(&(on_a - ea), &(on_a + ea), &(on_b - eb), &(on_b + eb));
            let feature = EDGE_FEATURE_BASE + (i * 3 + j) as u32;
            emit(manifold, nalgebra::center(&pa, &pb), normal, pen, feature);
        }
    }
}

/// Convex polygon with a feature tag per vertex.
#[derive(Clone, Copy)]
struct ClipPolygon {
    vertices: [(Point3<f64>, u32); 8],
    len: usize,
}

impl ClipPolygon {
    fn empty() -> Self {
        Self {
            vertices: [(Point3::origin(), 0); 8],
            len: 0,
        }
    }

    fn push(&mut self, point: Point3<f64>, tag: u32) {
        if self.len < self.vertices.len() {
            self.vertices[self.len] = (point, tag);
            self.len += 1;
        }
    }

    fn as_slice(&self) -> &[(Point3<f64>, u32)] {
        &self.vertices[..self.len]
    }

    /// Sutherland-Hodgman clip against `plane_normal · x <= offset`.
    fn clip(&self, plane_normal: &Vector3<f64>, offset: f64, plane_index: u32) -> Self {
        let mut out = Self::empty();
        for i in 0..self.len {
            let (p, tag) = self.vertices[i];
            let (q, _) = self.vertices[(i + 1) % self.len];
            let dp = plane_normal.dot(&p.coords) - offset;
            let dq = plane_normal.dot(&q.coords) - offset;
            if dp <= 0.0 {
                out.push(p, tag);
            }
            if (dp <= 0.0) != (dq <= 0.0) {
                let t = dp / (dp - dq);
                let crossing = if dp <= 0.0 { 0 } else { 1 };
                out.push(p + (q - p) * t, 4 + plane_index * 2 + crossing);
            }
        }
        out
    }
}

/// Clip the incident face of `incident` against face `axis` of `reference`.
///
/// `ref_normal` is the reference face's outward normal (toward `incident`);
/// `normal` is the contact normal reported on every point.
fn clip_box_faces(
    manifold: &mut ContactManifold,
    reference: &BoxFrame<'_>,
    axis: usize,
    incident: &BoxFrame<'_>,
    ref_normal: Vector3<f64>,
    normal: Vector3<f64>,
    face_base: u32,
) {
    let face_center = reference.center + ref_normal * reference.half_extents[axis];
    let side = if ref_normal.dot(&reference.axes[axis]) > 0.0 { 0 } else { 1 };
    let face_id = face_base + axis as u32 * 2 + side;

    // Incident face: the one most anti-parallel to the reference normal.
    let mut inc = 0;
    let mut best = f64::NEG_INFINITY;
    for k in 0..3 {
        let d = incident.axes[k].dot(&ref_normal).abs();
        if d > best {
            best = d;
            inc = k;
        }
    }
    let inc_normal = if incident.axes[inc].dot(&ref_normal) > 0.0 {
        -incident.axes[inc]
    } else {
        incident.axes[inc]
    };
    let inc_center = incident.center + inc_normal * incident.half_extents[inc];
    let (iu, iv) = ((inc + 1) % 3, (inc + 2) % 3);
    let du = incident.axes[iu] * incident.half_extents[iu];
    let dv = incident.axes[iv] * incident.half_extents[iv];

    let mut polygon = ClipPolygon::empty();
    polygon.push(inc_center + du + dv, 0);
    polygon.push(inc_center - du + dv, 1);
    polygon.push(inc_center - du - dv, 2);
    polygon.push(inc_center + du - dv, 3);

    let (ru, rv) = ((axis + 1) % 3, (axis + 2) % 3);
    let mut plane_index = 0;
    for side_axis in [ru, rv] {
        let dir = reference.axes[side_axis];
        let extent = reference.half_extents[side_axis];
        let c = dir.dot(&face_center.coords);
        polygon = polygon.clip(&dir, c + extent, plane_index);
        polygon = polygon.clip(&(-dir), extent - c, plane_index + 1);
        plane_index += 2;
    }

    for &(point, tag) in polygon.as_slice() {
        let separation = ref_normal.dot(&(point - face_center));
        let position = point - ref_normal * (0.5 * separation);
        emit(manifold, position, normal, -separation, face_id * 16 + tag);
    }
}

// =============================================================================
// Planes
// =============================================================================

/// Contacts between a shape and the world plane `n · x = d`.
///
/// The shape is pushed out along `n`, so the reported normal is `-n`.
fn collide_with_plane(
    shape: &CollisionShape,
    pose: &Pose,
    n: &Vector3<f64>,
    d: f64,
    hulls: &HullPool,
    manifold: &mut ContactManifold,
) {
    match shape {
        CollisionShape::Sphere { radius } => {
            sphere_plane(manifold, &pose.position, *radius, n, d, 0);
        }
        CollisionShape::Capsule { radius, height } => {
            let (p, q) = capsule_segment(pose, *height);
            sphere_plane(manifold, &p, *radius, n, d, 0);
            sphere_plane(manifold, &q, *radius, n, d, 1);
        }
        CollisionShape::Box { half_extents } => {
            for corner in 0..8_u32 {
                let pick = |bit: u32, h: f64| if corner & bit == 0 { -h } else { h };
                let local = Point3::new(
                    pick(1, half_extents.x),
                    pick(2, half_extents.y),
                    pick(4, half_extents.z),
                );
                point_plane(manifold, &pose.transform_point(&local), n, d, corner);
            }
        }
        CollisionShape::ConvexHull { hull } => {
            if let Some(hull) = hulls.get(*hull) {
                for (i, v) in hull.points().iter().enumerate() {
                    let world = pose.transform_point(&Point3::from(*v));
                    point_plane(manifold, &world, n, d, i as u32);
                }
            }
        }
        CollisionShape::Plane { .. } => {}
    }
}

fn sphere_plane(
    manifold: &mut ContactManifold,
    center: &Point3<f64>,
    radius: f64,
    n: &Vector3<f64>,
    d: f64,
    feature: u32,
) {
    let dist = n.dot(&center.coords) - d;
    let position = center - n * (0.5 * (radius + dist));
    emit(manifold, position, -n, radius - dist, feature);
}

fn point_plane(
    manifold: &mut ContactManifold,
    point: &Point3<f64>,
    n: &Vector3<f64>,
    d: f64,
    feature: u32,
) {
    let dist = n.dot(&point.coords) - d;
    emit(manifold, point - n * (0.5 * dist), -n, -dist, feature);
}

// =============================================================================
// Segment Helpers
// =============================================================================

/// Closest point on segment `ab` to `p`.
#[inline]
pub(crate) fn closest_point_segment(a: &Point3<f64>, b: &Point3<f64>, p: &Point3<f64>) -> Point3<f64> {
    let ab = b - a;
    let len_sq = ab.norm_squared();
    if len_sq < GEOM_EPSILON {
        return *a; // Degenerate segment
    }
    let t = ((p - a).dot(&ab) / len_sq).clamp(0.0, 1.0);
    a + ab * t
}

/// Closest points between segments `p1q1` and `p2q2`.
///
/// Returns (`point_on_seg1`, `point_on_seg2`).
#[allow(clippy::many_single_char_names)]
pub(crate) fn closest_points_segments(
    p1: &Point3<f64>,
    q1: &Point3<f64>,
    p2: &Point3<f64>,
    q2: &Point3<f64>,
) -> (Point3<f64>, Point3<f64>) {
    let d1 = q1 - p1;
    let d2 = q2 - p2;
    let r = p1 - p2;
    let a = d1.norm_squared();
    let e = d2.norm_squared();
    let f = d2.dot(&r);

    if a < GEOM_EPSILON && e < GEOM_EPSILON {
        return (*p1, *p2);
    }
    if a < GEOM_EPSILON {
        return (*p1, p2 + d2 * (f / e).clamp(0.0, 1.0));
    }
    let c = d1.dot(&r);
    if e < GEOM_EPSILON {
        return (p1 + d1 * (-c / a).clamp(0.0, 1.0), *p2);
    }

    let b = d1.dot(&d2);
    #[allow(clippy::suspicious_operation_groupings)]
    let denom = a * e - b * b;
    // Parallel segments: any s works, start from p1.
    let mut s = if denom > GEOM_EPSILON * a * e {
        ((b * f - c * e) / denom).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let mut t = (b * s + f) / e;
    if t < 0.0 {
        t = 0.0;
        s = (-c / a).clamp(0.0, 1.0);
    } else if t > 1.0 {
        t = 1.0;
        s = ((b - c) / a).clamp(0.0, 1.0);
    }
    (p1 + d1 * s, p2 + d2 * t)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::shape::ConvexHull;
    use approx::assert_relative_eq;
    use nalgebra::UnitQuaternion;
    use sim_types::BodyId;

    fn at(x: f64, y: f64, z: f64) -> Pose {
        Pose::from_position(Point3::new(x, y, z))
    }

    fn run(a: &CollisionShape, pa: &Pose, b: &CollisionShape, pb: &Pose) -> ContactManifold {
        run_with(a, pa, b, pb, &HullPool::with_capacity(0))
    }

    fn run_with(
        a: &CollisionShape,
        pa: &Pose,
        b: &CollisionShape,
        pb: &Pose,
        hulls: &HullPool,
    ) -> ContactManifold {
        let mut m = ContactManifold::new(BodyId::new(0, 0), BodyId::new(1, 0));
        collide(a, pa, b, pb, hulls, &mut m);
        m
    }

    #[test]
    fn test_sphere_sphere_depth_and_normal() {
        let s = CollisionShape::sphere(0.5);
        let m = run(&s, &at(0.0, 0.0, 0.0), &s, &at(0.8, 0.0, 0.0));
        assert_eq!(m.len(), 1);
        let p = m.points()[0];
        assert_relative_eq!(p.depth, 0.2, epsilon = 1e-12);
        assert_relative_eq!(p.normal, Vector3::x(), epsilon = 1e-12);
        assert_relative_eq!(p.position.x, 0.4, epsilon = 1e-12);
    }

    #[test]
    fn test_coincident_spheres_use_up_normal() {
        let s = CollisionShape::sphere(0.5);
        let m = run(&s, &at(1.0, 1.0, 1.0), &s, &at(1.0, 1.0, 1.0));
        assert_eq!(m.len(), 1);
        assert_eq!(m.normal, Vector3::y());
        assert_relative_eq!(m.points()[0].depth, 1.0);
    }

    #[test]
    fn test_separated_pairs_report_nothing() {
        let s = CollisionShape::sphere(0.5);
        let b = CollisionShape::cuboid(Vector3::new(0.5, 0.5, 0.5));
        assert!(run(&s, &at(0.0, 0.0, 0.0), &s, &at(1.1, 0.0, 0.0)).is_empty());
        assert!(run(&b, &at(0.0, 0.0, 0.0), &b, &at(0.0, 1.2, 0.0)).is_empty());
        assert!(run(&s, &at(0.0, 2.0, 0.0), &b, &at(0.0, 0.0, 0.0)).is_empty());
    }

    #[test]
    fn test_touching_within_epsilon_is_reported() {
        let s = CollisionShape::sphere(0.5);
        let m = run(&s, &at(0.0, 0.0, 0.0), &s, &at(1.0 + 0.5 * CONTACT_EPSILON, 0.0, 0.0));
        assert_eq!(m.len(), 1);
        assert_eq!(m.points()[0].depth, 0.0);

        let b = CollisionShape::cuboid(Vector3::new(0.5, 0.5, 0.5));
        let m = run(&b, &at(0.0, 0.0, 0.0), &b, &at(0.0, 1.0 + 0.5 * CONTACT_EPSILON, 0.0));
        assert!(!m.is_empty());
        assert!(m.points().iter().all(|p| p.depth >= 0.0));

        let far = run(&s, &at(0.0, 0.0, 0.0), &s, &at(1.0 + 2.0 * CONTACT_EPSILON, 0.0, 0.0));
        assert!(far.is_empty());
    }

    #[test]
    fn test_sphere_box_face_contact() {
        let s = CollisionShape::sphere(0.5);
        let b = CollisionShape::cuboid(Vector3::new(1.0, 0.5, 1.0));
        let m = run(&s, &at(0.2, 0.9, 0.0), &b, &at(0.0, 0.0, 0.0));
        assert_eq!(m.len(), 1);
        assert_relative_eq!(m.points()[0].depth, 0.1, epsilon = 1e-12);
        assert_relative_eq!(m.normal, -Vector3::y(), epsilon = 1e-12);

        // Swapped order flips the normal.
        let m = run(&b, &at(0.0, 0.0, 0.0), &s, &at(0.2, 0.9, 0.0));
        assert_relative_eq!(m.normal, Vector3::y(), epsilon = 1e-12);
    }

    #[test]
    fn test_sphere_center_inside_box() {
        let s = CollisionShape::sphere(0.25);
        let b = CollisionShape::cuboid(Vector3::new(1.0, 1.0, 1.0));
        let m = run(&s, &at(0.0, 0.0, 0.9), &b, &at(0.0, 0.0, 0.0));
        assert_eq!(m.len(), 1);
        assert_relative_eq!(m.points()[0].depth, 0.35, epsilon = 1e-12);
        assert_relative_eq!(m.normal, -Vector3::z(), epsilon = 1e-12);
    }

    #[test]
    fn test_sphere_capsule_side_contact() {
        let s = CollisionShape::sphere(0.5);
        let c = CollisionShape::capsule(0.25, 2.0);
        let m = run(&s, &at(0.7, 0.5, 0.0), &c, &at(0.0, 0.0, 0.0));
        assert_eq!(m.len(), 1);
        assert_relative_eq!(m.points()[0].depth, 0.05, epsilon = 1e-12);
        assert_relative_eq!(m.normal, -Vector3::x(), epsilon = 1e-12);
    }

    #[test]
    fn test_crossing_capsules_single_point() {
        let c = CollisionShape::capsule(0.25, 2.0);
        let lying = Pose::from_position_rotation(
            Point3::new(0.0, 0.45, 0.0),
            UnitQuaternion::from_axis_angle(&Vector3::x_axis(), std::f64::consts::FRAC_PI_2),
        );
        let flat = Pose::from_position_rotation(
            Point3::origin(),
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), std::f64::consts::FRAC_PI_2),
        );
        let m = run(&c, &flat, &c, &lying);
        assert_eq!(m.len(), 1);
        assert_eq!(m.points()[0].feature, 2);
        assert_relative_eq!(m.points()[0].depth, 0.05, epsilon = 1e-9);
        assert_relative_eq!(m.normal, Vector3::y(), epsilon = 1e-9);
    }

    #[test]
    fn test_parallel_capsules_two_points() {
        let c = CollisionShape::capsule(0.25, 2.0);
        let rot = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), std::f64::consts::FRAC_PI_2);
        let a = Pose::from_position_rotation(Point3::origin(), rot);
        let b = Pose::from_position_rotation(Point3::new(0.5, 0.45, 0.0), rot);
        let m = run(&c, &a, &c, &b);
        assert_eq!(m.len(), 2);
        for p in m.points() {
            assert_relative_eq!(p.depth, 0.05, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_capsule_standing_on_box() {
        let c = CollisionShape::capsule(0.25, 1.0);
        let b = CollisionShape::cuboid(Vector3::new(0.5, 0.5, 0.5));
        let m = run(&c, &at(0.0, 1.2, 0.0), &b, &at(0.0, 0.0, 0.0));
        assert!(!m.is_empty());
        assert_relative_eq!(m.max_depth(), 0.05, epsilon = 1e-6);
        assert_relative_eq!(m.normal, -Vector3::y(), epsilon = 1e-6);
    }

    #[test]
    fn test_box_resting_on_box_gives_four_points() {
        let b = CollisionShape::cuboid(Vector3::new(0.5, 0.5, 0.5));
        let m = run(&b, &at(0.0, 0.0, 0.0), &b, &at(0.2, 0.95, 0.0));
        assert_eq!(m.len(), 4);
        assert_relative_eq!(m.normal, Vector3::y(), epsilon = 1e-12);
        for p in m.points() {
            assert_relative_eq!(p.depth, 0.05, epsilon = 1e-9);
            assert!(p.position.x >= -0.3 - 1e-9 && p.position.x <= 0.5 + 1e-9);
        }
        let mut features: Vec<u32> = m.points().iter().map(|p| p.feature).collect();
        features.sort_unstable();
        features.dedup();
        assert_eq!(features.len(), 4);
    }

    #[test]
    fn test_rotated_box_edge_contact() {
        let b = CollisionShape::cuboid(Vector3::new(0.5, 0.5, 0.5));
        // Both boxes stand on an edge; their edges cross at right angles.
        let qa = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), std::f64::consts::FRAC_PI_4);
        let qb = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), std::f64::consts::FRAC_PI_4);
        let gap = std::f64::consts::SQRT_2 - 0.02;
        let m = run(
            &b,
            &Pose::from_position_rotation(Point3::origin(), qa),
            &b,
            &Pose::from_position_rotation(Point3::new(0.0, gap, 0.0), qb),
        );
        assert_eq!(m.len(), 1);
        assert!(m.points()[0].feature >= EDGE_FEATURE_BASE);
        assert_relative_eq!(m.points()[0].depth, 0.02, epsilon = 1e-9);
        assert_relative_eq!(m.normal, Vector3::y(), epsilon = 1e-9);
    }

    #[test]
    fn test_box_on_plane_four_deepest_corners() {
        let b = CollisionShape::cuboid(Vector3::new(0.5, 0.5, 0.5));
        let ground = CollisionShape::ground_plane(0.0);
        let m = run(&b, &at(3.0, 0.45, -2.0), &ground, &Pose::identity());
        assert_eq!(m.len(), 4);
        assert_relative_eq!(m.normal, -Vector3::y(), epsilon = 1e-12);
        for p in m.points() {
            assert_relative_eq!(p.depth, 0.05, epsilon = 1e-12);
            assert_relative_eq!(p.position.y, -0.025, epsilon = 1e-12);
        }

        let m = run(&ground, &Pose::identity(), &b, &at(3.0, 0.45, -2.0));
        assert_relative_eq!(m.normal, Vector3::y(), epsilon = 1e-12);
    }

    #[test]
    fn test_capsule_lying_on_plane_two_points() {
        let c = CollisionShape::capsule(0.5, 2.0);
        let pose = Pose::from_position_rotation(
            Point3::new(0.0, 0.45, 0.0),
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), std::f64::consts::FRAC_PI_2),
        );
        let m = run(&c, &pose, &CollisionShape::ground_plane(0.0), &Pose::identity());
        assert_eq!(m.len(), 2);
        for p in m.points() {
            assert_relative_eq!(p.depth, 0.05, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_planes_never_collide() {
        let p = CollisionShape::ground_plane(0.0);
        assert!(run(&p, &Pose::identity(), &p, &Pose::identity()).is_empty());
    }

    #[test]
    fn test_hull_routes_through_gjk() {
        let mut hulls = HullPool::with_capacity(1);
        let mut points = Vec::new();
        for &x in &[-0.5, 0.5] {
            for &y in &[-0.5, 0.5] {
                for &z in &[-0.5, 0.5] {
                    points.push(Point3::new(x, y, z));
                }
            }
        }
        let id = hulls.insert(ConvexHull::new(&points).unwrap()).unwrap();
        let hull = CollisionShape::convex_hull(id);
        let b = CollisionShape::cuboid(Vector3::new(0.5, 0.5, 0.5));

        let m = run_with(&hull, &at(0.0, 0.0, 0.0), &b, &at(0.8, 0.0, 0.0), &hulls);
        assert_eq!(m.len(), 1);
        assert_relative_eq!(m.points()[0].depth, 0.2, epsilon = 1e-4);
        assert!(m.normal.x > 0.99);

        // Hull on the ground uses its lowest vertices.
        let m = run_with(
            &hull,
            &at(0.0, 0.45, 0.0),
            &CollisionShape::ground_plane(0.0),
            &Pose::identity(),
            &hulls,
        );
        assert_eq!(m.len(), 4);

        // Stale hull handle: no contact.
        hulls.clear();
        assert!(run_with(&hull, &at(0.0, 0.0, 0.0), &b, &at(0.8, 0.0, 0.0), &hulls).is_empty());
    }

    #[test]
    fn test_closest_points_segments() {
        let (a, b) = closest_points_segments(
            &Point3::new(-1.0, 0.0, 0.0),
            &Point3::new(1.0, 0.0, 0.0),
            &Point3::new(0.5, 1.0, -1.0),
            &Point3::new(0.5, 1.0, 1.0),
        );
        assert_relative_eq!(a, Point3::new(0.5, 0.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(b, Point3::new(0.5, 1.0, 0.0), epsilon = 1e-12);

        // Degenerate second segment.
        let p = Point3::new(3.0, 2.0, 0.0);
        let (a, b) = closest_points_segments(&Point3::origin(), &Point3::new(1.0, 0.0, 0.0), &p, &p);
        assert_relative_eq!(a, Point3::new(1.0, 0.0, 0.0), epsilon = 1e-12);
        assert_eq!(b, p);
    }

    #[test]
    fn test_closest_point_segment_clamps() {
        let a = Point3::origin();
        let b = Point3::new(2.0, 0.0, 0.0);
        assert_eq!(closest_point_segment(&a, &b, &Point3::new(-1.0, 1.0, 0.0)), a);
        assert_eq!(closest_point_segment(&a, &b, &Point3::new(5.0, 1.0, 0.0)), b);
        assert_relative_eq!(
            closest_point_segment(&a, &b, &Point3::new(1.5, 3.0, 0.0)),
            Point3::new(1.5, 0.0, 0.0)
        );
    }
}
