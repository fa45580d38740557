//! GJK (Gilbert-Johnson-Keerthi) and EPA (Expanding Polytope Algorithm) implementation.
//!
//! This is the general narrow-phase path for pairs without a closed-form
//! test (anything involving a convex hull). GJK decides whether two convex
//! shapes overlap; on overlap, EPA expands the terminal simplex to find the
//! penetration depth and contact normal.
//!
//! # Algorithm Overview
//!
//! ## GJK
//!
//! GJK works on the Minkowski difference `A - B`, which contains the origin
//! exactly when the shapes overlap. It grows a simplex (point, segment,
//! triangle, tetrahedron) toward the origin using support points and exits
//! as soon as a support point fails to pass the origin, which is the common
//! case for separated pairs.
//!
//! ## EPA
//!
//! Starting from GJK's enclosing tetrahedron, EPA repeatedly pushes out the
//! polytope face closest to the origin until the support point in that
//! face's normal no longer moves it. The final face gives the normal and
//! depth; barycentric weights on it give the witness points.
//!
//! # Allocation
//!
//! Both algorithms run on fixed-size stack arrays. When EPA runs out of
//! vertex, face or horizon-edge slots it returns the best face found so far.
//!
//! # Degeneracy
//!
//! A degenerate simplex (coincident support points, a collapsed search
//! direction or a flat tetrahedron) is reported as "no collision", never as
//! an error.
//!
//! # Usage
//!
//! ```
//! use sim_core::gjk_epa::{gjk_epa_contact, ConvexShape};
//! use sim_types::Pose;
//! use nalgebra::{Point3, Vector3};
//!
//! let a = ConvexShape::Box { half_extents: Vector3::new(0.5, 0.5, 0.5) };
//! let b = ConvexShape::Box { half_extents: Vector3::new(0.5, 0.5, 0.5) };
//! let pose_a = Pose::identity();
//! let pose_b = Pose::from_position(Point3::new(0.8, 0.0, 0.0));
//!
//! let contact = gjk_epa_contact(&a, &pose_a, &b, &pose_b).unwrap();
//! assert!((contact.penetration - 0.2).abs() < 1e-4);
//! assert!(contact.normal.x > 0.99);
//! ```
//!
//! # References
//!
//! - Gilbert, Johnson, Keerthi: "A Fast Procedure for Computing the Distance
//!   Between Complex Objects in Three-Dimensional Space" (1988)
//! - van den Bergen: "Collision Detection in Interactive 3D Environments" (2003)

use nalgebra::{Point3, Vector3};
use sim_types::Pose;

use crate::shape::{CollisionShape, ConvexHull, HullPool};

/// Tolerance for numerical comparisons in GJK/EPA.
pub const GJK_EPSILON: f64 = 1e-10;

/// Maximum iterations for GJK before giving up.
const GJK_MAX_ITERATIONS: usize = 64;

/// Maximum iterations for EPA before giving up.
const EPA_MAX_ITERATIONS: usize = 48;

/// Maximum vertices in the EPA polytope.
const EPA_MAX_VERTICES: usize = 4 + EPA_MAX_ITERATIONS;

/// Maximum faces in the EPA polytope.
const EPA_MAX_FACES: usize = 128;

/// Maximum horizon edges per EPA expansion.
const EPA_MAX_EDGES: usize = 64;

/// EPA convergence tolerance.
const EPA_TOLERANCE: f64 = 1e-6;

/// A convex shape with its geometry resolved for support queries.
#[derive(Debug, Clone, Copy)]
pub enum ConvexShape<'a> {
    /// Sphere centred on the body origin.
    Sphere {
        /// Radius.
        radius: f64,
    },
    /// Box centred on the body origin.
    Box {
        /// Half-extents.
        half_extents: Vector3<f64>,
    },
    /// Capsule along local Y.
    Capsule {
        /// Radius.
        radius: f64,
        /// Half the core segment length.
        half_height: f64,
    },
    /// Pooled point cloud.
    Hull(&'a ConvexHull),
}

impl<'a> ConvexShape<'a> {
    /// Resolve a collision shape; planes and dangling hull ids give `None`.
    #[must_use]
    pub fn resolve(shape: &CollisionShape, hulls: &'a HullPool) -> Option<Self> {
        match shape {
            CollisionShape::Sphere { radius } => Some(Self::Sphere { radius: *radius }),
            CollisionShape::Box { half_extents } => Some(Self::Box {
                half_extents: *half_extents,
            }),
            CollisionShape::Capsule { radius, height } => Some(Self::Capsule {
                radius: *radius,
                half_height: 0.5 * height,
            }),
            CollisionShape::ConvexHull { hull } => hulls.get(*hull).map(Self::Hull),
            CollisionShape::Plane { .. } => None,
        }
    }
}

/// Result of a GJK query.
#[derive(Debug, Clone)]
pub struct GjkResult {
    /// Whether the shapes intersect.
    pub intersecting: bool,
    /// The final simplex (for EPA if intersecting).
    pub simplex: Simplex,
    /// Number of iterations used.
    pub iterations: usize,
}

/// Result of EPA (penetration information).
#[derive(Debug, Clone)]
pub struct EpaResult {
    /// Penetration depth (positive when overlapping).
    pub depth: f64,
    /// Contact normal (points from A toward B).
    pub normal: Vector3<f64>,
    /// Deepest point of A, in world space.
    pub witness_a: Point3<f64>,
    /// Deepest point of B, in world space.
    pub witness_b: Point3<f64>,
    /// Packed support indices of the dominant face vertex.
    pub feature: u32,
    /// Number of iterations used.
    pub iterations: usize,
}

/// Contact information from GJK+EPA.
#[derive(Debug, Clone)]
pub struct GjkContact {
    /// Midpoint between the two witness points.
    pub point: Point3<f64>,
    /// Contact normal (points from A toward B).
    pub normal: Vector3<f64>,
    /// Penetration depth (positive when overlapping).
    pub penetration: f64,
    /// Feature id derived from the support indices.
    pub feature: u32,
}

/// A point in Minkowski space, with support points from both shapes.
#[derive(Debug, Clone, Copy, Default)]
pub struct MinkowskiPoint {
    /// The point in Minkowski space (`support_a` - `support_b`).
    pub point: Vector3<f64>,
    /// Support point from shape A in world space.
    pub support_a: Point3<f64>,
    /// Support point from shape B in world space.
    pub support_b: Point3<f64>,
    /// Feature index of `support_a` on shape A.
    pub index_a: u32,
    /// Feature index of `support_b` on shape B.
    pub index_b: u32,
}

/// A simplex used in GJK iteration.
///
/// Can be a point (1), line segment (2), triangle (3), or tetrahedron (4).
#[derive(Debug, Clone, Default)]
pub struct Simplex {
    /// Points in the simplex, newest first.
    points: [MinkowskiPoint; 4],
    /// Number of points in the simplex (1-4).
    size: usize,
}

impl Simplex {
    /// Create a new empty simplex.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a point onto the front of the simplex.
    pub fn push(&mut self, point: MinkowskiPoint) {
        for i in (1..=self.size.min(3)).rev() {
            self.points[i] = self.points[i - 1];
        }
        self.points[0] = point;
        self.size = (self.size + 1).min(4);
    }

    /// Get the number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.size
    }

    /// Check if the simplex is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Get points as a slice.
    #[must_use]
    pub fn points(&self) -> &[MinkowskiPoint] {
        &self.points[..self.size]
    }

    /// Set the simplex to contain only specific points.
    fn set(&mut self, points: &[MinkowskiPoint]) {
        self.size = points.len().min(4);
        for (i, p) in points.iter().take(4).enumerate() {
            self.points[i] = *p;
        }
    }
}

// =============================================================================
// Support Functions
// =============================================================================

/// Compute the support point for a convex shape in a given direction.
///
/// Returns the world-space point of the shape furthest along `direction`
/// and the index of the feature (box corner, capsule end, hull point) it
/// came from.
#[must_use]
pub fn support(shape: &ConvexShape<'_>, pose: &Pose, direction: &Vector3<f64>) -> (Point3<f64>, u32) {
    match shape {
        ConvexShape::Sphere { radius } => {
            let dir = direction.try_normalize(GJK_EPSILON).unwrap_or_else(Vector3::x);
            (pose.position + dir * *radius, 0)
        }
        ConvexShape::Box { half_extents } => {
            let local = pose.inverse_transform_vector(direction);
            let mut corner = Vector3::zeros();
            let mut index = 0;
            for k in 0..3 {
                if local[k] >= 0.0 {
                    corner[k] = half_extents[k];
                    index |= 1 << k;
                } else {
                    corner[k] = -half_extents[k];
                }
            }
            (pose.transform_point(&Point3::from(corner)), index)
        }
        ConvexShape::Capsule {
            radius,
            half_height,
        } => {
            let local = pose.inverse_transform_vector(direction);
            let (y, index) = if local.y >= 0.0 {
                (*half_height, 1)
            } else {
                (-*half_height, 0)
            };
            let end = pose.transform_point(&Point3::new(0.0, y, 0.0));
            let dir = direction.try_normalize(GJK_EPSILON).unwrap_or_else(Vector3::x);
            (end + dir * *radius, index)
        }
        ConvexShape::Hull(hull) => {
            let local = pose.inverse_transform_vector(direction);
            let (index, p) = hull.support_local(&local);
            (pose.transform_point(&Point3::from(p)), index as u32)
        }
    }
}

/// Compute the support point on the Minkowski difference A - B.
fn support_minkowski(
    shape_a: &ConvexShape<'_>,
    pose_a: &Pose,
    shape_b: &ConvexShape<'_>,
    pose_b: &Pose,
    direction: &Vector3<f64>,
) -> MinkowskiPoint {
    let (support_a, index_a) = support(shape_a, pose_a, direction);
    let (support_b, index_b) = support(shape_b, pose_b, &-direction);
    MinkowskiPoint {
        point: support_a - support_b,
        support_a,
        support_b,
        index_a,
        index_b,
    }
}

// =============================================================================
// GJK Algorithm
// =============================================================================

/// Check if two shapes intersect using GJK.
///
/// This is a fast intersection test that returns true if the shapes overlap.
/// For penetration information, use [`gjk_epa_contact`].
#[must_use]
pub fn gjk_intersection(
    shape_a: &ConvexShape<'_>,
    pose_a: &Pose,
    shape_b: &ConvexShape<'_>,
    pose_b: &Pose,
) -> bool {
    gjk_query(shape_a, pose_a, shape_b, pose_b).intersecting
}

/// Run the full GJK algorithm and return detailed results.
///
/// `intersecting` is only set once a tetrahedron encloses the origin, so
/// an intersecting result always carries 4 points.
#[must_use]
pub fn gjk_query(
    shape_a: &ConvexShape<'_>,
    pose_a: &Pose,
    shape_b: &ConvexShape<'_>,
    pose_b: &Pose,
) -> GjkResult {
    let mut direction = (pose_b.position - pose_a.position)
        .try_normalize(GJK_EPSILON)
        .unwrap_or_else(Vector3::x);

    let mut simplex = Simplex::new();
    let first = support_minkowski(shape_a, pose_a, shape_b, pose_b, &direction);
    simplex.push(first);
    direction = -first.point;

    for iteration in 0..GJK_MAX_ITERATIONS {
        if direction.norm_squared() < GJK_EPSILON * GJK_EPSILON {
            // Collapsed search direction.
            return GjkResult {
                intersecting: false,
                simplex,
                iterations: iteration,
            };
        }
        direction = direction.normalize();

        let new_point = support_minkowski(shape_a, pose_a, shape_b, pose_b, &direction);

        // Could not pass the origin: separated.
        if new_point.point.dot(&direction) < 0.0 {
            return GjkResult {
                intersecting: false,
                simplex,
                iterations: iteration,
            };
        }

        simplex.push(new_point);

        if do_simplex(&mut simplex, &mut direction) {
            return GjkResult {
                intersecting: true,
                simplex,
                iterations: iteration,
            };
        }
    }

    GjkResult {
        intersecting: false,
        simplex,
        iterations: GJK_MAX_ITERATIONS,
    }
}

/// Process the simplex and update the search direction.
///
/// Returns true if the origin is enclosed by the simplex (intersection).
fn do_simplex(simplex: &mut Simplex, direction: &mut Vector3<f64>) -> bool {
    match simplex.len() {
        2 => do_simplex_line(simplex, direction),
        3 => do_simplex_triangle(simplex, direction),
        4 => do_simplex_tetrahedron(simplex, direction),
        _ => false,
    }
}

/// Handle line simplex (2 points).
fn do_simplex_line(simplex: &mut Simplex, direction: &mut Vector3<f64>) -> bool {
    let a = simplex.points[0].point;
    let b = simplex.points[1].point;

    let ab = b - a;
    let ao = -a;

    if ab.dot(&ao) > 0.0 {
        *direction = triple_product(&ab, &ao, &ab);
        if direction.norm_squared() < GJK_EPSILON * GJK_EPSILON {
            // Origin on the segment: any perpendicular keeps the search going.
            *direction = any_perpendicular(&ab);
        }
    } else {
        simplex.set(&[simplex.points[0]]);
        *direction = ao;
    }

    false
}

/// Handle triangle simplex (3 points).
fn do_simplex_triangle(simplex: &mut Simplex, direction: &mut Vector3<f64>) -> bool {
    let a = simplex.points[0].point;
    let b = simplex.points[1].point;
    let c = simplex.points[2].point;

    let ab = b - a;
    let ac = c - a;
    let ao = -a;

    let abc = ab.cross(&ac);

    if abc.cross(&ac).dot(&ao) > 0.0 {
        // Outside edge AC
        if ac.dot(&ao) > 0.0 {
            simplex.set(&[simplex.points[0], simplex.points[2]]);
            *direction = triple_product(&ac, &ao, &ac);
        } else {
            simplex_line_case(simplex, direction, &ab, &ao);
        }
    } else if ab.cross(&abc).dot(&ao) > 0.0 {
        // Outside edge AB
        simplex_line_case(simplex, direction, &ab, &ao);
    } else if abc.dot(&ao) > 0.0 {
        *direction = abc;
    } else {
        // Below the triangle: flip winding so the next point lands above.
        simplex.set(&[simplex.points[0], simplex.points[2], simplex.points[1]]);
        *direction = -abc;
    }

    false
}

/// Triangle helper for the AB edge region.
fn simplex_line_case(
    simplex: &mut Simplex,
    direction: &mut Vector3<f64>,
    ab: &Vector3<f64>,
    ao: &Vector3<f64>,
) {
    if ab.dot(ao) > 0.0 {
        simplex.set(&[simplex.points[0], simplex.points[1]]);
        *direction = triple_product(ab, ao, ab);
    } else {
        simplex.set(&[simplex.points[0]]);
        *direction = *ao;
    }
}

/// Handle tetrahedron simplex (4 points).
fn do_simplex_tetrahedron(simplex: &mut Simplex, direction: &mut Vector3<f64>) -> bool {
    let a = simplex.points[0].point;
    let b = simplex.points[1].point;
    let c = simplex.points[2].point;
    let d = simplex.points[3].point;

    let ab = b - a;
    let ac = c - a;
    let ad = d - a;
    let ao = -a;

    let abc = ab.cross(&ac);
    let acd = ac.cross(&ad);
    let adb = ad.cross(&ab);

    if abc.dot(&ao) > 0.0 {
        simplex.set(&[simplex.points[0], simplex.points[1], simplex.points[2]]);
        return do_simplex_triangle(simplex, direction);
    }

    if acd.dot(&ao) > 0.0 {
        simplex.set(&[simplex.points[0], simplex.points[2], simplex.points[3]]);
        return do_simplex_triangle(simplex, direction);
    }

    if adb.dot(&ao) > 0.0 {
        simplex.set(&[simplex.points[0], simplex.points[3], simplex.points[1]]);
        return do_simplex_triangle(simplex, direction);
    }

    true
}

/// Triple product: (A × B) × C = B(A·C) - A(B·C).
#[inline]
fn triple_product(a: &Vector3<f64>, b: &Vector3<f64>, c: &Vector3<f64>) -> Vector3<f64> {
    b * a.dot(c) - a * b.dot(c)
}

/// Some unit vector perpendicular to `v`.
fn any_perpendicular(v: &Vector3<f64>) -> Vector3<f64> {
    let helper = if v.x.abs() < 0.57 {
        Vector3::x()
    } else {
        Vector3::y()
    };
    v.cross(&helper)
        .try_normalize(GJK_EPSILON)
        .unwrap_or_else(Vector3::z)
}

// =============================================================================
// EPA Algorithm
// =============================================================================

/// A face in the EPA polytope.
#[derive(Debug, Clone, Copy, Default)]
struct EpaFace {
    /// Indices of the three vertices forming this face (outward winding).
    vertices: [usize; 3],
    /// Outward-facing unit normal.
    normal: Vector3<f64>,
    /// Distance from origin to the face plane along the normal.
    distance: f64,
}

/// Fixed-capacity polytope.
struct Polytope {
    vertices: [MinkowskiPoint; EPA_MAX_VERTICES],
    vertex_count: usize,
    faces: [EpaFace; EPA_MAX_FACES],
    face_count: usize,
}

impl Polytope {
    fn from_tetrahedron(points: &[MinkowskiPoint]) -> Option<Self> {
        let mut poly = Self {
            vertices: [MinkowskiPoint::default(); EPA_MAX_VERTICES],
            vertex_count: 4,
            faces: [EpaFace::default(); EPA_MAX_FACES],
            face_count: 0,
        };
        poly.vertices[..4].copy_from_slice(points);

        let centroid = points.iter().map(|p| p.point).sum::<Vector3<f64>>() / 4.0;
        for indices in [[0, 1, 2], [0, 2, 3], [0, 3, 1], [1, 3, 2]] {
            let mut face = poly.make_face(indices)?;
            // Orient away from the centroid.
            let to_centroid = centroid - poly.vertices[indices[0]].point;
            if face.normal.dot(&to_centroid) > 0.0 {
                face.normal = -face.normal;
                face.distance = -face.distance;
                face.vertices.swap(1, 2);
            }
            poly.faces[poly.face_count] = face;
            poly.face_count += 1;
        }
        Some(poly)
    }

    fn make_face(&self, indices: [usize; 3]) -> Option<EpaFace> {
        let a = self.vertices[indices[0]].point;
        let b = self.vertices[indices[1]].point;
        let c = self.vertices[indices[2]].point;
        let normal = (b - a).cross(&(c - a)).try_normalize(GJK_EPSILON)?;
        Some(EpaFace {
            vertices: indices,
            normal,
            distance: a.dot(&normal),
        })
    }

    fn closest_face(&self) -> Option<usize> {
        let mut best: Option<usize> = None;
        for i in 0..self.face_count {
            match best {
                Some(b) if self.faces[b].distance <= self.faces[i].distance => {}
                _ => best = Some(i),
            }
        }
        best
    }

    /// Convert a face into an EPA result with barycentric witness points.
    fn result(&self, face: &EpaFace, iterations: usize) -> EpaResult {
        let v = face.vertices.map(|i| self.vertices[i]);
        let projected = face.normal * face.distance;
        let weights = barycentric(&projected, &v[0].point, &v[1].point, &v[2].point);

        let mut witness_a = Vector3::zeros();
        let mut witness_b = Vector3::zeros();
        let mut dominant = 0;
        for k in 0..3 {
            witness_a += v[k].support_a.coords * weights[k];
            witness_b += v[k].support_b.coords * weights[k];
            if weights[k] > weights[dominant] {
                dominant = k;
            }
        }

        EpaResult {
            depth: face.distance,
            normal: face.normal,
            witness_a: Point3::from(witness_a),
            witness_b: Point3::from(witness_b),
            feature: ((v[dominant].index_a & 0xFFFF) << 16) | (v[dominant].index_b & 0xFFFF),
            iterations,
        }
    }
}

/// Barycentric coordinates of `p` projected onto triangle `abc`.
fn barycentric(p: &Vector3<f64>, a: &Vector3<f64>, b: &Vector3<f64>, c: &Vector3<f64>) -> [f64; 3] {
    let v0 = b - a;
    let v1 = c - a;
    let v2 = p - a;
    let d00 = v0.dot(&v0);
    let d01 = v0.dot(&v1);
    let d11 = v1.dot(&v1);
    let d20 = v2.dot(&v0);
    let d21 = v2.dot(&v1);
    let denom = d00 * d11 - d01 * d01;
    if denom.abs() < GJK_EPSILON {
        return [1.0 / 3.0; 3];
    }
    let v = (d11 * d20 - d01 * d21) / denom;
    let w = (d00 * d21 - d01 * d20) / denom;
    [1.0 - v - w, v, w]
}

/// Add an edge to the horizon, cancelling it if its reverse is present.
///
/// Returns false when the edge buffer is full.
fn add_edge(edges: &mut [(usize, usize); EPA_MAX_EDGES], count: &mut usize, a: usize, b: usize) -> bool {
    if let Some(i) = edges[..*count].iter().position(|&(x, y)| x == b && y == a) {
        edges[i] = edges[*count - 1];
        *count -= 1;
        return true;
    }
    if *count >= EPA_MAX_EDGES {
        return false;
    }
    edges[*count] = (a, b);
    *count += 1;
    true
}

/// Run EPA to find penetration depth and contact normal.
///
/// Should only be called with an intersecting GJK simplex of 4 points.
/// Returns `None` for a degenerate (flat) starting tetrahedron.
#[must_use]
pub fn epa_query(
    shape_a: &ConvexShape<'_>,
    pose_a: &Pose,
    shape_b: &ConvexShape<'_>,
    pose_b: &Pose,
    simplex: &Simplex,
) -> Option<EpaResult> {
    if simplex.len() < 4 {
        return None;
    }
    let mut poly = Polytope::from_tetrahedron(simplex.points())?;
    let mut edges = [(0usize, 0usize); EPA_MAX_EDGES];

    for iteration in 0..EPA_MAX_ITERATIONS {
        let closest = poly.faces[poly.closest_face()?];

        let new_point = support_minkowski(shape_a, pose_a, shape_b, pose_b, &closest.normal);
        let new_distance = new_point.point.dot(&closest.normal);
        if new_distance - closest.distance < EPA_TOLERANCE || poly.vertex_count >= EPA_MAX_VERTICES {
            return Some(poly.result(&closest, iteration));
        }

        let new_index = poly.vertex_count;
        poly.vertices[new_index] = new_point;
        poly.vertex_count += 1;

        // Remove every face that can see the new point, keeping the horizon.
        let mut edge_count = 0;
        let mut i = 0;
        while i < poly.face_count {
            let face = poly.faces[i];
            let to_new = new_point.point - poly.vertices[face.vertices[0]].point;
            if face.normal.dot(&to_new) > 0.0 {
                let [v0, v1, v2] = face.vertices;
                let fits = add_edge(&mut edges, &mut edge_count, v0, v1)
                    && add_edge(&mut edges, &mut edge_count, v1, v2)
                    && add_edge(&mut edges, &mut edge_count, v2, v0);
                if !fits {
                    return Some(poly.result(&closest, iteration));
                }
                poly.face_count -= 1;
                poly.faces[i] = poly.faces[poly.face_count];
            } else {
                i += 1;
            }
        }

        if edge_count == 0 || poly.face_count + edge_count > EPA_MAX_FACES {
            return Some(poly.result(&closest, iteration));
        }

        for &(a, b) in &edges[..edge_count] {
            if let Some(face) = poly.make_face([new_index, a, b]) {
                poly.faces[poly.face_count] = face;
                poly.face_count += 1;
            }
        }
    }

    let closest = poly.faces[poly.closest_face()?];
    Some(poly.result(&closest, EPA_MAX_ITERATIONS))
}

// =============================================================================
// High-Level API
// =============================================================================

/// Compute contact information between two shapes using GJK+EPA.
///
/// Returns `None` if the shapes don't intersect or the configuration is
/// degenerate.
#[must_use]
pub fn gjk_epa_contact(
    shape_a: &ConvexShape<'_>,
    pose_a: &Pose,
    shape_b: &ConvexShape<'_>,
    pose_b: &Pose,
) -> Option<GjkContact> {
    let gjk_result = gjk_query(shape_a, pose_a, shape_b, pose_b);
    if !gjk_result.intersecting {
        return None;
    }

    let epa = epa_query(shape_a, pose_a, shape_b, pose_b, &gjk_result.simplex)?;
    if !epa.depth.is_finite() || !epa.normal.iter().all(|c| c.is_finite()) {
        return None;
    }

    Some(GjkContact {
        point: nalgebra::center(&epa.witness_a, &epa.witness_b),
        normal: epa.normal,
        penetration: epa.depth.max(0.0),
        feature: epa.feature,
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::UnitQuaternion;

    fn pose_at(x: f64, y: f64, z: f64) -> Pose {
        Pose::from_position(Point3::new(x, y, z))
    }

    fn cube_hull(h: f64) -> ConvexHull {
        let mut points = Vec::new();
        for &x in &[-h, h] {
            for &y in &[-h, h] {
                for &z in &[-h, h] {
                    points.push(Point3::new(x, y, z));
                }
            }
        }
        ConvexHull::new(&points).unwrap()
    }

    fn unit_box() -> ConvexShape<'static> {
        ConvexShape::Box {
            half_extents: Vector3::new(0.5, 0.5, 0.5),
        }
    }

    #[test]
    fn test_support_sphere() {
        let (p, index) = support(
            &ConvexShape::Sphere { radius: 0.5 },
            &pose_at(1.0, 2.0, 3.0),
            &Vector3::x(),
        );
        assert_relative_eq!(p, Point3::new(1.5, 2.0, 3.0), epsilon = 1e-12);
        assert_eq!(index, 0);
    }

    #[test]
    fn test_support_box_corner_index() {
        let shape = ConvexShape::Box {
            half_extents: Vector3::new(1.0, 2.0, 3.0),
        };
        let (p, index) = support(&shape, &Pose::identity(), &Vector3::new(1.0, -1.0, 1.0));
        assert_eq!(p, Point3::new(1.0, -2.0, 3.0));
        assert_eq!(index, 0b101);
    }

    #[test]
    fn test_support_rotated_capsule() {
        let shape = ConvexShape::Capsule {
            radius: 0.5,
            half_height: 1.0,
        };
        // Rotate local Y onto world X.
        let pose = Pose::from_position_rotation(
            Point3::origin(),
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), -std::f64::consts::FRAC_PI_2),
        );
        let (p, _) = support(&shape, &pose, &Vector3::x());
        assert_relative_eq!(p.x, 1.5, epsilon = 1e-12);
    }

    #[test]
    fn test_gjk_spheres() {
        let sphere = ConvexShape::Sphere { radius: 1.0 };
        assert!(gjk_intersection(&sphere, &pose_at(0.0, 0.0, 0.0), &sphere, &pose_at(1.5, 0.0, 0.0)));
        assert!(!gjk_intersection(&sphere, &pose_at(0.0, 0.0, 0.0), &sphere, &pose_at(3.0, 0.0, 0.0)));
    }

    #[test]
    fn test_gjk_concentric_boxes_intersect() {
        assert!(gjk_intersection(&unit_box(), &Pose::identity(), &unit_box(), &Pose::identity()));
    }

    #[test]
    fn test_epa_box_depth() {
        let contact =
            gjk_epa_contact(&unit_box(), &pose_at(0.0, 0.0, 0.0), &unit_box(), &pose_at(0.0, 0.9, 0.1))
                .unwrap();
        assert_relative_eq!(contact.penetration, 0.1, epsilon = 1e-4);
        assert_relative_eq!(contact.normal, Vector3::y(), epsilon = 1e-4);
        assert!(contact.point.y > 0.3 && contact.point.y < 0.5);
    }

    #[test]
    fn test_epa_sphere_matches_closed_form() {
        let sphere = ConvexShape::Sphere { radius: 1.0 };
        let contact =
            gjk_epa_contact(&sphere, &pose_at(0.0, 0.0, 0.0), &sphere, &pose_at(1.5, 0.0, 0.0))
                .unwrap();
        assert_relative_eq!(contact.penetration, 0.5, epsilon = 0.02);
        assert!(contact.normal.x > 0.99);
    }

    #[test]
    fn test_hull_against_box() {
        let hull = cube_hull(0.5);
        let a = ConvexShape::Hull(&hull);
        let contact = gjk_epa_contact(&a, &pose_at(0.0, 0.0, 0.0), &unit_box(), &pose_at(-0.75, 0.0, 0.0))
            .unwrap();
        assert_relative_eq!(contact.penetration, 0.25, epsilon = 1e-4);
        assert!(contact.normal.x < -0.99);

        assert!(gjk_epa_contact(&a, &pose_at(0.0, 0.0, 0.0), &unit_box(), &pose_at(0.0, 0.0, 1.2)).is_none());
    }

    #[test]
    fn test_resolve_skips_planes() {
        let pool = HullPool::with_capacity(0);
        assert!(ConvexShape::resolve(&CollisionShape::ground_plane(0.0), &pool).is_none());
        assert!(matches!(
            ConvexShape::resolve(&CollisionShape::capsule(0.5, 2.0), &pool),
            Some(ConvexShape::Capsule { half_height, .. }) if half_height == 1.0
        ));
    }

    #[test]
    fn test_simplex_push_order() {
        let mut simplex = Simplex::new();
        assert!(simplex.is_empty());
        for i in 0..5 {
            simplex.push(MinkowskiPoint {
                point: Vector3::new(f64::from(i), 0.0, 0.0),
                ..MinkowskiPoint::default()
            });
        }
        assert_eq!(simplex.len(), 4);
        assert_eq!(simplex.points()[0].point.x, 4.0);
        assert_eq!(simplex.points()[3].point.x, 1.0);
    }
}
