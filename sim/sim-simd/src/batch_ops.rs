//! Batch operations for the engine's hot paths.
//!
//! Every function walks its input in 4-lane chunks through [`Vec3x4`] or
//! [`Aabb4`] and finishes a short tail with the same lane code, so results
//! match the scalar formulas exactly.

use nalgebra::{Point3, Vector3};

use crate::Vec3x4;

// =============================================================================
// Dot Products and Support Search
// =============================================================================

/// Compute 4 dot products of vectors with a single direction.
///
/// # Example
///
/// ```
/// use sim_simd::batch_dot_product_4;
/// use nalgebra::Vector3;
///
/// let vertices = [
///     Vector3::new(1.0, 0.0, 0.0),
///     Vector3::new(0.0, 1.0, 0.0),
///     Vector3::new(0.0, 0.0, 1.0),
///     Vector3::new(1.0, 1.0, 1.0),
/// ];
/// let direction = Vector3::new(1.0, 0.0, 0.0);
///
/// let dots = batch_dot_product_4(&vertices, &direction);
/// assert_eq!(dots, [1.0, 0.0, 0.0, 1.0]);
/// ```
#[must_use]
#[inline]
pub fn batch_dot_product_4(vectors: &[Vector3<f64>; 4], direction: &Vector3<f64>) -> [f64; 4] {
    Vec3x4::from_vectors(*vectors).dot(direction)
}

/// Find the index and value of the maximum dot product in a slice.
///
/// This is the support-vertex search for convex hulls. Ties resolve to the
/// lowest index so the result is deterministic.
///
/// # Example
///
/// ```
/// use sim_simd::find_max_dot;
/// use nalgebra::Vector3;
///
/// let vertices = vec![
///     Vector3::new(1.0, 0.0, 0.0),
///     Vector3::new(0.0, 2.0, 0.0),
///     Vector3::new(0.0, 0.0, 3.0),
/// ];
/// let (idx, dot) = find_max_dot(&vertices, &Vector3::new(0.0, 1.0, 0.0));
/// assert_eq!(idx, 1);
/// assert_eq!(dot, 2.0);
/// ```
#[must_use]
pub fn find_max_dot(vectors: &[Vector3<f64>], direction: &Vector3<f64>) -> (usize, f64) {
    let mut best_idx = 0;
    let mut best_val = f64::NEG_INFINITY;

    for (chunk_idx, chunk) in vectors.chunks(4).enumerate() {
        // Padding lanes repeat the chunk's first vector, which never beats it.
        let batch = Vec3x4::from_slice_padded(chunk, chunk[0]);
        let (lane, value) = batch.argmax_dot(direction);
        if value > best_val {
            best_val = value;
            best_idx = chunk_idx * 4 + lane;
        }
    }

    (best_idx, best_val)
}

// =============================================================================
// AABB Operations
// =============================================================================

/// Four axis-aligned bounding boxes in `SoA` layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb4 {
    /// Minimum corners.
    pub mins: Vec3x4,
    /// Maximum corners.
    pub maxs: Vec3x4,
}

impl Aabb4 {
    /// Build from up to 4 boxes given as corner slices of equal length.
    ///
    /// Missing lanes are inverted (min = +inf, max = -inf) and never overlap.
    #[must_use]
    #[inline]
    pub fn from_corners(mins: &[Point3<f64>], maxs: &[Point3<f64>]) -> Self {
        Self {
            mins: Vec3x4::from_points_padded(mins, f64::INFINITY),
            maxs: Vec3x4::from_points_padded(maxs, f64::NEG_INFINITY),
        }
    }

    /// Test if 4 AABBs overlap with a single AABB (touching counts).
    #[must_use]
    pub fn overlaps_single(&self, query_min: &Point3<f64>, query_max: &Point3<f64>) -> [bool; 4] {
        let mut result = [true; 4];

        for i in 0..4 {
            result[i] =
                result[i] && self.mins.xs[i] <= query_max.x && self.maxs.xs[i] >= query_min.x;
        }
        for i in 0..4 {
            result[i] =
                result[i] && self.mins.ys[i] <= query_max.y && self.maxs.ys[i] >= query_min.y;
        }
        for i in 0..4 {
            result[i] =
                result[i] && self.mins.zs[i] <= query_max.z && self.maxs.zs[i] >= query_min.z;
        }

        result
    }
}

/// Call `f(i)` for every box `i` in `mins`/`maxs` overlapping the query box,
/// in ascending index order.
///
/// `mins` and `maxs` must have the same length; extra entries in the longer
/// slice are ignored.
///
/// # Example
///
/// ```
/// use sim_simd::for_each_aabb_overlap;
/// use nalgebra::Point3;
///
/// let mins = [Point3::new(0.0, 0.0, 0.0), Point3::new(5.0, 5.0, 5.0)];
/// let maxs = [Point3::new(1.0, 1.0, 1.0), Point3::new(6.0, 6.0, 6.0)];
/// let mut hits = Vec::new();
/// for_each_aabb_overlap(&mins, &maxs, &Point3::new(0.5, 0.5, 0.5), &Point3::new(2.0, 2.0, 2.0), |i| hits.push(i));
/// assert_eq!(hits, vec![0]);
/// ```
pub fn for_each_aabb_overlap(
    mins: &[Point3<f64>],
    maxs: &[Point3<f64>],
    query_min: &Point3<f64>,
    query_max: &Point3<f64>,
    mut f: impl FnMut(usize),
) {
    let n = mins.len().min(maxs.len());
    for (chunk_idx, (min_chunk, max_chunk)) in mins[..n]
        .chunks(4)
        .zip(maxs[..n].chunks(4))
        .enumerate()
    {
        let hits = Aabb4::from_corners(min_chunk, max_chunk).overlaps_single(query_min, query_max);
        for (lane, hit) in hits.iter().enumerate() {
            if *hit {
                f(chunk_idx * 4 + lane);
            }
        }
    }
}

// =============================================================================
// Integration Operations
// =============================================================================

/// `ys[i] += xs[i] * scales[i]` over whole slices.
///
/// A zero scale leaves its entry untouched (even if `xs[i]` is not finite),
/// which is how callers mask out static or sleeping bodies. Processes
/// `min(len)` of the three slices.
pub fn batch_add_scaled(ys: &mut [Vector3<f64>], xs: &[Vector3<f64>], scales: &[f64]) {
    let n = ys.len().min(xs.len()).min(scales.len());
    for ((y_chunk, x_chunk), s_chunk) in ys[..n]
        .chunks_mut(4)
        .zip(xs[..n].chunks(4))
        .zip(scales[..n].chunks(4))
    {
        let mut lanes = [0.0; 4];
        lanes[..s_chunk.len()].copy_from_slice(s_chunk);
        let y = Vec3x4::from_slice_padded(y_chunk, Vector3::zeros());
        let x = Vec3x4::from_slice_padded(x_chunk, Vector3::zeros());
        let out = y.add_scaled(&x, lanes);
        for (i, y) in y_chunk.iter_mut().enumerate() {
            if lanes[i] != 0.0 {
                *y = out.get(i);
            }
        }
    }
}

/// `ys[i] += v * scales[i]` for one shared vector (e.g. gravity).
pub fn batch_add_splat_scaled(ys: &mut [Vector3<f64>], v: &Vector3<f64>, scales: &[f64]) {
    let n = ys.len().min(scales.len());
    let splat = Vec3x4::splat(*v);
    for (y_chunk, s_chunk) in ys[..n].chunks_mut(4).zip(scales[..n].chunks(4)) {
        let mut lanes = [0.0; 4];
        lanes[..s_chunk.len()].copy_from_slice(s_chunk);
        let y = Vec3x4::from_slice_padded(y_chunk, Vector3::zeros());
        let out = y.add_scaled(&splat, lanes);
        for (i, y) in y_chunk.iter_mut().enumerate() {
            if lanes[i] != 0.0 {
                *y = out.get(i);
            }
        }
    }
}

/// Semi-implicit position update: `positions[i] += velocities[i] * steps[i]`.
///
/// `steps[i]` is the timestep for body `i`, or zero to leave it in place.
pub fn batch_integrate_positions(
    positions: &mut [Point3<f64>],
    velocities: &[Vector3<f64>],
    steps: &[f64],
) {
    let n = positions.len().min(velocities.len()).min(steps.len());
    for ((p_chunk, v_chunk), s_chunk) in positions[..n]
        .chunks_mut(4)
        .zip(velocities[..n].chunks(4))
        .zip(steps[..n].chunks(4))
    {
        let mut lanes = [0.0; 4];
        lanes[..s_chunk.len()].copy_from_slice(s_chunk);
        let p = Vec3x4::from_points_padded(p_chunk, 0.0);
        let v = Vec3x4::from_slice_padded(v_chunk, Vector3::zeros());
        let out = p.add_scaled(&v, lanes);
        for (i, p) in p_chunk.iter_mut().enumerate() {
            if lanes[i] != 0.0 {
                *p = Point3::from(out.get(i));
            }
        }
    }
}
