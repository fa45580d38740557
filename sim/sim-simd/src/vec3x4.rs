//! 4-wide `Vector3` batch type.
//!
//! [`Vec3x4`] stores 4 `Vector3<f64>` values in a structure-of-arrays (`SoA`)
//! layout so that per-lane loops compile to packed instructions on 256-bit
//! registers.

use nalgebra::{Point3, Vector3};

/// A batch of 4 `Vector3<f64>` values stored in `SoA` layout.
///
/// # Memory Layout
///
/// ```text
/// xs: [x0, x1, x2, x3]
/// ys: [y0, y1, y2, y3]
/// zs: [z0, z1, z2, z3]
/// ```
///
/// # Example
///
/// ```
/// use sim_simd::Vec3x4;
/// use nalgebra::Vector3;
///
/// let batch = Vec3x4::from_vectors([
///     Vector3::new(1.0, 2.0, 3.0),
///     Vector3::new(4.0, 5.0, 6.0),
///     Vector3::new(7.0, 8.0, 9.0),
///     Vector3::new(10.0, 11.0, 12.0),
/// ]);
///
/// let norms_sq = batch.norm_squared();
/// assert_eq!(norms_sq[0], 14.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(C, align(32))]
pub struct Vec3x4 {
    /// X components of all 4 vectors.
    pub xs: [f64; 4],
    /// Y components of all 4 vectors.
    pub ys: [f64; 4],
    /// Z components of all 4 vectors.
    pub zs: [f64; 4],
}

impl Default for Vec3x4 {
    fn default() -> Self {
        Self::zeros()
    }
}

impl Vec3x4 {
    /// Create a batch of 4 zero vectors.
    #[must_use]
    #[inline]
    pub const fn zeros() -> Self {
        Self {
            xs: [0.0; 4],
            ys: [0.0; 4],
            zs: [0.0; 4],
        }
    }

    /// Create from 4 individual vectors.
    #[must_use]
    #[inline]
    pub fn from_vectors(vectors: [Vector3<f64>; 4]) -> Self {
        Self {
            xs: [vectors[0].x, vectors[1].x, vectors[2].x, vectors[3].x],
            ys: [vectors[0].y, vectors[1].y, vectors[2].y, vectors[3].y],
            zs: [vectors[0].z, vectors[1].z, vectors[2].z, vectors[3].z],
        }
    }

    /// Create from up to 4 vectors; missing lanes are filled with `pad`.
    #[must_use]
    #[inline]
    pub fn from_slice_padded(vectors: &[Vector3<f64>], pad: Vector3<f64>) -> Self {
        let mut batch = Self::splat(pad);
        for (i, v) in vectors.iter().take(4).enumerate() {
            batch.xs[i] = v.x;
            batch.ys[i] = v.y;
            batch.zs[i] = v.z;
        }
        batch
    }

    /// Create from up to 4 points; missing lanes are filled with `pad`.
    #[must_use]
    #[inline]
    pub fn from_points_padded(points: &[Point3<f64>], pad: f64) -> Self {
        let mut batch = Self::splat(Vector3::new(pad, pad, pad));
        for (i, p) in points.iter().take(4).enumerate() {
            batch.xs[i] = p.x;
            batch.ys[i] = p.y;
            batch.zs[i] = p.z;
        }
        batch
    }

    /// Broadcast one vector into all 4 lanes.
    #[must_use]
    #[inline]
    pub fn splat(v: Vector3<f64>) -> Self {
        Self {
            xs: [v.x; 4],
            ys: [v.y; 4],
            zs: [v.z; 4],
        }
    }

    /// Extract lane `index` (0..4).
    #[must_use]
    #[inline]
    pub fn get(&self, index: usize) -> Vector3<f64> {
        Vector3::new(self.xs[index], self.ys[index], self.zs[index])
    }

    /// Dot product of every lane with one direction.
    #[must_use]
    #[inline]
    pub fn dot(&self, direction: &Vector3<f64>) -> [f64; 4] {
        let mut result = [0.0; 4];
        for i in 0..4 {
            result[i] = self.xs[i] * direction.x + self.ys[i] * direction.y + self.zs[i] * direction.z;
        }
        result
    }

    /// Squared norm of every lane.
    #[must_use]
    #[inline]
    pub fn norm_squared(&self) -> [f64; 4] {
        let mut result = [0.0; 4];
        for i in 0..4 {
            result[i] = self.xs[i] * self.xs[i] + self.ys[i] * self.ys[i] + self.zs[i] * self.zs[i];
        }
        result
    }

    /// `self + other * scales[lane]`, lane by lane.
    #[must_use]
    #[inline]
    pub fn add_scaled(&self, other: &Self, scales: [f64; 4]) -> Self {
        let mut out = *self;
        for i in 0..4 {
            out.xs[i] += other.xs[i] * scales[i];
        }
        for i in 0..4 {
            out.ys[i] += other.ys[i] * scales[i];
        }
        for i in 0..4 {
            out.zs[i] += other.zs[i] * scales[i];
        }
        out
    }

    /// Index and value of the lane with the largest dot product.
    ///
    /// Ties resolve to the lowest lane.
    #[must_use]
    #[inline]
    pub fn argmax_dot(&self, direction: &Vector3<f64>) -> (usize, f64) {
        let dots = self.dot(direction);
        let mut best = 0;
        for i in 1..4 {
            if dots[i] > dots[best] {
                best = i;
            }
        }
        (best, dots[best])
    }
}
