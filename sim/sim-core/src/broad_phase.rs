//! Broad-phase collision detection using a uniform spatial hash grid.
//!
//! The broad phase reduces the O(n²) all-pairs problem to the set of pairs
//! whose bounding boxes overlap. It may report false positives (the narrow
//! phase filters them) but never misses an overlapping pair.
//!
//! # Algorithm
//!
//! [`SpatialHashGrid`] rebuilds its table from scratch every step:
//! 1. Every live body hashes each grid cell its AABB covers and appends a
//!    packed `(hash << 32) | index` entry to a flat buffer
//! 2. The buffer is sorted, so entries sharing a hash form contiguous runs
//! 3. Each run is scanned for AABB-overlapping pairs; a pair is emitted only
//!    from the cell holding the minimum corner of the two boxes'
//!    intersection, so a pair straddling many shared cells is reported once
//! 4. Bodies covering too many cells (ground planes, huge boxes) skip the
//!    grid and are tested against everyone
//!
//! Clustering many bodies in one cell degrades to O(k²) within that cell.
//!
//! [`BruteForce`] implements the same [`BroadPhase`] trait with a plain
//! double loop; it is the reference the grid is tested against.
//!
//! # Example
//!
//! ```
//! use sim_core::broad_phase::{BroadPhase, BroadPhaseInput, BroadPhasePair, SpatialHashGrid};
//! use sim_types::{BodyFlags, BroadPhaseConfig};
//! use nalgebra::Point3;
//!
//! let mins = [Point3::new(0.0, 0.0, 0.0), Point3::new(0.5, 0.5, 0.5)];
//! let maxs = [Point3::new(1.0, 1.0, 1.0), Point3::new(1.5, 1.5, 1.5)];
//! let flags = [BodyFlags::ALIVE, BodyFlags::ALIVE];
//!
//! let mut grid = SpatialHashGrid::new(&BroadPhaseConfig::default(), 2, 16);
//! let mut pairs = Vec::with_capacity(16);
//! let dropped = grid.find_pairs(&BroadPhaseInput::new(&mins, &maxs, &flags), &mut pairs);
//!
//! assert_eq!(dropped, 0);
//! assert_eq!(pairs, vec![BroadPhasePair::new(0, 1)]);
//! ```

use nalgebra::{Point3, Vector3};
use sim_types::{BodyFlags, BroadPhaseAlgorithm, BroadPhaseConfig};

/// An axis-aligned bounding box (AABB) for broad-phase collision detection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum corner of the bounding box.
    pub min: Point3<f64>,
    /// Maximum corner of the bounding box.
    pub max: Point3<f64>,
}

impl Aabb {
    /// Create a new AABB from minimum and maximum corners.
    #[must_use]
    pub const fn new(min: Point3<f64>, max: Point3<f64>) -> Self {
        Self { min, max }
    }

    /// Create an AABB centered at a point with the given half-extents.
    #[must_use]
    pub fn from_center(center: Point3<f64>, half_extents: Vector3<f64>) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    /// An inverted box that [`grow`](Self::grow) turns into a bound.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            min: Point3::from(Vector3::repeat(f64::INFINITY)),
            max: Point3::from(Vector3::repeat(f64::NEG_INFINITY)),
        }
    }

    /// Extend the box to include a point.
    pub fn grow(&mut self, point: &Point3<f64>) {
        self.min = Point3::from(self.min.coords.inf(&point.coords));
        self.max = Point3::from(self.max.coords.sup(&point.coords));
    }

    /// Check if this AABB overlaps with another AABB.
    ///
    /// Touching boxes overlap.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Expand this AABB by a margin on all sides.
    #[must_use]
    pub fn expanded(&self, margin: f64) -> Self {
        let m = Vector3::repeat(margin);
        Self {
            min: self.min - m,
            max: self.max + m,
        }
    }

    /// Center point.
    #[must_use]
    pub fn center(&self) -> Point3<f64> {
        nalgebra::center(&self.min, &self.max)
    }

    /// Half-size along each axis.
    #[must_use]
    pub fn half_extents(&self) -> Vector3<f64> {
        (self.max - self.min) * 0.5
    }

    /// Whether both corners are finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.min.iter().chain(self.max.iter()).all(|c| c.is_finite())
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::new(Point3::origin(), Point3::origin())
    }
}

/// Candidate pair of body slot indices, always `a < b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BroadPhasePair {
    /// Lower slot index.
    pub a: u32,
    /// Higher slot index.
    pub b: u32,
}

impl BroadPhasePair {
    /// Create a canonical pair from two distinct indices in any order.
    #[must_use]
    pub fn new(i: u32, j: u32) -> Self {
        Self {
            a: i.min(j),
            b: i.max(j),
        }
    }
}

/// Column views of the body store that the broad phase reads.
#[derive(Debug, Clone, Copy)]
pub struct BroadPhaseInput<'a> {
    mins: &'a [Point3<f64>],
    maxs: &'a [Point3<f64>],
    flags: &'a [BodyFlags],
}

impl<'a> BroadPhaseInput<'a> {
    /// Bundle AABB corner and flag columns; extra entries in a longer slice
    /// are ignored.
    #[must_use]
    pub fn new(mins: &'a [Point3<f64>], maxs: &'a [Point3<f64>], flags: &'a [BodyFlags]) -> Self {
        let n = mins.len().min(maxs.len()).min(flags.len());
        Self {
            mins: &mins[..n],
            maxs: &maxs[..n],
            flags: &flags[..n],
        }
    }

    /// Number of body slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mins.len()
    }

    /// Whether there are no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mins.is_empty()
    }

    #[inline]
    fn aabb(&self, i: usize) -> Aabb {
        Aabb::new(self.mins[i], self.maxs[i])
    }

    #[inline]
    fn is_candidate(&self, i: usize) -> bool {
        self.flags[i].contains(BodyFlags::ALIVE) && self.aabb(i).is_finite()
    }

    /// At least one side must be able to move.
    #[inline]
    fn worth_testing(&self, i: usize, j: usize) -> bool {
        self.flags[i].is_awake_dynamic() || self.flags[j].is_awake_dynamic()
    }

    #[inline]
    fn overlap(&self, i: usize, j: usize) -> bool {
        self.aabb(i).overlaps(&self.aabb(j))
    }
}

/// Trait for broad-phase collision detection algorithms.
pub trait BroadPhase: std::fmt::Debug + Send {
    /// Replace `pairs` with every candidate pair, sorted and deduplicated.
    ///
    /// Pairs where neither body is awake and dynamic are skipped. Returns
    /// the number of pairs dropped because the pair buffer was full.
    fn find_pairs(&mut self, input: &BroadPhaseInput<'_>, pairs: &mut Vec<BroadPhasePair>)
        -> usize;

    /// Which algorithm this is.
    fn algorithm(&self) -> BroadPhaseAlgorithm;
}

/// Build the configured broad phase with buffers sized for the world.
#[must_use]
pub fn create_broad_phase(
    config: &BroadPhaseConfig,
    max_bodies: usize,
    max_pairs: usize,
) -> Box<dyn BroadPhase> {
    match config.algorithm {
        BroadPhaseAlgorithm::SpatialHash => {
            Box::new(SpatialHashGrid::new(config, max_bodies, max_pairs))
        }
        BroadPhaseAlgorithm::BruteForce => Box::new(BruteForce::new(max_pairs)),
    }
}

/// Push a pair unless the buffer is at capacity; returns whether it fit.
#[inline]
fn push_pair(pairs: &mut Vec<BroadPhasePair>, max_pairs: usize, a: usize, b: usize) -> bool {
    if pairs.len() >= max_pairs {
        return false;
    }
    pairs.push(BroadPhasePair::new(a as u32, b as u32));
    true
}

// =============================================================================
// Spatial Hash Grid
// =============================================================================

/// Prime multipliers of the cell hash.
const HASH_PRIMES: [u32; 3] = [73_856_093, 19_349_663, 83_492_791];

/// Expected cells per body when sizing the entry buffer.
const ENTRIES_PER_BODY: usize = 8;

/// Hash a grid cell: `(x·p1) ^ (y·p2) ^ (z·p3)` with wrapping arithmetic.
#[must_use]
#[inline]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn hash_cell(cell: [i64; 3]) -> u32 {
    (cell[0] as u32).wrapping_mul(HASH_PRIMES[0])
        ^ (cell[1] as u32).wrapping_mul(HASH_PRIMES[1])
        ^ (cell[2] as u32).wrapping_mul(HASH_PRIMES[2])
}

/// Uniform spatial hash grid rebuilt from current AABBs every step.
#[derive(Debug, Clone)]
pub struct SpatialHashGrid {
    /// Edge length of a grid cell.
    cell_size: f64,
    /// Reciprocal of `cell_size`.
    inv_cell_size: f64,
    /// Bodies covering more cells than this are tested against everyone.
    max_cells_per_body: u64,
    /// Packed `(hash << 32) | index` entries.
    entries: Vec<u64>,
    /// Entry buffer capacity.
    max_entries: usize,
    /// Bodies that skipped the grid, ascending.
    oversized: Vec<u32>,
    /// Per-slot membership in `oversized`.
    oversized_mask: Vec<bool>,
    /// Pair buffer capacity.
    max_pairs: usize,
}

impl SpatialHashGrid {
    /// Create a grid with buffers for `max_bodies` and `max_pairs`.
    #[must_use]
    pub fn new(config: &BroadPhaseConfig, max_bodies: usize, max_pairs: usize) -> Self {
        let max_entries = max_bodies.saturating_mul(ENTRIES_PER_BODY);
        Self {
            cell_size: config.cell_size,
            inv_cell_size: 1.0 / config.cell_size,
            max_cells_per_body: config.max_cells_per_body as u64,
            entries: Vec::with_capacity(max_entries),
            max_entries,
            oversized: Vec::with_capacity(max_bodies),
            oversized_mask: Vec::with_capacity(max_bodies),
            max_pairs,
        }
    }

    /// Edge length of a grid cell.
    #[must_use]
    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Integer coordinates of the cell containing a point.
    #[must_use]
    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    pub fn cell_of(&self, p: &Point3<f64>) -> [i64; 3] {
        [
            (p.x * self.inv_cell_size).floor() as i64,
            (p.y * self.inv_cell_size).floor() as i64,
            (p.z * self.inv_cell_size).floor() as i64,
        ]
    }

    /// Number of entries written by the last rebuild.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Number of bodies that skipped the grid in the last rebuild.
    #[must_use]
    pub fn oversized_count(&self) -> usize {
        self.oversized.len()
    }

    fn rebuild(&mut self, input: &BroadPhaseInput<'_>) {
        self.entries.clear();
        self.oversized.clear();
        self.oversized_mask.clear();
        self.oversized_mask.resize(input.len(), false);

        for i in 0..input.len() {
            if !input.is_candidate(i) {
                continue;
            }
            let lo = self.cell_of(&input.mins[i]);
            let hi = self.cell_of(&input.maxs[i]);
            let cells = (0..3).fold(1u64, |acc, k| {
                acc.saturating_mul(hi[k].abs_diff(lo[k]).saturating_add(1))
            });

            let fits = self.entries.len() as u64 + cells <= self.max_entries as u64;
            if cells > self.max_cells_per_body || !fits {
                self.oversized.push(i as u32);
                self.oversized_mask[i] = true;
                continue;
            }

            for x in lo[0]..=hi[0] {
                for y in lo[1]..=hi[1] {
                    for z in lo[2]..=hi[2] {
                        let hash = u64::from(hash_cell([x, y, z]));
                        self.entries.push((hash << 32) | i as u64);
                    }
                }
            }
        }

        self.entries.sort_unstable();
    }

    /// Hash of the cell that owns the overlap of two boxes.
    #[inline]
    fn owner_hash(&self, input: &BroadPhaseInput<'_>, a: usize, b: usize) -> u32 {
        let corner = Point3::from(input.mins[a].coords.sup(&input.mins[b].coords));
        hash_cell(self.cell_of(&corner))
    }
}

impl BroadPhase for SpatialHashGrid {
    #[allow(clippy::cast_possible_truncation)]
    fn find_pairs(
        &mut self,
        input: &BroadPhaseInput<'_>,
        pairs: &mut Vec<BroadPhasePair>,
    ) -> usize {
        pairs.clear();
        self.rebuild(input);

        let mut dropped = 0;
        let n = self.entries.len();
        let mut start = 0;
        while start < n {
            let hash = (self.entries[start] >> 32) as u32;
            let mut end = start + 1;
            while end < n && (self.entries[end] >> 32) as u32 == hash {
                end += 1;
            }

            for i in start..end {
                let a = (self.entries[i] & 0xFFFF_FFFF) as usize;
                for j in (i + 1)..end {
                    let b = (self.entries[j] & 0xFFFF_FFFF) as usize;
                    if a == b
                        || !input.worth_testing(a, b)
                        || !input.overlap(a, b)
                        || self.owner_hash(input, a, b) != hash
                    {
                        continue;
                    }
                    if !push_pair(pairs, self.max_pairs, a, b) {
                        dropped += 1;
                    }
                }
            }
            start = end;
        }

        for (k, &o) in self.oversized.iter().enumerate() {
            let o = o as usize;
            for i in 0..input.len() {
                if i == o || self.oversized_mask[i] || !input.is_candidate(i) {
                    continue;
                }
                if input.worth_testing(o, i)
                    && input.overlap(o, i)
                    && !push_pair(pairs, self.max_pairs, o, i)
                {
                    dropped += 1;
                }
            }
            for &other in &self.oversized[k + 1..] {
                let other = other as usize;
                if input.worth_testing(o, other)
                    && input.overlap(o, other)
                    && !push_pair(pairs, self.max_pairs, o, other)
                {
                    dropped += 1;
                }
            }
        }

        pairs.sort_unstable();
        pairs.dedup();
        dropped
    }

    fn algorithm(&self) -> BroadPhaseAlgorithm {
        BroadPhaseAlgorithm::SpatialHash
    }
}

// =============================================================================
// Brute Force
// =============================================================================

/// O(n²) reference broad phase.
#[derive(Debug, Clone)]
pub struct BruteForce {
    max_pairs: usize,
}

impl BruteForce {
    /// Create with a pair buffer capacity.
    #[must_use]
    pub fn new(max_pairs: usize) -> Self {
        Self { max_pairs }
    }
}

impl BroadPhase for BruteForce {
    fn find_pairs(
        &mut self,
        input: &BroadPhaseInput<'_>,
        pairs: &mut Vec<BroadPhasePair>,
    ) -> usize {
        pairs.clear();
        let mut dropped = 0;
        for a in 0..input.len() {
            if !input.is_candidate(a) {
                continue;
            }
            for b in (a + 1)..input.len() {
                if input.is_candidate(b)
                    && input.worth_testing(a, b)
                    && input.overlap(a, b)
                    && !push_pair(pairs, self.max_pairs, a, b)
                {
                    dropped += 1;
                }
            }
        }
        dropped
    }

    fn algorithm(&self) -> BroadPhaseAlgorithm {
        BroadPhaseAlgorithm::BruteForce
    }
}

// =============================================================================
// Tests
// =============================================================================
