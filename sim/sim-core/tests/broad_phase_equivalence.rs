//! The spatial hash grid must report exactly the pairs the brute-force
//! reference finds.
//!
//! Run with: cargo test -p sim-core --test broad_phase_equivalence

#![allow(clippy::unwrap_used, clippy::expect_used)]

use nalgebra::{Point3, Vector3};
use proptest::prelude::*;
use sim_core::{BodyFlags, BroadPhase, BroadPhaseConfig, BroadPhaseInput, BruteForce, SpatialHashGrid};

const MAX_PAIRS: usize = 4096;

fn flags_strategy() -> impl Strategy<Value = BodyFlags> {
    prop_oneof![
        6 => Just(BodyFlags::ALIVE),
        1 => Just(BodyFlags::ALIVE | BodyFlags::STATIC),
        1 => Just(BodyFlags::ALIVE | BodyFlags::SLEEPING),
        1 => Just(BodyFlags::empty()),
    ]
}

fn body_strategy() -> impl Strategy<Value = ([f64; 3], [f64; 3], BodyFlags)> {
    (
        prop::array::uniform3(-20.0..20.0f64),
        prop::array::uniform3(0.05..3.0f64),
        flags_strategy(),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn grid_matches_brute_force(
        bodies in prop::collection::vec(body_strategy(), 0..120),
        cell_size in 0.5..4.0f64,
    ) {
        let mut mins = Vec::with_capacity(bodies.len());
        let mut maxs = Vec::with_capacity(bodies.len());
        let mut flags = Vec::with_capacity(bodies.len());
        for (center, half, f) in &bodies {
            let c = Point3::from(*center);
            let h = Vector3::from(*half);
            mins.push(c - h);
            maxs.push(c + h);
            flags.push(*f);
        }
        let input = BroadPhaseInput::new(&mins, &maxs, &flags);

        let config = BroadPhaseConfig::default().with_cell_size(cell_size);
        let mut grid = SpatialHashGrid::new(&config, bodies.len(), MAX_PAIRS);
        let mut brute = BruteForce::new(MAX_PAIRS);

        let mut grid_pairs = Vec::with_capacity(MAX_PAIRS);
        let mut brute_pairs = Vec::with_capacity(MAX_PAIRS);
        let grid_dropped = grid.find_pairs(&input, &mut grid_pairs);
        let brute_dropped = brute.find_pairs(&input, &mut brute_pairs);

        prop_assert_eq!(grid_dropped, 0);
        prop_assert_eq!(brute_dropped, 0);
        prop_assert_eq!(grid_pairs, brute_pairs);
    }
}

#[test]
fn ground_plane_sized_body_pairs_with_everything_above_it() {
    let mut mins = vec![Point3::new(-1e6, -1.0, -1e6)];
    let mut maxs = vec![Point3::new(1e6, 0.0, 1e6)];
    let mut flags = vec![BodyFlags::ALIVE | BodyFlags::STATIC];
    for i in 0..10_i32 {
        let c = Point3::new(f64::from(i) * 3.0, 0.4, 0.0);
        mins.push(c - Vector3::repeat(0.5));
        maxs.push(c + Vector3::repeat(0.5));
        flags.push(BodyFlags::ALIVE);
    }
    let input = BroadPhaseInput::new(&mins, &maxs, &flags);

    let mut grid = SpatialHashGrid::new(&BroadPhaseConfig::default(), mins.len(), MAX_PAIRS);
    let mut pairs = Vec::new();
    assert_eq!(grid.find_pairs(&input, &mut pairs), 0);
    assert_eq!(pairs.len(), 10);
    assert!(pairs.iter().all(|p| p.a == 0));
    assert_eq!(grid.oversized_count(), 1);
}
