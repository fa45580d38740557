//! Benchmarks for the collision pipeline and full steps.
//!
//! Run with: cargo bench -p sim-core
//!
//! Frame budgets (60 Hz):
//! - broad phase < 1 ms at 10k bodies
//! - solver < 8 ms at 1k bodies
//! - full step < 16.7 ms

#![allow(missing_docs, clippy::expect_used)]

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use nalgebra::{Point3, UnitQuaternion, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use sim_core::{
    BroadPhase, BroadPhaseConfig, BroadPhaseInput, BroadPhasePair, BodyFlags, CollisionShape,
    ContactManifold, Pose, SpatialHashGrid, World, WorldConfig, collide, create_sphere,
};

/// Random unit-ish AABBs scattered through a cube of side `extent`.
fn random_aabbs(
    count: usize,
    extent: f64,
    seed: u64,
) -> (Vec<Point3<f64>>, Vec<Point3<f64>>, Vec<BodyFlags>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut mins = Vec::with_capacity(count);
    let mut maxs = Vec::with_capacity(count);
    for _ in 0..count {
        let c = Point3::new(
            rng.gen_range(0.0..extent),
            rng.gen_range(0.0..extent),
            rng.gen_range(0.0..extent),
        );
        let h = Vector3::repeat(rng.gen_range(0.25..0.75));
        mins.push(c - h);
        maxs.push(c + h);
    }
    (mins, maxs, vec![BodyFlags::ALIVE; count])
}

/// Broad phase over scattered bodies, grid against the 10k target.
fn bench_broad_phase(c: &mut Criterion) {
    let mut group = c.benchmark_group("broad_phase");

    for count in [1_000, 10_000] {
        // Keep density constant: ~1 body per 8 m³.
        let extent = (count as f64 * 8.0).cbrt();
        let (mins, maxs, flags) = random_aabbs(count, extent, 7);
        let config = BroadPhaseConfig::default();
        let mut grid = SpatialHashGrid::new(&config, count, count * 10);
        let mut pairs: Vec<BroadPhasePair> = Vec::with_capacity(count * 10);

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(
            BenchmarkId::new("spatial_hash", format!("{count}_bodies")),
            &count,
            |b, _| {
                b.iter(|| {
                    let input = BroadPhaseInput::new(&mins, &maxs, &flags);
                    black_box(grid.find_pairs(&input, &mut pairs));
                });
            },
        );
    }

    group.finish();
}

/// Closed-form pair tests at a rotated, overlapping pose.
fn bench_narrow_phase(c: &mut Criterion) {
    let mut group = c.benchmark_group("narrow_phase");
    let hulls = sim_core::HullPool::with_capacity(0);
    let mut manifold = ContactManifold::default();

    let pose_a = Pose::identity();
    let pose_b = Pose::from_position_rotation(
        Point3::new(0.0, 0.9, 0.1),
        UnitQuaternion::from_euler_angles(0.2, 0.4, 0.0),
    );

    let cases = [
        ("sphere_sphere", create_sphere(0.5), create_sphere(0.5)),
        (
            "box_box",
            CollisionShape::cuboid(Vector3::new(0.5, 0.5, 0.5)),
            CollisionShape::cuboid(Vector3::new(0.5, 0.5, 0.5)),
        ),
        (
            "capsule_box",
            CollisionShape::capsule(0.3, 1.0),
            CollisionShape::cuboid(Vector3::new(0.5, 0.5, 0.5)),
        ),
    ];

    for (name, a, b) in cases {
        group.bench_function(name, |bench| {
            bench.iter(|| {
                black_box(collide(&a, &pose_a, &b, &pose_b, &hulls, &mut manifold));
            });
        });
    }

    group.finish();
}

/// A pile of spheres falling onto a ground plane.
fn sphere_pile(count: usize) -> World {
    let config = WorldConfig::realtime().with_max_bodies(count + 1);
    let mut world = World::new(config).expect("valid config");
    let ground = world.create_body(Point3::origin(), UnitQuaternion::identity());
    let _ = world.set_body_shape(ground, CollisionShape::ground_plane(0.0));

    let mut rng = StdRng::seed_from_u64(42);
    let side = (count as f64).sqrt().ceil() as usize;
    for i in 0..count {
        let x = (i % side) as f64 * 1.1;
        let z = (i / side) as f64 * 1.1;
        let y = 0.5 + rng.gen_range(0.0..4.0);
        world.create_body(Point3::new(x, y, z), UnitQuaternion::identity());
    }
    world
}

/// Full steps at 1k bodies, once mid-fall and once with contacts settled.
fn bench_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("step");
    group.sample_size(20);

    for count in [100, 1_000] {
        let mut falling = sphere_pile(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_function(BenchmarkId::new("falling", count), |b| {
            b.iter(|| falling.step());
        });

        let mut resting = sphere_pile(count);
        for _ in 0..180 {
            resting.step();
        }
        group.bench_function(BenchmarkId::new("resting", count), |b| {
            b.iter(|| resting.step());
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_broad_phase,
    bench_narrow_phase,
    bench_step
);
criterion_main!(benches);
