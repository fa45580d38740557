//! Benchmarks for batched kernels against their scalar equivalents.
//!
//! Run with: `cargo bench -p sim-simd`

#![allow(missing_docs, clippy::unwrap_used)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use nalgebra::{Point3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sim_simd::{batch_integrate_positions, find_max_dot, for_each_aabb_overlap};

fn random_vectors(rng: &mut StdRng, n: usize) -> Vec<Vector3<f64>> {
    (0..n)
        .map(|_| {
            Vector3::new(
                rng.gen_range(-10.0..10.0),
                rng.gen_range(-10.0..10.0),
                rng.gen_range(-10.0..10.0),
            )
        })
        .collect()
}

fn bench_find_max_dot(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_max_dot");
    let mut rng = StdRng::seed_from_u64(7);

    for n in [8, 64, 512] {
        let vertices = random_vectors(&mut rng, n);
        let direction = Vector3::new(0.3, -0.5, 0.8);
        group.throughput(Throughput::Elements(n as u64));

        group.bench_with_input(BenchmarkId::new("batch", n), &vertices, |b, v| {
            b.iter(|| find_max_dot(black_box(v), black_box(&direction)));
        });
        group.bench_with_input(BenchmarkId::new("scalar", n), &vertices, |b, v| {
            b.iter(|| {
                black_box(v)
                    .iter()
                    .enumerate()
                    .map(|(i, p)| (i, p.dot(&direction)))
                    .fold((0, f64::NEG_INFINITY), |acc, x| if x.1 > acc.1 { x } else { acc })
            });
        });
    }
    group.finish();
}

fn bench_integrate_positions(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(11);
    let n = 10_000;
    let velocities = random_vectors(&mut rng, n);
    let steps = vec![1.0 / 60.0; n];
    let mut positions = vec![Point3::origin(); n];

    let mut group = c.benchmark_group("integrate_positions");
    group.throughput(Throughput::Elements(n as u64));
    group.bench_function("batch_10k", |b| {
        b.iter(|| batch_integrate_positions(black_box(&mut positions), &velocities, &steps));
    });
    group.finish();
}

fn bench_aabb_scan(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(13);
    let n = 10_000;
    let mins: Vec<Point3<f64>> = random_vectors(&mut rng, n)
        .into_iter()
        .map(|v| Point3::from(v * 10.0))
        .collect();
    let maxs: Vec<Point3<f64>> = mins.iter().map(|p| p + Vector3::new(1.0, 1.0, 1.0)).collect();
    let qmin = Point3::new(-5.0, -5.0, -5.0);
    let qmax = Point3::new(5.0, 5.0, 5.0);

    c.bench_function("aabb_scan_10k", |b| {
        b.iter(|| {
            let mut count = 0usize;
            for_each_aabb_overlap(&mins, &maxs, black_box(&qmin), black_box(&qmax), |_| count += 1);
            count
        });
    });
}

criterion_group!(
    benches,
    bench_find_max_dot,
    bench_integrate_positions,
    bench_aabb_scan
);
criterion_main!(benches);
