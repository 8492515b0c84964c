// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::hash::{Hash, Hasher};
use std::hint::black_box;

use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use understory_octree::{MergePolicy, Octree, OctreeConfig, Positioned, Region, Vector3};

#[derive(Clone, Debug)]
struct Agent {
    id: u32,
    at: Vector3,
}

impl PartialEq for Agent {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Agent {}

impl Hash for Agent {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Positioned for Agent {
    fn position(&self) -> Vector3 {
        self.at
    }
}

const HALF: f64 = 500.0;

fn world() -> Region {
    Region::cube(Vector3::ZERO, HALF)
}

fn random_point(rng: &mut StdRng) -> Vector3 {
    Vector3::new(
        rng.random_range(-HALF..HALF),
        rng.random_range(-HALF..HALF),
        rng.random_range(-HALF..HALF),
    )
}

fn gen_uniform(n: u32, seed: u64) -> Vec<Agent> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|id| Agent {
            id,
            at: random_point(&mut rng),
        })
        .collect()
}

/// A few dense clusters; stresses deep, uneven subdivision.
fn gen_clustered(n: u32, seed: u64) -> Vec<Agent> {
    let mut rng = StdRng::seed_from_u64(seed);
    let centers: Vec<Vector3> = (0..8)
        .map(|_| random_point(&mut rng).scale(0.8))
        .collect();
    (0..n)
        .map(|id| {
            let c = centers[id as usize % centers.len()];
            let jitter = Vector3::new(
                rng.random_range(-5.0..5.0),
                rng.random_range(-5.0..5.0),
                rng.random_range(-5.0..5.0),
            );
            Agent { id, at: c + jitter }
        })
        .collect()
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("octree_build");
    for &n in &[1_000_u32, 10_000] {
        let uniform = gen_uniform(n, 0xA11C_E5ED);
        let clustered = gen_clustered(n, 0xC1A5_7E55);
        group.throughput(Throughput::Elements(u64::from(n)));
        group.bench_function(BenchmarkId::new("bulk_uniform", n), |b| {
            b.iter(|| Octree::new(world(), black_box(&uniform).iter().cloned()).unwrap());
        });
        group.bench_function(BenchmarkId::new("bulk_clustered", n), |b| {
            b.iter(|| Octree::new(world(), black_box(&clustered).iter().cloned()).unwrap());
        });
        group.bench_function(BenchmarkId::new("incremental_uniform", n), |b| {
            b.iter_batched(
                || Octree::<Agent>::new(world(), []).unwrap(),
                |mut tree| {
                    for a in &uniform {
                        tree.insert(a.clone()).unwrap();
                    }
                    tree
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

/// One simulation tick: every agent takes a small step.
fn bench_relocate_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("octree_relocate_tick");
    for policy in [MergePolicy::Empty, MergePolicy::Compact] {
        let n = 5_000_u32;
        let agents = gen_uniform(n, 7);
        let config = OctreeConfig::default().with_merge_policy(policy);
        let mut rng = StdRng::seed_from_u64(42);
        let steps: Vec<Vector3> = agents
            .iter()
            .map(|a| {
                let step = Vector3::new(
                    rng.random_range(-2.0..2.0),
                    rng.random_range(-2.0..2.0),
                    rng.random_range(-2.0..2.0),
                );
                let to = a.at + step;
                if world().contains(to) { to } else { a.at }
            })
            .collect();
        group.throughput(Throughput::Elements(u64::from(n)));
        group.bench_function(BenchmarkId::new(format!("{policy:?}"), n), |b| {
            b.iter_batched(
                || Octree::with_config(world(), agents.iter().cloned(), config).unwrap(),
                |mut tree| {
                    for (a, to) in agents.iter().zip(&steps) {
                        tree.relocate(a, *to).unwrap();
                    }
                    tree
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_neighbors(c: &mut Criterion) {
    let mut group = c.benchmark_group("octree_neighbors");
    let n = 10_000_u32;
    let agents = gen_uniform(n, 0xBEEF);
    let tree = Octree::new(world(), agents.iter().cloned()).unwrap();
    for &radius in &[5.0_f64, 20.0, 50.0] {
        group.bench_function(BenchmarkId::new("neighbors_of", radius), |b| {
            b.iter(|| {
                let mut total = 0;
                for a in agents.iter().step_by(97) {
                    total += tree.neighbors_of(a, black_box(radius)).unwrap().len();
                }
                total
            });
        });
        group.bench_function(BenchmarkId::new("visit_neighbors", radius), |b| {
            b.iter(|| {
                let mut total = 0;
                for a in agents.iter().step_by(97) {
                    tree.visit_neighbors(a, black_box(radius), 3, |_, _| total += 1)
                        .unwrap();
                }
                total
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_build, bench_relocate_tick, bench_neighbors);
criterion_main!(benches);
