//! # Entity Pool Benchmark
//!
//! Targets:
//! - acquire/release churn with no allocation once warm
//! - enumeration served from cache within a tick
//!
//! Run with: `cargo bench --package starfall_core --bench pool_benchmark`

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use starfall_core::{ArchetypeRegistry, EntityPool, SpawnOverrides};
use starfall_shared::Vec3;

/// Warm pool churn: acquire a wave, release it.
fn bench_acquire_release(c: &mut Criterion) {
    let mut group = c.benchmark_group("acquire_release_wave");

    for wave in [8usize, 32, 128] {
        let mut pool = EntityPool::new(ArchetypeRegistry::builtin());
        let scout = pool.registry().id("scout").unwrap_or_else(|| unreachable!());
        let mut ids = Vec::with_capacity(wave);

        group.bench_with_input(BenchmarkId::from_parameter(wave), &wave, |b, &wave| {
            b.iter(|| {
                for i in 0..wave {
                    let at = SpawnOverrides::at(Vec3::new(i as f32, 0.0, 0.0));
                    if let Ok(id) = pool.acquire(scout, at) {
                        ids.push(id);
                    }
                }
                for id in ids.drain(..) {
                    black_box(pool.release(id));
                }
            });
        });
    }

    group.finish();
}

/// Enumeration many times per tick, as targeting does.
fn bench_cached_enumeration(c: &mut Criterion) {
    let mut pool = EntityPool::new(ArchetypeRegistry::builtin());
    for name in ["scout", "armored", "elite", "asteroid"] {
        for _ in 0..16 {
            let _ = pool.acquire_named(name, SpawnOverrides::default());
        }
    }

    let mut now = 0;
    c.bench_function("all_active_entities_x32_per_tick", |b| {
        b.iter(|| {
            now += 16;
            pool.begin_tick(now);
            let mut total = 0;
            for _ in 0..32 {
                total += pool.all_active_entities().len();
            }
            black_box(total)
        });
    });
}

criterion_group!(benches, bench_acquire_release, bench_cached_enumeration);
criterion_main!(benches);
