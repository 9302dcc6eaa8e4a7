//! Benchmark module for the overlap MLE.
//! Run with: cargo bench -p mosaic --features bench --bench optimizer

use std::hint::black_box;

use common::CancelToken;
use criterion::{BenchmarkId, Criterion};

use super::{hill_climb, log_likelihood, LikelihoodCache, MleSearch, MleStrategy};

/// Register MLE benchmarks with Criterion.
pub fn benchmarks(c: &mut Criterion) {
    benchmark_likelihood(c);
    benchmark_search(c);
}

/// Tight cluster near 80% with a few uniform outliers.
fn samples(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| {
            if i % 10 == 0 {
                (i * 37 % 100) as f64
            } else {
                80.0 + ((i % 5) as f64 - 2.0) * 0.5
            }
        })
        .collect()
}

fn benchmark_likelihood(c: &mut Criterion) {
    let mut group = c.benchmark_group("mle_likelihood");
    for n in [50usize, 500, 5000] {
        let data = samples(n);
        group.bench_function(BenchmarkId::new("log_likelihood", n), |b| {
            b.iter(|| black_box(log_likelihood(black_box(&data), 10, 80, 2)))
        });
        group.bench_function(BenchmarkId::new("hill_climb_cold", n), |b| {
            b.iter(|| {
                let cache = LikelihoodCache::new();
                black_box(hill_climb(&data, &cache, (50, 50, 50)))
            })
        });
    }
    group.finish();
}

fn benchmark_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("mle_search");
    group.sample_size(10);
    let data = samples(500);
    let cancel = CancelToken::new();
    for (label, strategy) in [
        ("sequential", MleStrategy::Sequential),
        ("parallel_4", MleStrategy::Parallel { workers: 4 }),
    ] {
        group.bench_function(label, |b| {
            b.iter(|| {
                let search = MleSearch::new(strategy, 42, &cancel);
                black_box(search.execute(&data))
            })
        });
    }
    group.finish();
}
