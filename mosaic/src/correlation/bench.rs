//! Benchmark module for NCC scoring.
//! Run with: cargo bench -p mosaic --features bench --bench optimizer

use std::hint::black_box;

use common::Buffer2;
use criterion::{BenchmarkId, Criterion, Throughput};

/// Register correlation benchmarks with Criterion.
pub fn benchmarks(c: &mut Criterion) {
    benchmark_score_offset(c);
}

fn textured(size: usize, phase: f32) -> Buffer2<f32> {
    Buffer2::from_fn(size, size, |x, y| {
        ((x as f32 * 0.37 + phase).sin() + (y as f32 * 0.23).cos()) * 100.0
    })
}

/// Scores a 20% overlap at several tile sizes.
fn benchmark_score_offset(c: &mut Criterion) {
    let mut group = c.benchmark_group("score_offset");

    for size in [128usize, 512, 1024] {
        let neighbor = textured(size, 0.0);
        let tile = textured(size, 0.5);
        let offset = (size as f32 * 0.8) as i32;
        let window = size * (size - offset as usize);

        group.throughput(Throughput::Elements(window as u64));
        group.bench_function(BenchmarkId::new("west_overlap", size), |b| {
            b.iter(|| {
                let score = super::score_offset(black_box(&neighbor), black_box(&tile), offset, 0);
                black_box(score)
            })
        });
    }

    group.finish();
}
