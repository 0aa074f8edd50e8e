//! Benchmark: keyed children reconciliation.
//!
//! Compares:
//! - The longest increasing subsequence pass on its own
//! - Full keyed diffs (reverse, rotate, shuffle) against a `MemoryHost`

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use trellis_core::render::{longest_increasing_subsequence, MemoryHost, Renderer, VNode};

fn list(keys: &[usize]) -> VNode {
    VNode::element("ul")
        .children(
            keys.iter()
                .map(|&k| VNode::element("li").key(k).text(k.to_string()).build())
                .collect(),
        )
        .build()
}

/// Deterministic permutation: multiply by a constant coprime to `n`.
fn shuffled(n: usize) -> Vec<usize> {
    let step = if n % 7 == 0 { 11 } else { 7 };
    (0..n).map(|i| (i * step) % n).collect()
}

fn bench_lis(c: &mut Criterion) {
    let mut group = c.benchmark_group("lis");
    for size in [100usize, 1_000, 10_000] {
        let input: Vec<usize> = shuffled(size).into_iter().map(|v| v + 1).collect();
        group.bench_with_input(BenchmarkId::from_parameter(size), &input, |b, input| {
            b.iter(|| longest_increasing_subsequence(black_box(input)))
        });
    }
    group.finish();
}

fn bench_keyed_diff(c: &mut Criterion) {
    let mut group = c.benchmark_group("keyed_diff");
    for size in [100usize, 1_000] {
        let base: Vec<usize> = (0..size).collect();
        let reversed: Vec<usize> = base.iter().rev().copied().collect();
        let mut rotated = base.clone();
        rotated.rotate_right(1);
        let cases = [("reverse", reversed), ("rotate", rotated), ("shuffle", shuffled(size))];

        for (name, order) in cases {
            group.bench_with_input(BenchmarkId::new(name, size), &order, |b, order| {
                b.iter_batched(
                    || {
                        let renderer = Renderer::new(MemoryHost::new());
                        let root = renderer.with_host(|host| host.create_root());
                        renderer.render(Some(list(&base)), root);
                        (renderer, root, list(order))
                    },
                    |(renderer, root, next)| {
                        renderer.render(Some(next), root);
                        renderer
                    },
                    criterion::BatchSize::SmallInput,
                )
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_lis, bench_keyed_diff);
criterion_main!(benches);
