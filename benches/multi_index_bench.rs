//! Cursor stepping benchmarks for strided-bins
//!
//! Compares per-element `increment` against inner-run driving for dense and
//! binned operand sets.
//!
//! Run with: cargo bench --bench multi_index_bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::time::Duration;
use strided_bins::{
    for_each_inner_block, indices_from_sizes, BinParams, Dim, Dimensions, IndexPair, MultiIndex,
    ViewParams,
};

/// Sum a transposed dense operand element by element and run by run.
fn bench_dense_transposed(c: &mut Criterion) {
    let mut group = c.benchmark_group("dense_transposed");
    group.sample_size(20);
    group.warm_up_time(Duration::from_secs(1));

    for size in [64, 256, 1024] {
        group.throughput(Throughput::Elements((size * size) as u64));
        let data: Vec<f64> = (0..size * size).map(|i| i as f64).collect();
        let dims = Dimensions::new(&[(Dim::Y, size), (Dim::X, size)]).unwrap();
        let strides = [1, size as isize];
        let index = MultiIndex::dense(&dims, [&strides[..]]).unwrap();

        group.bench_with_input(BenchmarkId::new("increment", size), &size, |bench, _| {
            bench.iter(|| index.iter().map(|[i]| data[i as usize]).sum::<f64>())
        });
        group.bench_with_input(BenchmarkId::new("inner_block", size), &size, |bench, _| {
            bench.iter(|| {
                let mut sum = 0.0;
                for_each_inner_block(&index.begin(), &index.end(), |offsets, len, strides| {
                    for k in 0..len as isize {
                        sum += data[(offsets[0] + k * strides[0]) as usize];
                    }
                    Ok(())
                })
                .unwrap();
                black_box(sum)
            })
        });
    }
    group.finish();
}

/// Binned operand with a dense per-bin operand broadcast over the bin contents.
///
/// A quarter of the bins are empty so seeking is part of the measurement.
fn bench_binned_with_dense(c: &mut Criterion) {
    let mut group = c.benchmark_group("binned_with_dense");
    group.sample_size(20);
    group.warm_up_time(Duration::from_secs(1));

    for n_bins in [1_000, 100_000] {
        let mut rng = StdRng::seed_from_u64(42);
        let sizes: Vec<usize> = (0..n_bins)
            .map(|_| if rng.gen_ratio(1, 4) { 0 } else { rng.gen_range(1..20) })
            .collect();
        let table: Vec<IndexPair> = indices_from_sizes(&sizes);
        let len = table.last().map_or(0, |p| p.1);
        let events: Vec<f64> = (0..len).map(|_| rng.gen()).collect();
        let weights: Vec<f64> = (0..n_bins).map(|_| rng.gen()).collect();
        group.throughput(Throughput::Elements(len as u64));

        let outer = Dimensions::new(&[(Dim::X, n_bins)]).unwrap();
        let buffer = Dimensions::new(&[(Dim::EVENT, len)]).unwrap();
        let bins = BinParams::new(Dim::EVENT, buffer, &table).unwrap();
        let index = MultiIndex::new(&[
            ViewParams::binned(outer.clone(), &[1], bins).unwrap(),
            ViewParams::contiguous(outer),
        ])
        .unwrap();

        group.bench_with_input(BenchmarkId::new("increment", n_bins), &n_bins, |bench, _| {
            bench.iter(|| {
                index
                    .iter()
                    .map(|[e, w]| events[e as usize] * weights[w as usize])
                    .sum::<f64>()
            })
        });
        group.bench_with_input(
            BenchmarkId::new("inner_block", n_bins),
            &n_bins,
            |bench, _| {
                bench.iter(|| {
                    let mut sum = 0.0;
                    for_each_inner_block(&index.begin(), &index.end(), |offsets, len, _| {
                        let start = offsets[0] as usize;
                        let run: f64 = events[start..start + len].iter().sum();
                        sum += run * weights[offsets[1] as usize];
                        Ok(())
                    })
                    .unwrap();
                    black_box(sum)
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_dense_transposed, bench_binned_with_dense);
criterion_main!(benches);
