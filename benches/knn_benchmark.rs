//! Benchmarks for the knncolle library.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use knncolle::kmeans;
use knncolle::prelude::*;
use rand::prelude::*;
use rand_distr::StandardNormal;
use std::sync::Arc;

fn generate_data(n: usize, dim: usize, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n * dim).map(|_| rng.sample(StandardNormal)).collect()
}

fn builders() -> Vec<(&'static str, Arc<dyn Builder<f32>>)> {
    let bruteforce: Arc<dyn Builder<f32>> = Arc::new(BruteforceBuilder::euclidean());
    let vptree: Arc<dyn Builder<f32>> = Arc::new(VptreeBuilder::euclidean());
    let kmknn: Arc<dyn Builder<f32>> = Arc::new(KmknnBuilder::euclidean());
    vec![("bruteforce", bruteforce), ("vptree", vptree), ("kmknn", kmknn)]
}

fn benchmark_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");
    group.sample_size(20);

    let dim = 10;
    for &n in &[1000, 10000] {
        let data = generate_data(n, dim, 42);
        let matrix = SimpleMatrix::new(dim, n as u32, &data).unwrap();
        for (name, builder) in builders() {
            group.bench_with_input(BenchmarkId::new(name, n), &n, |b, _| {
                b.iter(|| black_box(builder.build(&matrix).unwrap()))
            });
        }
    }

    group.finish();
}

fn benchmark_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_k10");

    let dim = 10;
    let queries = generate_data(50, dim, 123);
    for &n in &[1000, 10000] {
        let data = generate_data(n, dim, 42);
        let matrix = SimpleMatrix::new(dim, n as u32, &data).unwrap();
        for (name, builder) in builders() {
            let index = builder.build(&matrix).unwrap();
            let mut searcher = index.initialize();
            let mut indices = Vec::new();
            let mut distances = Vec::new();

            group.bench_with_input(BenchmarkId::new(name, n), &n, |b, _| {
                b.iter(|| {
                    for query in queries.chunks(dim) {
                        searcher
                            .search_query(query, 10, Some(&mut indices), Some(&mut distances))
                            .unwrap();
                        black_box(&indices);
                    }
                })
            });
        }
    }

    group.finish();
}

fn benchmark_search_all(c: &mut Criterion) {
    let mut group = c.benchmark_group("search_all");

    let dim = 5;
    let n = 5000;
    let data = generate_data(n, dim, 7);
    let matrix = SimpleMatrix::new(dim, n as u32, &data).unwrap();
    for (name, builder) in builders() {
        let index = builder.build(&matrix).unwrap();
        let mut searcher = index.initialize();
        let mut indices = Vec::new();

        group.bench_function(name, |b| {
            b.iter(|| {
                for i in (0..n as u32).step_by(100) {
                    let count = searcher.search_all(i, 0.5, Some(&mut indices), None).unwrap();
                    black_box(count);
                }
            })
        });
    }

    group.finish();
}

fn benchmark_find_nearest_neighbors(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_nearest_neighbors");
    group.sample_size(10);

    let dim = 10;
    let n = 5000;
    let data = generate_data(n, dim, 99);
    let matrix = SimpleMatrix::new(dim, n as u32, &data).unwrap();
    let index = KmknnBuilder::euclidean().build(&matrix).unwrap();

    for &threads in &[1, 4] {
        group.bench_with_input(BenchmarkId::new("kmknn_k10", threads), &threads, |b, &threads| {
            b.iter(|| black_box(find_nearest_neighbors(index.as_ref(), 10, threads).unwrap()))
        });
    }

    group.finish();
}

fn benchmark_kmeans(c: &mut Criterion) {
    let mut group = c.benchmark_group("kmeans");
    group.sample_size(10);

    let dim = 10;
    let n = 10000;
    let data = generate_data(n, dim, 5);
    for refine in [KmeansRefine::Lloyd, KmeansRefine::Hartigan, KmeansRefine::MiniBatch] {
        let options = KmeansOptions::default().with_refine(refine);
        group.bench_with_input(BenchmarkId::new("k100", format!("{:?}", refine)), &options, |b, options| {
            b.iter(|| black_box(kmeans::compute(&data, dim, n, 100, options).unwrap()))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_build,
    benchmark_query,
    benchmark_search_all,
    benchmark_find_nearest_neighbors,
    benchmark_kmeans,
);

criterion_main!(benches);
