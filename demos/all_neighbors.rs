//! Batch search example.
//!
//! This example finds the nearest neighbors of every observation, first on a
//! single thread and then in parallel, and saves the index for later reuse.

use knncolle::prelude::*;
use std::time::Instant;

fn main() {
    println!("knncolle - All Neighbors Example\n");

    let num_points = 10_000;
    let dim = 16;
    println!("Generating dataset: {} points, {} dimensions", num_points, dim);

    let data: Vec<f32> = (0..num_points)
        .flat_map(|i| (0..dim).map(move |j| (i as f32 * 0.01 + j as f32 * 0.1).sin()))
        .collect();
    let matrix = SimpleMatrix::new(dim, num_points as u32, &data).unwrap();

    let start = Instant::now();
    let index = KmknnBuilder::euclidean().build(&matrix).unwrap();
    println!("Built KMKNN index in {:?}", start.elapsed());

    let k = 10;

    println!("\n--- Single Thread ---");
    let start = Instant::now();
    let sequential = find_nearest_neighbors(index.as_ref(), k, 1).unwrap();
    let sequential_time = start.elapsed();
    println!("Time: {:?}", sequential_time);

    let threads = 4;
    println!("\n--- {} Threads ---", threads);
    let start = Instant::now();
    let parallel = find_nearest_neighbors(index.as_ref(), k, threads).unwrap();
    let parallel_time = start.elapsed();
    println!("Time: {:?}", parallel_time);
    println!(
        "Speedup: {:.2}x",
        sequential_time.as_secs_f64() / parallel_time.as_secs_f64()
    );
    assert_eq!(sequential, parallel);

    println!("\nNeighbors of observation 0:");
    for (index, distance) in &parallel[0] {
        println!("  Index {}: distance = {:.4}", index, distance);
    }

    // Indices alone are cheaper to collect.
    let indices = find_nearest_neighbors_index_only(index.as_ref(), k, threads).unwrap();
    println!("\nIndex-only results: {} lists of {}", indices.len(), indices[0].len());

    // Save, reload and check that the reloaded index agrees.
    let dir = std::env::temp_dir().join("knncolle_all_neighbors");
    std::fs::create_dir_all(&dir).unwrap();
    let prefix = dir.join("kmknn_");
    index.save(&prefix).unwrap();
    let reloaded = load_prebuilt::<f32>(&prefix).unwrap();
    let again = find_nearest_neighbors(reloaded.as_ref(), k, threads).unwrap();
    assert_eq!(again, parallel);
    println!("Reloaded index from {} gives identical results", prefix.display());

    println!("\nDone!");
}
