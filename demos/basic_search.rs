//! Basic search example.
//!
//! This example builds each exact index over a small dataset and shows that
//! they all report the same neighbors.

use knncolle::prelude::*;
use std::sync::Arc;

fn main() {
    println!("knncolle - Basic Search Example\n");

    // Ten 3-dimensional points, stored one after another.
    let data = vec![
        0.0f32, 0.0, 0.0, // Point 0: origin
        1.0, 0.0, 0.0, // Point 1: unit x
        0.0, 1.0, 0.0, // Point 2: unit y
        0.0, 0.0, 1.0, // Point 3: unit z
        1.0, 1.0, 1.0, // Point 4: diagonal
        0.5, 0.5, 0.5, // Point 5: center
        2.0, 0.0, 0.0, // Point 6: far x
        0.0, 2.0, 0.0, // Point 7: far y
        0.0, 0.0, 2.0, // Point 8: far z
        -1.0, -1.0, -1.0, // Point 9: negative diagonal
    ];
    let matrix = SimpleMatrix::new(3, 10, &data).unwrap();
    println!(
        "Dataset: {} points, {} dimensions",
        matrix.num_observations(),
        matrix.num_dimensions()
    );

    let query = [0.4f32, 0.4, 0.4];
    println!("\nQuery: {:?}", query);

    let bruteforce: Box<dyn Builder<f32>> = Box::new(BruteforceBuilder::euclidean());
    let vptree: Box<dyn Builder<f32>> = Box::new(VptreeBuilder::euclidean());
    let kmknn: Box<dyn Builder<f32>> = Box::new(KmknnBuilder::euclidean());

    let k = 5;
    for (name, builder) in [("Brute force", bruteforce), ("VP tree", vptree), ("KMKNN", kmknn)] {
        let index = builder.build(&matrix).unwrap();
        let mut searcher = index.initialize();
        let results = searcher.neighbors_of_query(&query, k).unwrap();

        println!("\n{}: top {} nearest neighbors", name, k);
        println!("{:>5} {:>10} {:>15}", "Rank", "Index", "Distance");
        println!("{:-<32}", "");
        for (rank, (index, distance)) in results.iter().enumerate() {
            println!("{:>5} {:>10} {:>15.6}", rank + 1, index, distance);
        }
    }

    // Neighbors of an observation in the index exclude the observation itself.
    println!("\n--- Neighbors of point 5 ---\n");
    let index = VptreeBuilder::manhattan().build(&matrix).unwrap();
    let mut searcher = index.initialize();
    for (index, distance) in searcher.neighbors_of(5, 3).unwrap() {
        println!("  Index {}: manhattan distance = {:.4}", index, distance);
    }

    // Cosine distances through L2 normalization.
    println!("\n--- Cosine Search ---\n");
    let cosine = L2NormalizedBuilder::new(Arc::new(KmknnBuilder::<f32>::euclidean()));
    let index = cosine.build(&matrix).unwrap();
    let mut searcher = index.initialize();
    for (index, distance) in searcher.neighbors_of_query(&[3.0, 0.1, 0.0], 3).unwrap() {
        println!("  Index {}: distance = {:.4}", index, distance);
    }

    // Radius search.
    println!("\n--- Radius Search ---\n");
    let index = KmknnBuilder::euclidean().build(&matrix).unwrap();
    let mut searcher = index.initialize();
    let radius = 1.2;
    let mut indices = Vec::new();
    let mut distances = Vec::new();
    let count = searcher
        .search_all_query(&[0.0, 0.0, 0.0], radius, Some(&mut indices), Some(&mut distances))
        .unwrap();

    println!("Points within distance {} of origin: {} points", radius, count);
    for (index, distance) in indices.iter().zip(&distances) {
        println!("  Index {}: distance = {:.4}", index, distance);
    }

    println!("\nDone!");
}
