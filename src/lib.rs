//! # knncolle - Exact k-nearest neighbor search
//!
//! A Rust library for finding the k-nearest neighbors of observations in
//! low- to moderate-dimensional data, with interchangeable algorithms behind
//! a common interface.
//!
//! ## Overview
//!
//! Every algorithm follows the same pipeline:
//!
//! - a [`Builder`] consumes a [`Matrix`] of observations,
//! - producing an immutable [`Prebuilt`] index,
//! - which hands out [`Searcher`]s, one per thread, to run queries.
//!
//! Supported algorithms:
//!
//! - **Brute force**: compare against every observation
//! - **Vantage point tree**: metric tree pruned with the triangle inequality
//! - **KMKNN**: k-means clusters pruned with the triangle inequality
//! - **L2-normalized**: wrapper normalizing data and queries for cosine search
//!
//! All searches are exact, so every algorithm returns the same neighbors.
//!
//! ## Quick Start
//!
//! ```rust
//! use knncolle::prelude::*;
//!
//! // Four 2-dimensional observations, stored contiguously.
//! let data = vec![0.0, 0.0, 1.0, 0.0, 0.0, 2.0, 5.0, 5.0];
//! let matrix = SimpleMatrix::new(2, 4, &data).unwrap();
//!
//! let index = VptreeBuilder::euclidean().build(&matrix).unwrap();
//! let mut searcher = index.initialize();
//!
//! // Neighbors of the first observation, excluding itself.
//! let neighbors = searcher.neighbors_of(0, 2).unwrap();
//! assert_eq!(neighbors, vec![(1, 1.0), (2, 2.0)]);
//!
//! // Neighbors of an arbitrary query.
//! let found = searcher.neighbors_of_query(&[4.0, 4.0], 1).unwrap();
//! assert_eq!(found[0].0, 3);
//! ```
//!
//! ## Batch Search
//!
//! Find the neighbors of every observation across several threads:
//!
//! ```rust
//! use knncolle::prelude::*;
//!
//! let data: Vec<f32> = (0..300).map(|i| ((i * 37) % 101) as f32).collect();
//! let matrix = SimpleMatrix::new(3, 100, &data).unwrap();
//! let index = KmknnBuilder::euclidean().build(&matrix).unwrap();
//!
//! let all = find_nearest_neighbors(index.as_ref(), 5, 4).unwrap();
//! assert_eq!(all.len(), 100);
//! assert!(all.iter().all(|neighbors| neighbors.len() == 5));
//! ```
//!
//! ## Configuration
//!
//! The algorithm and distance can be chosen at runtime:
//!
//! ```rust
//! use knncolle::prelude::*;
//!
//! let config = SearchConfig::from_json_str(r#"{"algorithm": "kmknn", "distance": "cosine"}"#).unwrap();
//! let builder = config.build_builder::<f64>().unwrap();
//!
//! let data = vec![1.0, 0.0, 0.0, 1.0, 3.0, 0.1];
//! let index = builder.build(&SimpleMatrix::new(2, 3, &data).unwrap()).unwrap();
//! assert_eq!(index.initialize().neighbors_of(0, 1).unwrap()[0].0, 2);
//! ```
//!
//! ## Distances
//!
//! | Distance | Raw distance | Notes |
//! |----------|--------------|-------|
//! | `EuclideanDistance` | Squared Euclidean | Default |
//! | `ManhattanDistance` | Sum of absolute differences | |
//! | Cosine | Squared Euclidean on L2-normalized data | Via [`L2NormalizedBuilder`] |
//!
//! ## Module Overview
//!
//! - [`brute_force`]: Exhaustive search
//! - [`vptree`]: Vantage point trees
//! - [`kmknn`]: K-means for k-nearest neighbors
//! - [`kmeans`]: K-means clustering used by KMKNN
//! - [`l2_normalized`]: Cosine search through L2 normalization
//! - [`find_nearest_neighbors`]: Batch search over all observations
//! - [`persistence`]: Saving and reloading prebuilt indices
//! - [`doc_index`]: Documentation search-index shards

#![allow(clippy::needless_range_loop)]
#![allow(clippy::module_inception)]

pub mod brute_force;
pub mod config;
pub mod distances;
pub mod doc_index;
pub mod find_nearest_neighbors;
pub mod kmeans;
pub mod kmknn;
pub mod l2_normalized;
pub mod matrix;
pub mod neighbor_queue;
pub mod persistence;
pub mod report;
pub mod utils;
pub mod vptree;

mod error;
mod searcher;
mod types;

pub use config::{Algorithm, Distance, SearchConfig};
pub use error::{ErrorCode, KnnError, Result};
pub use l2_normalized::L2NormalizedBuilder;
pub use matrix::{Matrix, MatrixExtractor, SimpleMatrix};
pub use searcher::{Builder, Prebuilt, Searcher};
pub use types::*;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::brute_force::{BruteforceBuilder, BruteforcePrebuilt};
    pub use crate::config::{Algorithm, Distance, SearchConfig};
    pub use crate::distances::{DistanceMetric, EuclideanDistance, ManhattanDistance, MetricRegistry};
    pub use crate::error::{ErrorCode, KnnError, Result};
    pub use crate::find_nearest_neighbors::{
        cap_k, cap_k_query, find_nearest_neighbors, find_nearest_neighbors_index_only,
    };
    pub use crate::kmeans::{KmeansInit, KmeansOptions, KmeansRefine};
    pub use crate::kmknn::{KmknnBuilder, KmknnOptions, KmknnPrebuilt};
    pub use crate::l2_normalized::{l2_normalize, L2NormalizedBuilder, L2NormalizedMatrix};
    pub use crate::matrix::{Matrix, MatrixExtractor, SimpleMatrix};
    pub use crate::neighbor_queue::NeighborQueue;
    pub use crate::persistence::{load_prebuilt, load_prebuilt_shared, LoadRegistry};
    pub use crate::searcher::{Builder, Prebuilt, Searcher};
    pub use crate::types::*;
    pub use crate::vptree::{VptreeBuilder, VptreePrebuilt};
}
