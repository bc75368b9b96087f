//! Configuration types for choosing and building a search algorithm.
//!
//! A [`SearchConfig`] can be deserialized from JSON and turned into a boxed
//! [`Builder`], so programs can pick the algorithm at runtime.

use crate::brute_force::BruteforceBuilder;
use crate::distances::{DistanceMetric, EuclideanDistance, ManhattanDistance};
use crate::error::{KnnError, Result};
use crate::kmknn::{KmknnBuilder, KmknnOptions};
use crate::l2_normalized::L2NormalizedBuilder;
use crate::searcher::Builder;
use crate::types::DataValue;
use crate::vptree::VptreeBuilder;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Search algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// Compare against every observation.
    Bruteforce,
    /// Vantage point tree.
    #[default]
    Vptree,
    /// K-means for k-nearest neighbors.
    Kmknn,
}

/// Distance between observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distance {
    /// Euclidean distance.
    #[default]
    Euclidean,
    /// Manhattan distance.
    Manhattan,
    /// Euclidean distance between L2-normalized observations.
    Cosine,
}

/// Main configuration for building a search index.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Algorithm to use.
    pub algorithm: Algorithm,

    /// Distance to use.
    pub distance: Distance,

    /// Options for the KMKNN algorithm, ignored by the others.
    pub kmknn: KmknnOptions,

    /// Threads for batch searches. 0 uses all available cores.
    pub num_threads: usize,
}

impl SearchConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the algorithm.
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Set the distance.
    pub fn with_distance(mut self, distance: Distance) -> Self {
        self.distance = distance;
        self
    }

    /// Set the KMKNN options.
    pub fn with_kmknn(mut self, options: KmknnOptions) -> Self {
        self.kmknn = options;
        self
    }

    /// Set the number of threads for batch searches.
    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    /// Parse a configuration from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a configuration from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            KnnError::io(format!(
                "failed to read configuration at '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json_str(&json)
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| KnnError::internal(format!("failed to serialize configuration: {}", e)))
    }

    /// Check the configuration for consistency.
    pub fn validate(&self) -> Result<()> {
        if self.algorithm == Algorithm::Kmknn {
            self.kmknn.validate()?;
        }
        Ok(())
    }

    /// Create the builder described by this configuration.
    pub fn build_builder<T: DataValue>(&self) -> Result<Box<dyn Builder<T>>> {
        self.validate()?;
        let metric: Arc<dyn DistanceMetric<T>> = match self.distance {
            Distance::Euclidean | Distance::Cosine => Arc::new(EuclideanDistance),
            Distance::Manhattan => Arc::new(ManhattanDistance),
        };

        let builder: Box<dyn Builder<T>> = match self.algorithm {
            Algorithm::Bruteforce => Box::new(BruteforceBuilder::new(metric)),
            Algorithm::Vptree => Box::new(VptreeBuilder::new(metric)),
            Algorithm::Kmknn => Box::new(KmknnBuilder::with_options(metric, self.kmknn.clone())),
        };

        if self.distance == Distance::Cosine {
            return Ok(Box::new(L2NormalizedBuilder::new(Arc::from(builder))));
        }
        Ok(builder)
    }
}
