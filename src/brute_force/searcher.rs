//! Brute-force builder, index and searcher.

use crate::distances::{normalize_all, save_metric, DistanceMetric, EuclideanDistance, ManhattanDistance};
use crate::error::{KnnError, Result};
use crate::find_nearest_neighbors::{cap_k, cap_k_query};
use crate::matrix::{copy_observations, Matrix};
use crate::neighbor_queue::NeighborQueue;
use crate::persistence::{prefixed, quick_load, quick_save, save_algorithm, LoadRegistry, PrebuiltConfig};
use crate::report::{count_all_neighbors_without_self, report_all_neighbors};
use crate::searcher::{check_observation, check_query, clear_outputs, Builder, Prebuilt, Searcher};
use crate::types::{DataValue, ObservationIndex};
use std::path::Path;
use std::sync::Arc;

/// Name written to `ALGORITHM` by saved brute-force indices.
pub const BRUTEFORCE_ALGORITHM: &str = "knncolle::Bruteforce";

const DATA_FILE: &str = "DATA";

/// Builds [`BruteforcePrebuilt`] indices.
#[derive(Debug, Clone)]
pub struct BruteforceBuilder<T: DataValue> {
    metric: Arc<dyn DistanceMetric<T>>,
}

impl<T: DataValue> BruteforceBuilder<T> {
    /// Create a builder using `metric`.
    pub fn new(metric: Arc<dyn DistanceMetric<T>>) -> Self {
        Self { metric }
    }

    /// Create a builder using the Euclidean distance.
    pub fn euclidean() -> Self {
        Self::new(Arc::new(EuclideanDistance))
    }

    /// Create a builder using the Manhattan distance.
    pub fn manhattan() -> Self {
        Self::new(Arc::new(ManhattanDistance))
    }

    /// Get the distance metric.
    pub fn metric(&self) -> &Arc<dyn DistanceMetric<T>> {
        &self.metric
    }
}

impl<T: DataValue> Builder<T> for BruteforceBuilder<T> {
    fn build(&self, matrix: &dyn Matrix<T>) -> Result<Box<dyn Prebuilt<T>>> {
        let data = copy_observations(matrix)?;
        tracing::debug!(
            observations = matrix.num_observations(),
            dimensions = matrix.num_dimensions(),
            metric = self.metric.name(),
            "building brute-force index"
        );
        let prebuilt = BruteforcePrebuilt::new(
            matrix.num_dimensions(),
            matrix.num_observations(),
            data,
            Arc::clone(&self.metric),
        )?;
        Ok(Box::new(prebuilt))
    }
}

/// Index that stores observations as-is and scans all of them per query.
#[derive(Debug)]
pub struct BruteforcePrebuilt<T: DataValue> {
    num_dimensions: usize,
    num_observations: ObservationIndex,
    data: Vec<T>,
    metric: Arc<dyn DistanceMetric<T>>,
}

impl<T: DataValue> BruteforcePrebuilt<T> {
    /// Wrap a contiguous store of `num_observations` observations.
    pub fn new(
        num_dimensions: usize,
        num_observations: ObservationIndex,
        data: Vec<T>,
        metric: Arc<dyn DistanceMetric<T>>,
    ) -> Result<Self> {
        if data.len() != num_dimensions * num_observations as usize {
            return Err(KnnError::invalid_argument(format!(
                "data length {} does not match {} dimensions x {} observations",
                data.len(),
                num_dimensions,
                num_observations
            )));
        }

        Ok(Self {
            num_dimensions,
            num_observations,
            data,
            metric,
        })
    }

    fn observation(&self, i: ObservationIndex) -> &[T] {
        let start = i as usize * self.num_dimensions;
        &self.data[start..start + self.num_dimensions]
    }

    fn search_nn(&self, query: &[T], nearest: &mut NeighborQueue<T>) {
        for i in 0..self.num_observations {
            nearest.add(i, self.metric.raw(query, self.observation(i)));
        }
    }

    fn count_within(&self, query: &[T], threshold_raw: T) -> usize {
        (0..self.num_observations)
            .filter(|&i| self.metric.raw(query, self.observation(i)) <= threshold_raw)
            .count()
    }

    fn collect_within(&self, query: &[T], threshold_raw: T, all_neighbors: &mut Vec<(T, ObservationIndex)>) {
        all_neighbors.clear();
        for i in 0..self.num_observations {
            let raw = self.metric.raw(query, self.observation(i));
            if raw <= threshold_raw {
                all_neighbors.push((raw, i));
            }
        }
    }
}

impl<T: DataValue> Prebuilt<T> for BruteforcePrebuilt<T> {
    fn num_observations(&self) -> ObservationIndex {
        self.num_observations
    }

    fn num_dimensions(&self) -> usize {
        self.num_dimensions
    }

    fn initialize(&self) -> Box<dyn Searcher<T> + '_> {
        Box::new(BruteforceSearcher::new(self))
    }

    fn save(&self, prefix: &Path) -> Result<()> {
        save_algorithm(prefix, BRUTEFORCE_ALGORITHM)?;
        PrebuiltConfig::new::<T>(self.num_observations, self.num_dimensions).save(prefix)?;
        save_metric(self.metric.as_ref(), prefix)?;
        quick_save(&prefixed(prefix, DATA_FILE), &self.data)
    }
}

/// Reload a brute-force index saved by [`Prebuilt::save`].
pub fn load_bruteforce_prebuilt<T: DataValue>(
    prefix: &Path,
    registry: &LoadRegistry<T>,
) -> Result<Box<dyn Prebuilt<T>>> {
    let config = PrebuiltConfig::load(prefix)?;
    config.check_numeric_type::<T>()?;
    let metric = registry.metrics().load(prefix)?;
    let data = quick_load(&prefixed(prefix, DATA_FILE), config.data_length()?)?;
    let prebuilt =
        BruteforcePrebuilt::new(config.num_dimensions, config.num_observations, data, metric)?;
    Ok(Box::new(prebuilt))
}

/// Searcher on a [`BruteforcePrebuilt`] index.
pub struct BruteforceSearcher<'a, T: DataValue> {
    parent: &'a BruteforcePrebuilt<T>,
    nearest: NeighborQueue<T>,
    all_neighbors: Vec<(T, ObservationIndex)>,
}

impl<'a, T: DataValue> BruteforceSearcher<'a, T> {
    fn new(parent: &'a BruteforcePrebuilt<T>) -> Self {
        Self {
            parent,
            nearest: NeighborQueue::new(),
            all_neighbors: Vec::new(),
        }
    }
}

impl<T: DataValue> Searcher<T> for BruteforceSearcher<'_, T> {
    fn search(
        &mut self,
        i: ObservationIndex,
        k: usize,
        indices: Option<&mut Vec<ObservationIndex>>,
        mut distances: Option<&mut Vec<T>>,
    ) -> Result<()> {
        check_observation(i, self.parent.num_observations)?;
        self.nearest
            .reset(cap_k(k, self.parent.num_observations) + 1);
        self.parent.search_nn(self.parent.observation(i), &mut self.nearest);
        self.nearest
            .report_excluding(indices, distances.as_deref_mut(), i);
        normalize_all(self.parent.metric.as_ref(), distances);
        Ok(())
    }

    fn search_query(
        &mut self,
        query: &[T],
        k: usize,
        indices: Option<&mut Vec<ObservationIndex>>,
        mut distances: Option<&mut Vec<T>>,
    ) -> Result<()> {
        check_query(query, self.parent.num_dimensions)?;
        let k = cap_k_query(k, self.parent.num_observations);
        if k == 0 {
            clear_outputs(indices, distances);
            return Ok(());
        }

        self.nearest.reset(k);
        self.parent.search_nn(query, &mut self.nearest);
        self.nearest.report(indices, distances.as_deref_mut());
        normalize_all(self.parent.metric.as_ref(), distances);
        Ok(())
    }

    fn can_search_all(&self) -> bool {
        true
    }

    fn search_all(
        &mut self,
        i: ObservationIndex,
        threshold: T,
        indices: Option<&mut Vec<ObservationIndex>>,
        mut distances: Option<&mut Vec<T>>,
    ) -> Result<usize> {
        check_observation(i, self.parent.num_observations)?;
        let query = self.parent.observation(i);
        let threshold_raw = self.parent.metric.denormalize(threshold);

        if indices.is_none() && distances.is_none() {
            let count = self.parent.count_within(query, threshold_raw);
            return Ok(count_all_neighbors_without_self(count));
        }

        self.parent
            .collect_within(query, threshold_raw, &mut self.all_neighbors);
        report_all_neighbors(
            &mut self.all_neighbors,
            indices,
            distances.as_deref_mut(),
            Some(i),
        );
        normalize_all(self.parent.metric.as_ref(), distances);
        Ok(count_all_neighbors_without_self(self.all_neighbors.len()))
    }

    fn search_all_query(
        &mut self,
        query: &[T],
        threshold: T,
        indices: Option<&mut Vec<ObservationIndex>>,
        mut distances: Option<&mut Vec<T>>,
    ) -> Result<usize> {
        check_query(query, self.parent.num_dimensions)?;
        let threshold_raw = self.parent.metric.denormalize(threshold);

        if indices.is_none() && distances.is_none() {
            return Ok(self.parent.count_within(query, threshold_raw));
        }

        self.parent
            .collect_within(query, threshold_raw, &mut self.all_neighbors);
        report_all_neighbors(&mut self.all_neighbors, indices, distances.as_deref_mut(), None);
        normalize_all(self.parent.metric.as_ref(), distances);
        Ok(self.all_neighbors.len())
    }
}
