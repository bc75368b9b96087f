//! K-means for k-nearest neighbors (KMKNN).
//!
//! Observations are clustered with k-means and each search visits clusters
//! in order of increasing distance from the query to their centers. The
//! triangle inequality, applied to each observation's precomputed distance to
//! its center, skips whole clusters and the parts of clusters that cannot hold
//! a closer neighbor. See Wang (2012), "Fast k-nearest neighbor search with
//! k-means clustering".

use crate::distances::{normalize_all, save_metric, DistanceMetric, EuclideanDistance, ManhattanDistance};
use crate::error::{KnnError, Result};
use crate::find_nearest_neighbors::{cap_k, cap_k_query};
use crate::kmeans::{self, KmeansOptions};
use crate::matrix::{copy_observations, gather_observations, Matrix};
use crate::neighbor_queue::NeighborQueue;
use crate::persistence::{prefixed, quick_load, quick_save, save_algorithm, LoadRegistry, PrebuiltConfig};
use crate::report::{count_all_neighbors_without_self, report_all_neighbors};
use crate::searcher::{check_observation, check_query, clear_outputs, Builder, Prebuilt, Searcher};
use crate::types::{DataValue, ObservationIndex};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Name written to `ALGORITHM` by saved KMKNN indices.
pub const KMKNN_ALGORITHM: &str = "knncolle::Kmknn";

const DATA_FILE: &str = "DATA";
const SIZES_FILE: &str = "SIZES";
const OFFSETS_FILE: &str = "OFFSETS";
const CENTERS_FILE: &str = "CENTERS";
const OBSERVATION_ID_FILE: &str = "OBSERVATION_ID";
const DIST_TO_CENTROID_FILE: &str = "DIST_TO_CENTROID";

/// Tolerance added to the triangle-inequality bounds.
///
/// Centers and distances to centers carry rounding error, so a point exactly
/// at the threshold can land just outside an unpadded bound. Candidates inside
/// the padding are still checked with their exact distance.
fn bound_slack<T: DataValue>(dist2center: T, threshold: T) -> T {
    let tolerance = T::epsilon().sqrt();
    (dist2center + threshold) * tolerance + tolerance
}

/// Options for building a KMKNN index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KmknnOptions {
    /// The number of clusters is `ceil(nobs^power)`.
    pub power: f64,

    /// Options for the k-means clustering.
    pub kmeans: KmeansOptions,
}

impl Default for KmknnOptions {
    fn default() -> Self {
        Self {
            power: 0.5,
            kmeans: KmeansOptions::default(),
        }
    }
}

impl KmknnOptions {
    /// Set the exponent determining the number of clusters.
    pub fn with_power(mut self, power: f64) -> Self {
        self.power = power;
        self
    }

    /// Set the k-means options.
    pub fn with_kmeans(mut self, kmeans: KmeansOptions) -> Self {
        self.kmeans = kmeans;
        self
    }

    /// Check the options for consistency.
    pub fn validate(&self) -> Result<()> {
        if !self.power.is_finite() || self.power < 0.0 {
            return Err(KnnError::invalid_argument(format!(
                "KMKNN power should be a non-negative number, got {}",
                self.power
            )));
        }
        self.kmeans.validate()
    }

    /// Number of clusters for `num_observations` observations.
    pub fn num_centers(&self, num_observations: ObservationIndex) -> usize {
        if num_observations == 0 {
            return 0;
        }
        let wanted = (num_observations as f64).powf(self.power).ceil() as usize;
        wanted.clamp(1, num_observations as usize)
    }
}

/// Builds [`KmknnPrebuilt`] indices.
#[derive(Debug, Clone)]
pub struct KmknnBuilder<T: DataValue> {
    metric: Arc<dyn DistanceMetric<T>>,
    options: KmknnOptions,
}

impl<T: DataValue> KmknnBuilder<T> {
    /// Create a builder using `metric` and default options.
    pub fn new(metric: Arc<dyn DistanceMetric<T>>) -> Self {
        Self::with_options(metric, KmknnOptions::default())
    }

    /// Create a builder using `metric` and `options`.
    pub fn with_options(metric: Arc<dyn DistanceMetric<T>>, options: KmknnOptions) -> Self {
        Self { metric, options }
    }

    /// Create a builder using the Euclidean distance.
    pub fn euclidean() -> Self {
        Self::new(Arc::new(EuclideanDistance))
    }

    /// Create a builder using the Manhattan distance.
    pub fn manhattan() -> Self {
        Self::new(Arc::new(ManhattanDistance))
    }

    /// Get the options.
    pub fn options(&self) -> &KmknnOptions {
        &self.options
    }
}

impl<T: DataValue> Builder<T> for KmknnBuilder<T> {
    fn build(&self, matrix: &dyn Matrix<T>) -> Result<Box<dyn Prebuilt<T>>> {
        self.options.validate()?;
        let data = copy_observations(matrix)?;
        let prebuilt = KmknnPrebuilt::new(
            matrix.num_dimensions(),
            matrix.num_observations(),
            data,
            Arc::clone(&self.metric),
            &self.options,
        )?;
        tracing::debug!(
            observations = prebuilt.num_observations,
            dimensions = prebuilt.num_dimensions,
            clusters = prebuilt.sizes.len(),
            metric = self.metric.name(),
            "built KMKNN index"
        );
        Ok(Box::new(prebuilt))
    }
}

/// KMKNN index.
///
/// Observations are stored grouped by cluster, and within each cluster by
/// increasing distance to the center.
#[derive(Debug)]
pub struct KmknnPrebuilt<T: DataValue> {
    num_dimensions: usize,
    num_observations: ObservationIndex,
    data: Vec<T>,
    metric: Arc<dyn DistanceMetric<T>>,

    sizes: Vec<ObservationIndex>,
    offsets: Vec<ObservationIndex>,
    centers: Vec<T>,

    /// Original index of the observation at each stored position.
    observation_id: Vec<ObservationIndex>,

    /// Stored position of each original observation.
    new_location: Vec<ObservationIndex>,

    /// Normalized distance from each stored observation to its center.
    dist_to_centroid: Vec<T>,
}

impl<T: DataValue> KmknnPrebuilt<T> {
    /// Cluster and index a contiguous store of `num_observations` observations.
    pub fn new(
        num_dimensions: usize,
        num_observations: ObservationIndex,
        data: Vec<T>,
        metric: Arc<dyn DistanceMetric<T>>,
        options: &KmknnOptions,
    ) -> Result<Self> {
        let nobs = num_observations as usize;
        let ncenters = options.num_centers(num_observations);
        let clustering = kmeans::compute(&data, num_dimensions, nobs, ncenters, &options.kmeans)?;
        let mut centers = clustering.centers;
        let mut clusters = clustering.clusters;

        // Remove empty clusters, e.g. due to duplicate observations.
        let mut sizes = Vec::with_capacity(clustering.sizes.len());
        let mut remap = vec![0 as ObservationIndex; clustering.sizes.len()];
        for (c, &size) in clustering.sizes.iter().enumerate() {
            if size > 0 {
                let survivor = sizes.len();
                if c > survivor {
                    centers.copy_within(
                        c * num_dimensions..(c + 1) * num_dimensions,
                        survivor * num_dimensions,
                    );
                }
                remap[c] = survivor as ObservationIndex;
                sizes.push(size);
            }
        }
        if sizes.len() < clustering.sizes.len() {
            for c in clusters.iter_mut() {
                *c = remap[*c as usize];
            }
            centers.truncate(sizes.len() * num_dimensions);
        }

        let mut offsets = vec![0 as ObservationIndex; sizes.len()];
        for c in 1..sizes.len() {
            offsets[c] = offsets[c - 1] + sizes[c - 1];
        }

        // Order observations by cluster, then by distance to the center.
        let mut by_distance = vec![(T::zero(), 0 as ObservationIndex); nobs];
        let mut sofar = offsets.clone();
        for (o, &c) in clusters.iter().enumerate() {
            let c = c as usize;
            let obs = &data[o * num_dimensions..(o + 1) * num_dimensions];
            let center = &centers[c * num_dimensions..(c + 1) * num_dimensions];
            let slot = &mut sofar[c];
            by_distance[*slot as usize] = (metric.normalize(metric.raw(obs, center)), o as ObservationIndex);
            *slot += 1;
        }
        for (&offset, &size) in offsets.iter().zip(sizes.iter()) {
            let range = offset as usize..(offset + size) as usize;
            by_distance[range].sort_unstable_by_key(|&(d, i)| (d.ordered(), i));
        }

        let observation_id: Vec<ObservationIndex> = by_distance.iter().map(|&(_, o)| o).collect();
        let dist_to_centroid: Vec<T> = by_distance.iter().map(|&(d, _)| d).collect();
        let mut new_location = vec![0 as ObservationIndex; nobs];
        for (pos, &o) in observation_id.iter().enumerate() {
            new_location[o as usize] = pos as ObservationIndex;
        }
        let data = gather_observations(&data, num_dimensions, &observation_id);

        Ok(Self {
            num_dimensions,
            num_observations,
            data,
            metric,
            sizes,
            offsets,
            centers,
            observation_id,
            new_location,
            dist_to_centroid,
        })
    }

    /// Number of non-empty clusters.
    pub fn num_centers(&self) -> usize {
        self.sizes.len()
    }

    fn stored(&self, pos: usize) -> &[T] {
        &self.data[pos * self.num_dimensions..(pos + 1) * self.num_dimensions]
    }

    fn center(&self, c: usize) -> &[T] {
        &self.centers[c * self.num_dimensions..(c + 1) * self.num_dimensions]
    }

    fn order_centers(&self, target: &[T], center_order: &mut Vec<(T, ObservationIndex)>) {
        center_order.clear();
        for c in 0..self.sizes.len() {
            center_order.push((self.metric.raw(target, self.center(c)), c as ObservationIndex));
        }
        center_order.sort_unstable_by_key(|&(d, c)| (d.ordered(), c));
    }

    fn search_nn(
        &self,
        target: &[T],
        nearest: &mut NeighborQueue<T>,
        center_order: &mut Vec<(T, ObservationIndex)>,
    ) {
        self.order_centers(target, center_order);

        // Negative until the queue is full.
        let mut threshold_raw = -T::one();
        for &(center_raw, center) in center_order.iter() {
            let center = center as usize;
            let dist2center = self.metric.normalize(center_raw);
            let cur_nobs = self.sizes[center] as usize;
            let offset = self.offsets[center] as usize;
            let dists = &self.dist_to_centroid[offset..offset + cur_nobs];
            let maxdist = dists[cur_nobs - 1];

            let mut firstcell = 0;
            let mut upper_bd = T::max_value();
            if threshold_raw >= T::zero() {
                let threshold = self.metric.normalize(threshold_raw);

                // Points closer to the center than this cannot be within the
                // threshold of the target.
                let lower_bd = dist2center - threshold - bound_slack(dist2center, threshold);
                if maxdist < lower_bd {
                    continue;
                }
                firstcell = dists.partition_point(|&d| d < lower_bd);

                // Likewise for points further from the center than this.
                upper_bd = threshold + dist2center + bound_slack(dist2center, threshold);
            }

            for celldex in firstcell..cur_nobs {
                if dists[celldex] > upper_bd {
                    break;
                }

                let pos = offset + celldex;
                let raw = self.metric.raw(target, self.stored(pos));
                nearest.add(self.observation_id[pos], raw);
                if nearest.is_full() {
                    threshold_raw = nearest.limit();
                    let threshold = self.metric.normalize(threshold_raw);
                    upper_bd = threshold + dist2center + bound_slack(dist2center, threshold);
                }
            }
        }
    }

    fn search_all_clusters<F>(
        &self,
        target: &[T],
        threshold: T,
        center_order: &mut Vec<(T, ObservationIndex)>,
        mut found: F,
    ) where
        F: FnMut(ObservationIndex, T),
    {
        self.order_centers(target, center_order);
        let threshold_raw = self.metric.denormalize(threshold);

        for &(center_raw, center) in center_order.iter() {
            let center = center as usize;
            let dist2center = self.metric.normalize(center_raw);
            let cur_nobs = self.sizes[center] as usize;
            let offset = self.offsets[center] as usize;
            let dists = &self.dist_to_centroid[offset..offset + cur_nobs];

            let slack = bound_slack(dist2center, threshold);
            let lower_bd = dist2center - threshold - slack;
            if dists[cur_nobs - 1] < lower_bd {
                continue;
            }
            let firstcell = dists.partition_point(|&d| d < lower_bd);
            let upper_bd = threshold + dist2center + slack;

            for celldex in firstcell..cur_nobs {
                if dists[celldex] > upper_bd {
                    break;
                }
                let pos = offset + celldex;
                let raw = self.metric.raw(target, self.stored(pos));
                if raw <= threshold_raw {
                    found(self.observation_id[pos], raw);
                }
            }
        }
    }
}

impl<T: DataValue> Prebuilt<T> for KmknnPrebuilt<T> {
    fn num_observations(&self) -> ObservationIndex {
        self.num_observations
    }

    fn num_dimensions(&self) -> usize {
        self.num_dimensions
    }

    fn initialize(&self) -> Box<dyn Searcher<T> + '_> {
        Box::new(KmknnSearcher {
            parent: self,
            nearest: NeighborQueue::new(),
            center_order: Vec::with_capacity(self.sizes.len()),
            all_neighbors: Vec::new(),
        })
    }

    fn save(&self, prefix: &Path) -> Result<()> {
        save_algorithm(prefix, KMKNN_ALGORITHM)?;
        PrebuiltConfig::new::<T>(self.num_observations, self.num_dimensions)
            .with_num_centers(self.sizes.len())
            .save(prefix)?;
        save_metric(self.metric.as_ref(), prefix)?;
        quick_save(&prefixed(prefix, DATA_FILE), &self.data)?;
        quick_save(&prefixed(prefix, SIZES_FILE), &self.sizes)?;
        quick_save(&prefixed(prefix, OFFSETS_FILE), &self.offsets)?;
        quick_save(&prefixed(prefix, CENTERS_FILE), &self.centers)?;
        quick_save(&prefixed(prefix, OBSERVATION_ID_FILE), &self.observation_id)?;
        quick_save(&prefixed(prefix, DIST_TO_CENTROID_FILE), &self.dist_to_centroid)
    }
}

/// Reload a KMKNN index saved by [`Prebuilt::save`].
pub fn load_kmknn_prebuilt<T: DataValue>(
    prefix: &Path,
    registry: &LoadRegistry<T>,
) -> Result<Box<dyn Prebuilt<T>>> {
    let config = PrebuiltConfig::load(prefix)?;
    config.check_numeric_type::<T>()?;
    let ncenters = PrebuiltConfig::require(config.num_centers, "num_centers")?;
    let nobs = config.num_observations as usize;
    let ndim = config.num_dimensions;

    let metric = registry.metrics().load(prefix)?;
    let data = quick_load(&prefixed(prefix, DATA_FILE), config.data_length()?)?;
    let sizes: Vec<ObservationIndex> = quick_load(&prefixed(prefix, SIZES_FILE), ncenters)?;
    let offsets: Vec<ObservationIndex> = quick_load(&prefixed(prefix, OFFSETS_FILE), ncenters)?;
    let centers: Vec<T> = quick_load(&prefixed(prefix, CENTERS_FILE), ncenters * ndim)?;
    let observation_id: Vec<ObservationIndex> =
        quick_load(&prefixed(prefix, OBSERVATION_ID_FILE), nobs)?;
    let dist_to_centroid: Vec<T> = quick_load(&prefixed(prefix, DIST_TO_CENTROID_FILE), nobs)?;

    let total: usize = sizes.iter().map(|&s| s as usize).sum();
    let consistent = total == nobs
        && sizes.iter().all(|&s| s > 0)
        && offsets
            .iter()
            .zip(sizes.iter())
            .all(|(&o, &s)| o as usize + s as usize <= nobs);
    if !consistent {
        return Err(KnnError::data_loss(format!(
            "inconsistent KMKNN cluster sizes at '{}'",
            prefix.display()
        )));
    }

    let mut new_location = vec![0 as ObservationIndex; nobs];
    for (pos, &o) in observation_id.iter().enumerate() {
        if o as usize >= nobs {
            return Err(KnnError::data_loss(format!(
                "KMKNN observation identifier {} is out of range",
                o
            )));
        }
        new_location[o as usize] = pos as ObservationIndex;
    }

    Ok(Box::new(KmknnPrebuilt {
        num_dimensions: ndim,
        num_observations: config.num_observations,
        data,
        metric,
        sizes,
        offsets,
        centers,
        observation_id,
        new_location,
        dist_to_centroid,
    }))
}

/// Searcher on a [`KmknnPrebuilt`] index.
pub struct KmknnSearcher<'a, T: DataValue> {
    parent: &'a KmknnPrebuilt<T>,
    nearest: NeighborQueue<T>,
    center_order: Vec<(T, ObservationIndex)>,
    all_neighbors: Vec<(T, ObservationIndex)>,
}

impl<T: DataValue> Searcher<T> for KmknnSearcher<'_, T> {
    fn search(
        &mut self,
        i: ObservationIndex,
        k: usize,
        indices: Option<&mut Vec<ObservationIndex>>,
        mut distances: Option<&mut Vec<T>>,
    ) -> Result<()> {
        check_observation(i, self.parent.num_observations)?;
        let parent = self.parent;
        let target = parent.stored(parent.new_location[i as usize] as usize);
        self.nearest
            .reset(cap_k(k, self.parent.num_observations) + 1);
        parent.search_nn(target, &mut self.nearest, &mut self.center_order);
        self.nearest
            .report_excluding(indices, distances.as_deref_mut(), i);
        normalize_all(parent.metric.as_ref(), distances);
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
        self.parent
            .search_nn(query, &mut self.nearest, &mut self.center_order);
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
        let parent = self.parent;
        let target = parent.stored(parent.new_location[i as usize] as usize);

        if indices.is_none() && distances.is_none() {
            let mut count = 0;
            parent.search_all_clusters(target, threshold, &mut self.center_order, |_, _| count += 1);
            return Ok(count_all_neighbors_without_self(count));
        }

        let all_neighbors = &mut self.all_neighbors;
        all_neighbors.clear();
        parent.search_all_clusters(target, threshold, &mut self.center_order, |o, d| {
            all_neighbors.push((d, o))
        });
        report_all_neighbors(all_neighbors, indices, distances.as_deref_mut(), Some(i));
        normalize_all(parent.metric.as_ref(), distances);
        Ok(count_all_neighbors_without_self(all_neighbors.len()))
    }

    fn search_all_query(
        &mut self,
        query: &[T],
        threshold: T,
        indices: Option<&mut Vec<ObservationIndex>>,
        mut distances: Option<&mut Vec<T>>,
    ) -> Result<usize> {
        check_query(query, self.parent.num_dimensions)?;
        let parent = self.parent;

        if indices.is_none() && distances.is_none() {
            let mut count = 0;
            parent.search_all_clusters(query, threshold, &mut self.center_order, |_, _| count += 1);
            return Ok(count);
        }

        let all_neighbors = &mut self.all_neighbors;
        all_neighbors.clear();
        parent.search_all_clusters(query, threshold, &mut self.center_order, |o, d| {
            all_neighbors.push((d, o))
        });
        report_all_neighbors(all_neighbors, indices, distances.as_deref_mut(), None);
        normalize_all(parent.metric.as_ref(), distances);
        Ok(all_neighbors.len())
    }
}
