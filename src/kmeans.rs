//! K-means clustering.
//!
//! This module provides the dense k-means clustering used to partition
//! observations for KMKNN. Initialization and refinement are chosen
//! independently through [`KmeansOptions`].

use crate::error::{KnnError, Result};
use crate::types::{DataValue, ObservationIndex};
use crate::utils::parallel::{maybe_parallel_map_threshold, MIN_PARALLEL_SIZE};
use rand::prelude::*;
use serde::{Deserialize, Serialize};

/// Initialization method for k-means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KmeansInit {
    /// Random distinct observations as initial centers.
    Random,

    /// K-means++ initialization (Arthur and Vainshtein 2007).
    KmeansPlusPlus,

    /// Variance partitioning (Su and Dy 2007): repeatedly split the cluster
    /// with the largest sum of squares along its most variable dimension.
    VariancePartition,
}

/// Refinement method for k-means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KmeansRefine {
    /// Lloyd's algorithm: alternate assignment and mean updates.
    Lloyd,

    /// Hartigan-style refinement: move single observations between clusters
    /// whenever the move reduces the total sum of squares.
    Hartigan,

    /// Mini-batch updates (Sculley 2010).
    MiniBatch,
}

/// Configuration for k-means clustering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KmeansOptions {
    /// Initialization method.
    pub init: KmeansInit,

    /// Refinement method.
    pub refine: KmeansRefine,

    /// Maximum number of refinement iterations.
    pub max_iterations: usize,

    /// Random seed for initialization and mini-batch sampling.
    pub seed: u64,

    /// Number of observations per mini-batch.
    pub batch_size: usize,
}

impl Default for KmeansOptions {
    fn default() -> Self {
        Self {
            init: KmeansInit::KmeansPlusPlus,
            refine: KmeansRefine::Hartigan,
            max_iterations: 100,
            seed: 5489,
            batch_size: 500,
        }
    }
}

impl KmeansOptions {
    /// Set the initialization method.
    pub fn with_init(mut self, init: KmeansInit) -> Self {
        self.init = init;
        self
    }

    /// Set the refinement method.
    pub fn with_refine(mut self, refine: KmeansRefine) -> Self {
        self.refine = refine;
        self
    }

    /// Set the maximum number of iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the mini-batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Check the options for consistency.
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(KnnError::invalid_argument(
                "k-means requires at least one iteration",
            ));
        }
        if self.refine == KmeansRefine::MiniBatch && self.batch_size == 0 {
            return Err(KnnError::invalid_argument("mini-batch size must be positive"));
        }
        Ok(())
    }
}

/// Outcome of the refinement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KmeansStatus {
    /// No assignments changed in the last iteration.
    Converged,

    /// Stopped at the iteration limit.
    MaxIterations,
}

/// K-means clustering result.
#[derive(Debug, Clone)]
pub struct KmeansResult<T> {
    /// Cluster centers, each a contiguous run of `ndim` values.
    pub centers: Vec<T>,

    /// Cluster assignment for each observation.
    pub clusters: Vec<ObservationIndex>,

    /// Number of observations in each cluster. Clusters may be empty, e.g.
    /// when there are duplicate observations.
    pub sizes: Vec<ObservationIndex>,

    /// Number of refinement iterations performed.
    pub iterations: usize,

    /// Whether the refinement converged.
    pub status: KmeansStatus,
}

/// Cluster `nobs` observations of `ndim` values, stored contiguously in
/// `data`, into at most `k` clusters.
///
/// `k` is capped at `nobs`. If either is zero, no centers are returned.
pub fn compute<T: DataValue>(
    data: &[T],
    ndim: usize,
    nobs: usize,
    k: usize,
    options: &KmeansOptions,
) -> Result<KmeansResult<T>> {
    options.validate()?;
    if data.len() != ndim * nobs {
        return Err(KnnError::invalid_argument(format!(
            "data length {} does not match {} dimensions x {} observations",
            data.len(),
            ndim,
            nobs
        )));
    }

    let k = k.min(nobs);
    if k == 0 {
        return Ok(KmeansResult {
            centers: Vec::new(),
            clusters: vec![0; nobs],
            sizes: Vec::new(),
            iterations: 0,
            status: KmeansStatus::Converged,
        });
    }

    if ndim == 0 {
        // Zero-dimensional observations are all identical.
        return Ok(KmeansResult {
            centers: Vec::new(),
            clusters: vec![0; nobs],
            sizes: vec![nobs as ObservationIndex],
            iterations: 0,
            status: KmeansStatus::Converged,
        });
    }

    let points = Points {
        data,
        ndim,
        nobs,
    };
    let mut rng = StdRng::seed_from_u64(options.seed);

    let mut centers = match options.init {
        KmeansInit::Random => points.init_random(k, &mut rng),
        KmeansInit::KmeansPlusPlus => points.init_kmeans_plus_plus(k, &mut rng),
        KmeansInit::VariancePartition => points.init_variance_partition(k),
    };
    // Variance partitioning stops early if no cluster can be split further.
    let k = centers.len() / ndim;

    let (clusters, iterations, status) = match options.refine {
        KmeansRefine::Lloyd => points.refine_lloyd(&mut centers, k, options.max_iterations),
        KmeansRefine::Hartigan => points.refine_hartigan(&mut centers, k, options.max_iterations),
        KmeansRefine::MiniBatch => points.refine_mini_batch(
            &mut centers,
            k,
            options.max_iterations,
            options.batch_size,
            &mut rng,
        ),
    };

    let mut sizes = vec![0 as ObservationIndex; k];
    for &c in &clusters {
        sizes[c as usize] += 1;
    }

    tracing::debug!(k, iterations, ?status, "k-means finished");
    Ok(KmeansResult {
        centers: centers.into_iter().map(T::of_f64).collect(),
        clusters,
        sizes,
        iterations,
        status,
    })
}

struct Points<'a, T> {
    data: &'a [T],
    ndim: usize,
    nobs: usize,
}

fn squared_distance<T: DataValue>(x: &[T], center: &[f64]) -> f64 {
    x.iter()
        .zip(center.iter())
        .map(|(&a, &b)| {
            let delta = a.as_f64() - b;
            delta * delta
        })
        .sum()
}

impl<T: DataValue> Points<'_, T> {
    fn observation(&self, i: usize) -> &[T] {
        &self.data[i * self.ndim..(i + 1) * self.ndim]
    }

    fn push_observation(&self, i: usize, centers: &mut Vec<f64>) {
        centers.extend(self.observation(i).iter().map(|v| v.as_f64()));
    }

    /// Closest center to observation `i`, with ties going to the lower index.
    fn closest(&self, i: usize, centers: &[f64], k: usize) -> (ObservationIndex, f64) {
        let obs = self.observation(i);
        let mut best = 0;
        let mut best_dist = f64::INFINITY;
        for c in 0..k {
            let d = squared_distance(obs, &centers[c * self.ndim..(c + 1) * self.ndim]);
            if d < best_dist {
                best_dist = d;
                best = c;
            }
        }
        (best as ObservationIndex, best_dist)
    }

    fn assign_all(&self, centers: &[f64], k: usize) -> Vec<ObservationIndex> {
        let indices: Vec<usize> = (0..self.nobs).collect();
        maybe_parallel_map_threshold(&indices, MIN_PARALLEL_SIZE, |&i| self.closest(i, centers, k).0)
    }

    fn compute_means(&self, clusters: &[ObservationIndex], centers: &mut [f64], k: usize) {
        let mut sums = vec![0.0f64; k * self.ndim];
        let mut counts = vec![0usize; k];
        for (i, &c) in clusters.iter().enumerate() {
            let c = c as usize;
            counts[c] += 1;
            for (s, v) in sums[c * self.ndim..(c + 1) * self.ndim]
                .iter_mut()
                .zip(self.observation(i))
            {
                *s += v.as_f64();
            }
        }

        // Empty clusters keep their previous center.
        for c in 0..k {
            if counts[c] > 0 {
                let n = counts[c] as f64;
                for d in 0..self.ndim {
                    centers[c * self.ndim + d] = sums[c * self.ndim + d] / n;
                }
            }
        }
    }

    fn init_random(&self, k: usize, rng: &mut StdRng) -> Vec<f64> {
        let mut chosen = rand::seq::index::sample(rng, self.nobs, k).into_vec();
        chosen.sort_unstable();
        let mut centers = Vec::with_capacity(k * self.ndim);
        for i in chosen {
            self.push_observation(i, &mut centers);
        }
        centers
    }

    fn init_kmeans_plus_plus(&self, k: usize, rng: &mut StdRng) -> Vec<f64> {
        let mut centers = Vec::with_capacity(k * self.ndim);
        let first = rng.gen_range(0..self.nobs);
        self.push_observation(first, &mut centers);

        let mut min_distances: Vec<f64> = (0..self.nobs)
            .map(|i| squared_distance(self.observation(i), &centers[..self.ndim]))
            .collect();

        for c in 1..k {
            let total: f64 = min_distances.iter().sum();
            let selected = if total > 0.0 {
                let target = rng.gen::<f64>() * total;
                let mut cumulative = 0.0;
                let mut selected = None;
                for (i, &d) in min_distances.iter().enumerate() {
                    cumulative += d;
                    if d > 0.0 && cumulative >= target {
                        selected = Some(i);
                        break;
                    }
                }
                // Rounding can leave the target just beyond the cumulative sum.
                selected.unwrap_or_else(|| {
                    min_distances
                        .iter()
                        .rposition(|&d| d > 0.0)
                        .unwrap_or(self.nobs - 1)
                })
            } else {
                // All remaining observations duplicate an existing center.
                rng.gen_range(0..self.nobs)
            };

            self.push_observation(selected, &mut centers);
            let latest = &centers[c * self.ndim..(c + 1) * self.ndim];
            for (i, d) in min_distances.iter_mut().enumerate() {
                let candidate = squared_distance(self.observation(i), latest);
                if candidate < *d {
                    *d = candidate;
                }
            }
        }

        centers
    }

    fn init_variance_partition(&self, k: usize) -> Vec<f64> {
        struct Partition {
            members: Vec<usize>,
            mean: Vec<f64>,
            sum_of_squares: f64,
        }

        let summarize = |members: Vec<usize>| -> Partition {
            let mut mean = vec![0.0; self.ndim];
            for &i in &members {
                for (m, v) in mean.iter_mut().zip(self.observation(i)) {
                    *m += v.as_f64();
                }
            }
            let n = members.len().max(1) as f64;
            mean.iter_mut().for_each(|m| *m /= n);
            let sum_of_squares = members
                .iter()
                .map(|&i| squared_distance(self.observation(i), &mean))
                .sum();
            Partition {
                members,
                mean,
                sum_of_squares,
            }
        };

        let mut partitions = vec![summarize((0..self.nobs).collect())];
        while partitions.len() < k {
            // Split the partition with the largest sum of squares.
            let chosen = partitions
                .iter()
                .enumerate()
                .filter(|(_, p)| p.members.len() > 1 && p.sum_of_squares > 0.0)
                .max_by(|a, b| a.1.sum_of_squares.total_cmp(&b.1.sum_of_squares))
                .map(|(i, _)| i);
            let Some(chosen) = chosen else {
                break;
            };

            let target = partitions.swap_remove(chosen);
            let mut best_dim = 0;
            let mut best_var = -1.0;
            for d in 0..self.ndim {
                let var: f64 = target
                    .members
                    .iter()
                    .map(|&i| {
                        let delta = self.observation(i)[d].as_f64() - target.mean[d];
                        delta * delta
                    })
                    .sum();
                if var > best_var {
                    best_var = var;
                    best_dim = d;
                }
            }

            let split = target.mean[best_dim];
            let (left, right): (Vec<usize>, Vec<usize>) = target
                .members
                .iter()
                .copied()
                .partition(|&i| self.observation(i)[best_dim].as_f64() < split);
            if left.is_empty() || right.is_empty() {
                partitions.push(target);
                break;
            }
            partitions.push(summarize(left));
            partitions.push(summarize(right));
        }

        partitions.into_iter().flat_map(|p| p.mean).collect()
    }

    fn refine_lloyd(
        &self,
        centers: &mut [f64],
        k: usize,
        max_iterations: usize,
    ) -> (Vec<ObservationIndex>, usize, KmeansStatus) {
        let mut clusters = self.assign_all(centers, k);
        for iteration in 1..=max_iterations {
            self.compute_means(&clusters, centers, k);
            let updated = self.assign_all(centers, k);
            if updated == clusters {
                return (clusters, iteration, KmeansStatus::Converged);
            }
            clusters = updated;
        }
        (clusters, max_iterations, KmeansStatus::MaxIterations)
    }

    fn refine_hartigan(
        &self,
        centers: &mut [f64],
        k: usize,
        max_iterations: usize,
    ) -> (Vec<ObservationIndex>, usize, KmeansStatus) {
        let ndim = self.ndim;
        let mut clusters = self.assign_all(centers, k);
        self.compute_means(&clusters, centers, k);
        let mut sizes = vec![0usize; k];
        for &c in &clusters {
            sizes[c as usize] += 1;
        }

        for iteration in 1..=max_iterations {
            let mut transfers = 0;
            for i in 0..self.nobs {
                let from = clusters[i] as usize;
                if sizes[from] <= 1 {
                    continue;
                }

                let obs = self.observation(i);
                let n_from = sizes[from] as f64;
                let removal = n_from / (n_from - 1.0)
                    * squared_distance(obs, &centers[from * ndim..(from + 1) * ndim]);

                let mut best = from;
                let mut best_cost = removal;
                for to in 0..k {
                    if to == from {
                        continue;
                    }
                    let n_to = sizes[to] as f64;
                    let cost = n_to / (n_to + 1.0)
                        * squared_distance(obs, &centers[to * ndim..(to + 1) * ndim]);
                    if cost < best_cost {
                        best_cost = cost;
                        best = to;
                    }
                }

                if best != from {
                    let n_to = sizes[best] as f64;
                    for (d, v) in obs.iter().enumerate() {
                        let v = v.as_f64();
                        let f = &mut centers[from * ndim + d];
                        *f = (*f * n_from - v) / (n_from - 1.0);
                        let t = &mut centers[best * ndim + d];
                        *t = (*t * n_to + v) / (n_to + 1.0);
                    }
                    sizes[from] -= 1;
                    sizes[best] += 1;
                    clusters[i] = best as ObservationIndex;
                    transfers += 1;
                }
            }

            if transfers == 0 {
                return (clusters, iteration, KmeansStatus::Converged);
            }
        }

        (clusters, max_iterations, KmeansStatus::MaxIterations)
    }

    fn refine_mini_batch(
        &self,
        centers: &mut [f64],
        k: usize,
        max_iterations: usize,
        batch_size: usize,
        rng: &mut StdRng,
    ) -> (Vec<ObservationIndex>, usize, KmeansStatus) {
        let ndim = self.ndim;
        let batch_size = batch_size.min(self.nobs);
        let mut counts = vec![0usize; k];
        let mut previous: Vec<Option<ObservationIndex>> = vec![None; self.nobs];
        let mut status = KmeansStatus::MaxIterations;
        let mut iterations = max_iterations;

        for iteration in 1..=max_iterations {
            let batch = rand::seq::index::sample(rng, self.nobs, batch_size).into_vec();
            let assigned: Vec<ObservationIndex> = batch
                .iter()
                .map(|&i| self.closest(i, centers, k).0)
                .collect();

            let mut changed = 0;
            for (&i, &c) in batch.iter().zip(assigned.iter()) {
                if previous[i] != Some(c) {
                    changed += 1;
                    previous[i] = Some(c);
                }

                let c = c as usize;
                counts[c] += 1;
                let rate = 1.0 / counts[c] as f64;
                for (d, v) in self.observation(i).iter().enumerate() {
                    let center = &mut centers[c * ndim + d];
                    *center += rate * (v.as_f64() - *center);
                }
            }

            if iteration > 1 && changed == 0 {
                status = KmeansStatus::Converged;
                iterations = iteration;
                break;
            }
        }

        (self.assign_all(centers, k), iterations, status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clustered_data() -> Vec<f64> {
        // Three clear clusters of ten points each.
        let mut data = Vec::new();
        for (cx, cy) in [(0.0, 0.0), (10.0, 10.0), (0.0, 10.0)] {
            for i in 0..10 {
                data.push(cx + i as f64 * 0.1);
                data.push(cy + i as f64 * 0.05);
            }
        }
        data
    }

    fn check_three_clusters(result: &KmeansResult<f64>) {
        assert_eq!(result.centers.len(), 6);
        assert_eq!(result.clusters.len(), 30);
        assert_eq!(result.sizes.iter().sum::<u32>(), 30);
        for block in 0..3 {
            let first = result.clusters[block * 10];
            assert!(result.clusters[block * 10..(block + 1) * 10]
                .iter()
                .all(|&c| c == first));
        }
        assert_ne!(result.clusters[0], result.clusters[10]);
        assert_ne!(result.clusters[0], result.clusters[20]);
        assert_ne!(result.clusters[10], result.clusters[20]);
    }

    #[test]
    fn test_kmeans_default() {
        let data = clustered_data();
        let result = compute(&data, 2, 30, 3, &KmeansOptions::default()).unwrap();
        check_three_clusters(&result);
    }

    #[test]
    fn test_kmeans_all_methods() {
        let data = clustered_data();
        for init in [KmeansInit::Random, KmeansInit::KmeansPlusPlus, KmeansInit::VariancePartition] {
            for refine in [KmeansRefine::Lloyd, KmeansRefine::Hartigan] {
                let options = KmeansOptions::default()
                    .with_init(init)
                    .with_refine(refine)
                    .with_seed(42);
                let result = compute(&data, 2, 30, 3, &options).unwrap();
                assert_eq!(result.sizes.iter().sum::<u32>(), 30);
                assert_eq!(result.centers.len(), 6);
            }
        }

        let options = KmeansOptions::default()
            .with_refine(KmeansRefine::MiniBatch)
            .with_batch_size(10);
        let result = compute(&data, 2, 30, 3, &options).unwrap();
        assert_eq!(result.sizes.iter().sum::<u32>(), 30);
    }

    #[test]
    fn test_variance_partition_separates() {
        let data = clustered_data();
        let options = KmeansOptions::default()
            .with_init(KmeansInit::VariancePartition)
            .with_refine(KmeansRefine::Lloyd);
        let result = compute(&data, 2, 30, 3, &options).unwrap();
        check_three_clusters(&result);
    }

    #[test]
    fn test_centers_are_means() {
        let data = clustered_data();
        let options = KmeansOptions::default().with_refine(KmeansRefine::Lloyd);
        let result = compute(&data, 2, 30, 3, &options).unwrap();
        assert_eq!(result.status, KmeansStatus::Converged);
        for c in 0..3u32 {
            let members: Vec<usize> = (0..30).filter(|&i| result.clusters[i] == c).collect();
            let mean_x = members.iter().map(|&i| data[i * 2]).sum::<f64>() / members.len() as f64;
            assert!((result.centers[c as usize * 2] - mean_x).abs() < 1e-8);
        }
    }

    #[test]
    fn test_more_clusters_than_points() {
        let data = vec![1.0f32, 2.0, 3.0, 4.0];
        let result = compute(&data, 2, 2, 5, &KmeansOptions::default()).unwrap();
        assert_eq!(result.sizes.len(), 2);
        assert_eq!(result.sizes, vec![1, 1]);
    }

    #[test]
    fn test_duplicates_leave_empty_clusters() {
        let data = vec![1.0f64; 20];
        let result = compute(&data, 2, 10, 3, &KmeansOptions::default()).unwrap();
        assert_eq!(result.sizes.iter().sum::<u32>(), 10);
        assert!(result.sizes.iter().any(|&s| s == 0));
    }

    #[test]
    fn test_empty_inputs() {
        let data: Vec<f64> = Vec::new();
        let result = compute(&data, 3, 0, 4, &KmeansOptions::default()).unwrap();
        assert!(result.centers.is_empty());
        assert!(result.clusters.is_empty());

        let data = vec![1.0f64, 2.0];
        let result = compute(&data, 1, 2, 0, &KmeansOptions::default()).unwrap();
        assert!(result.sizes.is_empty());
    }

    #[test]
    fn test_invalid_options() {
        let data = vec![1.0f64, 2.0];
        let options = KmeansOptions::default().with_max_iterations(0);
        assert!(compute(&data, 1, 2, 1, &options).is_err());
        assert!(compute(&data, 3, 2, 1, &KmeansOptions::default()).is_err());
    }
}
