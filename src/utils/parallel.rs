//! Parallel execution utilities.

use crate::error::{KnnError, Result};
use rayon::prelude::*;

/// Minimum number of items before parallelization is beneficial.
/// Below this threshold, sequential execution is faster due to reduced overhead.
pub const MIN_PARALLEL_SIZE: usize = 1024;

/// Split `num_tasks` into at most `num_workers` contiguous `(start, length)`
/// ranges of near-equal size.
///
/// Earlier ranges receive the remainder, so lengths differ by at most one.
/// Ranges are never empty; fewer than `num_workers` ranges are returned when
/// there are fewer tasks than workers.
pub fn partition_range(num_tasks: usize, num_workers: usize) -> Vec<(usize, usize)> {
    let workers = num_workers.max(1).min(num_tasks);
    if workers == 0 {
        return Vec::new();
    }

    let base = num_tasks / workers;
    let remainder = num_tasks % workers;
    let mut ranges = Vec::with_capacity(workers);
    let mut start = 0;
    for w in 0..workers {
        let length = base + usize::from(w < remainder);
        ranges.push((start, length));
        start += length;
    }
    ranges
}

/// Thread pool wrapper using rayon.
pub struct ThreadPool {
    num_threads: usize,
    pool: rayon::ThreadPool,
}

impl ThreadPool {
    /// Create a pool with the default number of threads.
    pub fn new() -> Result<Self> {
        Self::with_threads(0)
    }

    /// Create a pool with a specific number of threads; 0 uses rayon's default.
    pub fn with_threads(num_threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .map_err(|e| KnnError::internal(format!("failed to create thread pool: {}", e)))?;
        Ok(Self {
            num_threads: pool.current_num_threads(),
            pool,
        })
    }

    /// Get the number of threads.
    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Run `f(worker, start, length)` over contiguous ranges of `num_tasks`,
    /// one range per thread. The first error is returned.
    pub fn parallel_for_ranges<F>(&self, num_tasks: usize, f: F) -> Result<()>
    where
        F: Fn(usize, usize, usize) -> Result<()> + Sync + Send,
    {
        let ranges = partition_range(num_tasks, self.num_threads);
        self.pool.install(|| {
            ranges
                .into_par_iter()
                .enumerate()
                .try_for_each(|(worker, (start, length))| f(worker, start, length))
        })
    }
}

/// Execute a map operation with a custom threshold, in parallel only when the
/// number of items reaches `threshold`.
#[inline]
pub fn maybe_parallel_map_threshold<T, U, F>(items: &[T], threshold: usize, f: F) -> Vec<U>
where
    T: Sync,
    U: Send,
    F: Fn(&T) -> U + Sync + Send,
{
    if items.len() >= threshold {
        items.par_iter().map(&f).collect()
    } else {
        items.iter().map(f).collect()
    }
}
