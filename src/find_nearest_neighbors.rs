//! Find the nearest neighbors of every observation in an index.

use crate::error::{KnnError, Result};
use crate::searcher::Prebuilt;
use crate::types::{DataValue, NeighborList, ObservationIndex};
use crate::utils::ThreadPool;
use std::sync::Mutex;

/// Cap the number of neighbors to find for an observation in an index of
/// `num_observations`, which cannot count itself as a neighbor.
pub fn cap_k(k: usize, num_observations: ObservationIndex) -> usize {
    let nobs = num_observations as usize;
    if k < nobs {
        k
    } else {
        nobs.saturating_sub(1)
    }
}

/// Cap the number of neighbors to find for a query against an index of
/// `num_observations`.
pub fn cap_k_query(k: usize, num_observations: ObservationIndex) -> usize {
    k.min(num_observations as usize)
}

/// Run `run(worker, start, length)` over contiguous ranges of `num_tasks`
/// tasks, using up to `num_workers` threads.
///
/// With a single worker the whole range runs on the calling thread.
pub fn parallelize<F>(num_workers: usize, num_tasks: usize, run: F) -> Result<()>
where
    F: Fn(usize, usize, usize) -> Result<()> + Sync + Send,
{
    if num_tasks == 0 {
        return Ok(());
    }
    if num_workers <= 1 || num_tasks == 1 {
        return run(0, 0, num_tasks);
    }

    let pool = ThreadPool::with_threads(num_workers)?;
    pool.parallel_for_ranges(num_tasks, run)
}

/// Search each observation of `prebuilt` in parallel, collecting one output
/// per observation in order.
fn search_every_observation<T, U, F>(
    prebuilt: &dyn Prebuilt<T>,
    num_threads: usize,
    search: F,
) -> Result<Vec<U>>
where
    T: DataValue,
    U: Send,
    F: Fn(&mut dyn crate::searcher::Searcher<T>, ObservationIndex) -> Result<U> + Sync + Send,
{
    let nobs = prebuilt.num_observations() as usize;
    let pieces: Mutex<Vec<(usize, Vec<U>)>> = Mutex::new(Vec::new());

    parallelize(num_threads, nobs, |_, start, length| {
        let mut searcher = prebuilt.initialize();
        let mut piece = Vec::with_capacity(length);
        for i in start..start + length {
            piece.push(search(searcher.as_mut(), i as ObservationIndex)?);
        }
        pieces
            .lock()
            .map_err(|_| KnnError::internal("neighbor collection lock was poisoned"))?
            .push((start, piece));
        Ok(())
    })?;

    let mut pieces = pieces
        .into_inner()
        .map_err(|_| KnnError::internal("neighbor collection lock was poisoned"))?;
    pieces.sort_unstable_by_key(|&(start, _)| start);

    let mut output = Vec::with_capacity(nobs);
    for (_, piece) in pieces {
        output.extend(piece);
    }
    Ok(output)
}

/// Find the `k` nearest neighbors of each observation in `prebuilt`.
///
/// `k` is capped by [`cap_k`]. The output holds one list per observation,
/// sorted by increasing distance.
pub fn find_nearest_neighbors<T: DataValue>(
    prebuilt: &dyn Prebuilt<T>,
    k: usize,
    num_threads: usize,
) -> Result<NeighborList<T>> {
    let k = cap_k(k, prebuilt.num_observations());
    let output = search_every_observation(prebuilt, num_threads, |searcher, i| {
        searcher.neighbors_of(i, k)
    })?;
    tracing::debug!(
        observations = output.len(),
        k,
        threads = num_threads,
        "found nearest neighbors"
    );
    Ok(output)
}

/// Like [`find_nearest_neighbors`], but only the indices are reported.
pub fn find_nearest_neighbors_index_only<T: DataValue>(
    prebuilt: &dyn Prebuilt<T>,
    k: usize,
    num_threads: usize,
) -> Result<Vec<Vec<ObservationIndex>>> {
    let k = cap_k(k, prebuilt.num_observations());
    search_every_observation(prebuilt, num_threads, |searcher, i| {
        let mut indices = Vec::with_capacity(k);
        searcher.search(i, k, Some(&mut indices), None)?;
        Ok(indices)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brute_force::BruteforceBuilder;
    use crate::matrix::SimpleMatrix;
    use crate::searcher::Builder;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_cap_k() {
        assert_eq!(cap_k(5, 10), 5);
        assert_eq!(cap_k(10, 10), 9);
        assert_eq!(cap_k(3, 1), 0);
        assert_eq!(cap_k(3, 0), 0);
        assert_eq!(cap_k_query(5, 10), 5);
        assert_eq!(cap_k_query(15, 10), 10);
        assert_eq!(cap_k_query(1, 0), 0);
    }

    #[test]
    fn test_parallelize_covers_all_tasks() {
        for workers in [1, 2, 5] {
            let seen = AtomicUsize::new(0);
            parallelize(workers, 37, |_, start, length| {
                assert!(start + length <= 37);
                seen.fetch_add(length, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
            assert_eq!(seen.load(Ordering::SeqCst), 37);
        }
        parallelize(3, 0, |_, _, _| Err(KnnError::internal("never run"))).unwrap();
    }

    #[test]
    fn test_find_nearest_neighbors() {
        let data: Vec<f64> = (0..40).map(|i| ((i * 7) % 13) as f64).collect();
        let mat = SimpleMatrix::new(2, 20, &data).unwrap();
        let index = BruteforceBuilder::euclidean().build(&mat).unwrap();

        let serial = find_nearest_neighbors(index.as_ref(), 4, 1).unwrap();
        let parallel = find_nearest_neighbors(index.as_ref(), 4, 3).unwrap();
        assert_eq!(serial.len(), 20);
        assert_eq!(serial, parallel);

        let mut searcher = index.initialize();
        for (i, neighbors) in serial.iter().enumerate() {
            assert_eq!(neighbors, &searcher.neighbors_of(i as u32, 4).unwrap());
        }

        let indices = find_nearest_neighbors_index_only(index.as_ref(), 4, 2).unwrap();
        for (found, pairs) in indices.iter().zip(serial.iter()) {
            let expected: Vec<u32> = pairs.iter().map(|&(i, _)| i).collect();
            assert_eq!(found, &expected);
        }
    }

    #[test]
    fn test_k_is_capped() {
        let data = vec![0.0f32, 1.0, 3.0];
        let mat = SimpleMatrix::new(1, 3, &data).unwrap();
        let index = BruteforceBuilder::euclidean().build(&mat).unwrap();
        let found = find_nearest_neighbors(index.as_ref(), 10, 2).unwrap();
        assert!(found.iter().all(|neighbors| neighbors.len() == 2));
        assert_eq!(found[0], vec![(1, 1.0), (2, 3.0)]);
    }
}
