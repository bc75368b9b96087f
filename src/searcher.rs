//! Builder, prebuilt index and searcher traits.
//!
//! Every algorithm follows the same pipeline: a [`Builder`] consumes a
//! [`Matrix`] to produce an immutable [`Prebuilt`] index, which then hands out
//! [`Searcher`]s. A searcher owns scratch space for its queries, so each
//! thread should create its own.

use crate::error::{KnnError, Result};
use crate::matrix::Matrix;
use crate::types::{DataValue, NeighborPair, ObservationIndex};
use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;

/// Interface for searching a prebuilt index.
///
/// Output vectors are cleared and refilled with neighbors sorted by
/// increasing distance. Either output may be `None` if it is not needed.
pub trait Searcher<T: DataValue> {
    /// Find the `k` nearest neighbors of observation `i`, excluding `i`
    /// itself.
    ///
    /// Fewer than `k` neighbors are reported if the index holds no more than
    /// `k` observations.
    fn search(
        &mut self,
        i: ObservationIndex,
        k: usize,
        indices: Option<&mut Vec<ObservationIndex>>,
        distances: Option<&mut Vec<T>>,
    ) -> Result<()>;

    /// Find the `k` nearest observations to `query`.
    fn search_query(
        &mut self,
        query: &[T],
        k: usize,
        indices: Option<&mut Vec<ObservationIndex>>,
        distances: Option<&mut Vec<T>>,
    ) -> Result<()>;

    /// Whether [`Searcher::search_all`] and [`Searcher::search_all_query`]
    /// are supported.
    fn can_search_all(&self) -> bool {
        false
    }

    /// Find all observations within `threshold` of observation `i`,
    /// excluding `i` itself. Returns the number of neighbors found.
    ///
    /// If both outputs are `None`, implementations may skip sorting and only
    /// count the neighbors.
    fn search_all(
        &mut self,
        _i: ObservationIndex,
        _threshold: T,
        _indices: Option<&mut Vec<ObservationIndex>>,
        _distances: Option<&mut Vec<T>>,
    ) -> Result<usize> {
        Err(KnnError::unimplemented("search_all() is not supported by this searcher"))
    }

    /// Find all observations within `threshold` of `query`. Returns the
    /// number of neighbors found.
    fn search_all_query(
        &mut self,
        _query: &[T],
        _threshold: T,
        _indices: Option<&mut Vec<ObservationIndex>>,
        _distances: Option<&mut Vec<T>>,
    ) -> Result<usize> {
        Err(KnnError::unimplemented(
            "search_all_query() is not supported by this searcher",
        ))
    }

    /// Convenience wrapper around [`Searcher::search`] returning pairs.
    fn neighbors_of(&mut self, i: ObservationIndex, k: usize) -> Result<Vec<NeighborPair<T>>> {
        let mut indices = Vec::new();
        let mut distances = Vec::new();
        self.search(i, k, Some(&mut indices), Some(&mut distances))?;
        Ok(indices.into_iter().zip(distances).collect())
    }

    /// Convenience wrapper around [`Searcher::search_query`] returning pairs.
    fn neighbors_of_query(&mut self, query: &[T], k: usize) -> Result<Vec<NeighborPair<T>>> {
        let mut indices = Vec::new();
        let mut distances = Vec::new();
        self.search_query(query, k, Some(&mut indices), Some(&mut distances))?;
        Ok(indices.into_iter().zip(distances).collect())
    }
}

/// Immutable search index produced by a [`Builder`].
pub trait Prebuilt<T: DataValue>: Debug + Send + Sync {
    /// Number of observations in the index.
    fn num_observations(&self) -> ObservationIndex;

    /// Number of dimensions of each observation.
    fn num_dimensions(&self) -> usize;

    /// Create a searcher for this index.
    fn initialize(&self) -> Box<dyn Searcher<T> + '_>;

    /// Save the index to files starting with `prefix`, to be reloaded with
    /// [`crate::persistence::load_prebuilt`].
    ///
    /// Directories in `prefix` should already exist.
    fn save(&self, _prefix: &Path) -> Result<()> {
        Err(KnnError::unimplemented("saving is not supported by this index"))
    }
}

/// Interface for building a [`Prebuilt`] index from a matrix.
pub trait Builder<T: DataValue>: Send + Sync {
    /// Build an index from the observations in `matrix`.
    fn build(&self, matrix: &dyn Matrix<T>) -> Result<Box<dyn Prebuilt<T>>>;

    /// Build an index that can be shared across threads.
    fn build_shared(&self, matrix: &dyn Matrix<T>) -> Result<Arc<dyn Prebuilt<T>>> {
        self.build(matrix).map(Arc::from)
    }
}

pub(crate) fn check_observation(i: ObservationIndex, num_observations: ObservationIndex) -> Result<()> {
    if i >= num_observations {
        return Err(KnnError::out_of_range(format!(
            "observation {} is out of range for an index of {} observations",
            i, num_observations
        )));
    }
    Ok(())
}

pub(crate) fn check_query<T>(query: &[T], num_dimensions: usize) -> Result<()> {
    if query.len() != num_dimensions {
        return Err(KnnError::invalid_argument(format!(
            "query has {} dimensions but the index has {}",
            query.len(),
            num_dimensions
        )));
    }
    Ok(())
}

pub(crate) fn clear_outputs<T>(
    indices: Option<&mut Vec<ObservationIndex>>,
    distances: Option<&mut Vec<T>>,
) {
    if let Some(out) = indices {
        out.clear();
    }
    if let Some(out) = distances {
        out.clear();
    }
}
