//! Searching on L2-normalized data.
//!
//! Each observation and query is divided by its L2 norm before it reaches the
//! wrapped algorithm, so Euclidean distances on the normalized vectors stand
//! in for cosine distances.

use crate::error::Result;
use crate::matrix::{Matrix, MatrixExtractor};
use crate::persistence::{prefixed, save_algorithm, LoadRegistry};
use crate::searcher::{check_query, Builder, Prebuilt, Searcher};
use crate::types::{DataValue, ObservationIndex};
use std::path::Path;
use std::sync::Arc;

/// Name written to `ALGORITHM` by saved L2-normalized indices.
pub const L2_NORMALIZED_ALGORITHM: &str = "knncolle::L2Normalized";

/// Files of the wrapped index are saved with this suffix appended to the
/// prefix.
const INNER_PREFIX: &str = "normalized_";

/// Divide `values` by their L2 norm in place.
///
/// All-zero vectors are left unchanged.
pub fn l2_normalize<T: DataValue>(values: &mut [T]) {
    let squared = values.iter().fold(T::zero(), |acc, &v| acc + v * v);
    if squared == T::zero() {
        return;
    }
    let norm = squared.sqrt();
    for v in values.iter_mut() {
        *v = *v / norm;
    }
}

/// Matrix whose observations are L2-normalized on extraction.
pub struct L2NormalizedMatrix<'a, T> {
    matrix: &'a dyn Matrix<T>,
}

impl<'a, T: DataValue> L2NormalizedMatrix<'a, T> {
    /// Wrap `matrix`.
    pub fn new(matrix: &'a dyn Matrix<T>) -> Self {
        Self { matrix }
    }
}

struct L2NormalizedExtractor<'a, T> {
    inner: Box<dyn MatrixExtractor<T> + 'a>,
    buffer: Vec<T>,
}

impl<T: DataValue> MatrixExtractor<T> for L2NormalizedExtractor<'_, T> {
    fn next(&mut self) -> Option<&[T]> {
        let obs = self.inner.next()?;
        self.buffer.clear();
        self.buffer.extend_from_slice(obs);
        l2_normalize(&mut self.buffer);
        Some(&self.buffer)
    }
}

impl<T: DataValue> Matrix<T> for L2NormalizedMatrix<'_, T> {
    fn num_observations(&self) -> ObservationIndex {
        self.matrix.num_observations()
    }

    fn num_dimensions(&self) -> usize {
        self.matrix.num_dimensions()
    }

    fn new_extractor(&self) -> Box<dyn MatrixExtractor<T> + '_> {
        Box::new(L2NormalizedExtractor {
            inner: self.matrix.new_extractor(),
            buffer: Vec::with_capacity(self.matrix.num_dimensions()),
        })
    }
}

/// Builds an index from another builder after L2-normalizing the data.
#[derive(Clone)]
pub struct L2NormalizedBuilder<T: DataValue> {
    inner: Arc<dyn Builder<T>>,
}

impl<T: DataValue> L2NormalizedBuilder<T> {
    /// Wrap `inner`, which is usually configured with the Euclidean distance.
    pub fn new(inner: Arc<dyn Builder<T>>) -> Self {
        Self { inner }
    }

    /// The wrapped builder.
    pub fn inner(&self) -> &Arc<dyn Builder<T>> {
        &self.inner
    }
}

impl<T: DataValue> Builder<T> for L2NormalizedBuilder<T> {
    fn build(&self, matrix: &dyn Matrix<T>) -> Result<Box<dyn Prebuilt<T>>> {
        let normalized = L2NormalizedMatrix::new(matrix);
        let inner = self.inner.build(&normalized)?;
        Ok(Box::new(L2NormalizedPrebuilt { inner }))
    }
}

/// Index built on L2-normalized data.
#[derive(Debug)]
pub struct L2NormalizedPrebuilt<T: DataValue> {
    inner: Box<dyn Prebuilt<T>>,
}

impl<T: DataValue> L2NormalizedPrebuilt<T> {
    /// Wrap an index that was built on L2-normalized data.
    pub fn new(inner: Box<dyn Prebuilt<T>>) -> Self {
        Self { inner }
    }
}

impl<T: DataValue> Prebuilt<T> for L2NormalizedPrebuilt<T> {
    fn num_observations(&self) -> ObservationIndex {
        self.inner.num_observations()
    }

    fn num_dimensions(&self) -> usize {
        self.inner.num_dimensions()
    }

    fn initialize(&self) -> Box<dyn Searcher<T> + '_> {
        Box::new(L2NormalizedSearcher {
            inner: self.inner.initialize(),
            num_dimensions: self.inner.num_dimensions(),
            buffer: Vec::with_capacity(self.inner.num_dimensions()),
        })
    }

    fn save(&self, prefix: &Path) -> Result<()> {
        save_algorithm(prefix, L2_NORMALIZED_ALGORITHM)?;
        self.inner.save(&prefixed(prefix, INNER_PREFIX))
    }
}

/// Reload an L2-normalized index saved by [`Prebuilt::save`].
pub fn load_l2_normalized_prebuilt<T: DataValue>(
    prefix: &Path,
    registry: &LoadRegistry<T>,
) -> Result<Box<dyn Prebuilt<T>>> {
    let inner = registry.load(&prefixed(prefix, INNER_PREFIX))?;
    Ok(Box::new(L2NormalizedPrebuilt { inner }))
}

/// Searcher that normalizes each query before delegating.
pub struct L2NormalizedSearcher<'a, T: DataValue> {
    inner: Box<dyn Searcher<T> + 'a>,
    num_dimensions: usize,
    buffer: Vec<T>,
}

impl<T: DataValue> L2NormalizedSearcher<'_, T> {
    fn normalize_query(&mut self, query: &[T]) -> Result<()> {
        check_query(query, self.num_dimensions)?;
        self.buffer.clear();
        self.buffer.extend_from_slice(query);
        l2_normalize(&mut self.buffer);
        Ok(())
    }
}

impl<T: DataValue> Searcher<T> for L2NormalizedSearcher<'_, T> {
    fn search(
        &mut self,
        i: ObservationIndex,
        k: usize,
        indices: Option<&mut Vec<ObservationIndex>>,
        distances: Option<&mut Vec<T>>,
    ) -> Result<()> {
        self.inner.search(i, k, indices, distances)
    }

    fn search_query(
        &mut self,
        query: &[T],
        k: usize,
        indices: Option<&mut Vec<ObservationIndex>>,
        distances: Option<&mut Vec<T>>,
    ) -> Result<()> {
        self.normalize_query(query)?;
        self.inner.search_query(&self.buffer, k, indices, distances)
    }

    fn can_search_all(&self) -> bool {
        self.inner.can_search_all()
    }

    fn search_all(
        &mut self,
        i: ObservationIndex,
        threshold: T,
        indices: Option<&mut Vec<ObservationIndex>>,
        distances: Option<&mut Vec<T>>,
    ) -> Result<usize> {
        self.inner.search_all(i, threshold, indices, distances)
    }

    fn search_all_query(
        &mut self,
        query: &[T],
        threshold: T,
        indices: Option<&mut Vec<ObservationIndex>>,
        distances: Option<&mut Vec<T>>,
    ) -> Result<usize> {
        self.normalize_query(query)?;
        self.inner
            .search_all_query(&self.buffer, threshold, indices, distances)
    }
}
