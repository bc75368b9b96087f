//! Input matrices for building search indices.
//!
//! A matrix holds `num_observations()` observations, each a contiguous run of
//! `num_dimensions()` values. Builders consume it through a sequential
//! [`MatrixExtractor`] so that wrappers such as the L2-normalizing matrix can
//! transform each observation on the fly.

use crate::error::{KnnError, Result};
use crate::types::{DataValue, ObservationIndex};

/// Sequential accessor for the observations of a [`Matrix`].
pub trait MatrixExtractor<T> {
    /// Coordinates of the next observation, or `None` once all observations
    /// have been returned.
    ///
    /// The first call returns the first observation, the second call returns
    /// the second, and so on. The slice is only valid until the next call.
    fn next(&mut self) -> Option<&[T]>;
}

/// Interface for observation-level matrix data.
pub trait Matrix<T>: Sync {
    /// Number of observations.
    fn num_observations(&self) -> ObservationIndex;

    /// Number of dimensions.
    fn num_dimensions(&self) -> usize;

    /// Create a new extractor starting at the first observation.
    fn new_extractor(&self) -> Box<dyn MatrixExtractor<T> + '_>;
}

/// Simple wrapper for an in-memory matrix.
///
/// Observations are stored contiguously, i.e., a column-major matrix where
/// columns are observations and rows are dimensions.
#[derive(Debug, Clone, Copy)]
pub struct SimpleMatrix<'a, T> {
    num_dimensions: usize,
    num_observations: ObservationIndex,
    data: &'a [T],
}

impl<'a, T: DataValue> SimpleMatrix<'a, T> {
    /// Wrap `data`, which must hold `num_dimensions * num_observations` values.
    pub fn new(
        num_dimensions: usize,
        num_observations: ObservationIndex,
        data: &'a [T],
    ) -> Result<Self> {
        let expected = num_dimensions
            .checked_mul(num_observations as usize)
            .ok_or_else(|| KnnError::out_of_range("matrix size overflows usize"))?;
        if data.len() != expected {
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
        })
    }

    /// Build a matrix view over nested row vectors, flattening into `buffer`.
    pub fn from_rows(rows: &[Vec<T>], buffer: &'a mut Vec<T>) -> Result<Self> {
        let ndim = rows.first().map(|r| r.len()).unwrap_or(0);
        buffer.clear();
        buffer.reserve(ndim * rows.len());
        for (i, row) in rows.iter().enumerate() {
            if row.len() != ndim {
                return Err(KnnError::invalid_argument(format!(
                    "observation {} has {} dimensions, expected {}",
                    i,
                    row.len(),
                    ndim
                )));
            }
            buffer.extend_from_slice(row);
        }

        let nobs = ObservationIndex::try_from(rows.len())
            .map_err(|_| KnnError::out_of_range("too many observations"))?;
        let data: &'a Vec<T> = buffer;
        SimpleMatrix::new(ndim, nobs, data.as_slice())
    }

    /// Underlying data.
    pub fn data(&self) -> &'a [T] {
        self.data
    }
}

struct SimpleMatrixExtractor<'a, T> {
    data: &'a [T],
    dim: usize,
    at: usize,
    total: usize,
}

impl<T> MatrixExtractor<T> for SimpleMatrixExtractor<'_, T> {
    fn next(&mut self) -> Option<&[T]> {
        if self.at >= self.total {
            return None;
        }
        let start = self.at * self.dim;
        self.at += 1;
        Some(&self.data[start..start + self.dim])
    }
}

impl<T: DataValue> Matrix<T> for SimpleMatrix<'_, T> {
    fn num_observations(&self) -> ObservationIndex {
        self.num_observations
    }

    fn num_dimensions(&self) -> usize {
        self.num_dimensions
    }

    fn new_extractor(&self) -> Box<dyn MatrixExtractor<T> + '_> {
        Box::new(SimpleMatrixExtractor {
            data: self.data,
            dim: self.num_dimensions,
            at: 0,
            total: self.num_observations as usize,
        })
    }
}

/// Copy all observations of `matrix` into a contiguous store.
pub fn copy_observations<T: DataValue>(matrix: &dyn Matrix<T>) -> Result<Vec<T>> {
    let ndim = matrix.num_dimensions();
    let nobs = matrix.num_observations() as usize;
    let mut store = Vec::with_capacity(ndim * nobs);

    let mut extractor = matrix.new_extractor();
    for o in 0..nobs {
        let obs = extractor.next().ok_or_else(|| {
            KnnError::internal(format!("matrix extractor exhausted after {} observations", o))
        })?;
        if obs.len() != ndim {
            return Err(KnnError::internal(format!(
                "extractor returned {} values for a {}-dimensional matrix",
                obs.len(),
                ndim
            )));
        }
        store.extend_from_slice(obs);
    }

    Ok(store)
}

/// Gather observations from a contiguous store into a new order, so that
/// position `p` of the output holds observation `order[p]` of the input.
pub(crate) fn gather_observations<T: Copy>(
    data: &[T],
    num_dimensions: usize,
    order: &[ObservationIndex],
) -> Vec<T> {
    let mut output = Vec::with_capacity(data.len());
    for &o in order {
        let start = o as usize * num_dimensions;
        output.extend_from_slice(&data[start..start + num_dimensions]);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_matrix_extraction() {
        let data: Vec<f64> = (0..20).map(|x| x as f64).collect();
        let mat = SimpleMatrix::new(4, 5, &data).unwrap();
        assert_eq!(mat.num_observations(), 5);
        assert_eq!(mat.num_dimensions(), 4);

        let mut ext = mat.new_extractor();
        for i in 0..5 {
            let obs = ext.next().unwrap();
            assert_eq!(obs, &data[i * 4..(i + 1) * 4]);
        }
        assert!(ext.next().is_none());
    }

    #[test]
    fn test_simple_matrix_bad_length() {
        let data = vec![1.0f32; 7];
        assert!(SimpleMatrix::new(2, 4, &data).is_err());
    }

    #[test]
    fn test_from_rows() {
        let rows = vec![vec![1.0f32, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]];
        let mut buffer = Vec::new();
        let mat = SimpleMatrix::from_rows(&rows, &mut buffer).unwrap();
        assert_eq!(mat.num_observations(), 3);
        assert_eq!(copy_observations(&mat).unwrap(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        let ragged = vec![vec![1.0f32, 2.0], vec![3.0]];
        let mut buffer = Vec::new();
        assert!(SimpleMatrix::from_rows(&ragged, &mut buffer).is_err());
    }

    #[test]
    fn test_gather_observations() {
        let data = vec![0.0f32, 0.5, 1.0, 1.5, 2.0, 2.5];
        let gathered = gather_observations(&data, 2, &[2, 0, 1]);
        assert_eq!(gathered, vec![2.0, 2.5, 0.0, 0.5, 1.0, 1.5]);
    }

    #[test]
    fn test_empty_matrix() {
        let data: Vec<f64> = Vec::new();
        let mat = SimpleMatrix::new(3, 0, &data).unwrap();
        assert!(copy_observations(&mat).unwrap().is_empty());
        assert!(mat.new_extractor().next().is_none());
    }
}
