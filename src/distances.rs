//! Distance metrics.
//!
//! A metric exposes a *raw* distance that is cheap to compute and monotonic in
//! the actual distance, e.g. the squared Euclidean distance. Searches compare
//! raw distances where possible and only call [`DistanceMetric::normalize`]
//! on the values they report.

use crate::error::{KnnError, Result};
use crate::persistence::{prefixed, quick_load_as_string, quick_save_string};
use crate::types::DataValue;
use std::collections::HashMap;
use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;

/// File, appended to a save prefix, holding the metric's name.
pub const DISTANCE_FILE: &str = "DISTANCE";

/// Interface for a distance metric.
pub trait DistanceMetric<T>: Send + Sync + Debug {
    /// Raw distance between `x` and `y`, which must have the same length.
    ///
    /// `raw(x, y) > raw(x, z)` iff `d(x, y) > d(x, z)`.
    fn raw(&self, x: &[T], y: &[T]) -> T;

    /// Convert a raw distance into the actual distance.
    fn normalize(&self, raw: T) -> T;

    /// Convert an actual distance back into a raw distance.
    fn denormalize(&self, norm: T) -> T;

    /// Name under which the metric is saved and reloaded.
    fn name(&self) -> &'static str;
}

/// Euclidean distance. The raw distance is the squared Euclidean distance.
#[derive(Debug, Clone, Copy, Default)]
pub struct EuclideanDistance;

impl<T: DataValue> DistanceMetric<T> for EuclideanDistance {
    #[inline]
    fn raw(&self, x: &[T], y: &[T]) -> T {
        let mut sum = T::zero();
        for (&a, &b) in x.iter().zip(y.iter()) {
            let delta = a - b;
            sum = sum + delta * delta;
        }
        sum
    }

    #[inline]
    fn normalize(&self, raw: T) -> T {
        raw.sqrt()
    }

    #[inline]
    fn denormalize(&self, norm: T) -> T {
        norm * norm
    }

    fn name(&self) -> &'static str {
        "euclidean"
    }
}

/// Manhattan distance, with no transformation between raw and actual values.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManhattanDistance;

impl<T: DataValue> DistanceMetric<T> for ManhattanDistance {
    #[inline]
    fn raw(&self, x: &[T], y: &[T]) -> T {
        let mut sum = T::zero();
        for (&a, &b) in x.iter().zip(y.iter()) {
            sum = sum + (a - b).abs();
        }
        sum
    }

    #[inline]
    fn normalize(&self, raw: T) -> T {
        raw
    }

    #[inline]
    fn denormalize(&self, norm: T) -> T {
        norm
    }

    fn name(&self) -> &'static str {
        "manhattan"
    }
}

/// Convert raw distances to actual distances in place.
pub(crate) fn normalize_all<T>(metric: &dyn DistanceMetric<T>, values: Option<&mut Vec<T>>)
where
    T: Copy,
{
    if let Some(values) = values {
        for v in values.iter_mut() {
            *v = metric.normalize(*v);
        }
    }
}

/// Save a metric's identity to `prefix + "DISTANCE"`.
pub fn save_metric<T>(metric: &dyn DistanceMetric<T>, prefix: &Path) -> Result<()> {
    quick_save_string(&prefixed(prefix, DISTANCE_FILE), metric.name())
}

/// Constructor for a metric reloaded from disk.
pub type LoadMetricFunction<T> = fn(&Path) -> Result<Arc<dyn DistanceMetric<T>>>;

/// Mapping of metric names to loading functions.
pub struct MetricRegistry<T> {
    loaders: HashMap<String, LoadMetricFunction<T>>,
}

impl<T: DataValue> MetricRegistry<T> {
    /// Create a registry without any metrics.
    pub fn empty() -> Self {
        Self {
            loaders: HashMap::new(),
        }
    }

    /// Register (or replace) the loader for `name`.
    pub fn register(&mut self, name: impl Into<String>, loader: LoadMetricFunction<T>) {
        self.loaders.insert(name.into(), loader);
    }

    /// Check whether a loader exists for `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.loaders.contains_key(name)
    }

    /// Load the metric saved at `prefix` by [`save_metric`].
    pub fn load(&self, prefix: &Path) -> Result<Arc<dyn DistanceMetric<T>>> {
        let path = prefixed(prefix, DISTANCE_FILE);
        let name = quick_load_as_string(&path)?;
        let loader = self.loaders.get(name.as_str()).ok_or_else(|| {
            KnnError::not_found(format!(
                "cannot find distance metric loader for '{}' at '{}'",
                name,
                path.display()
            ))
        })?;
        loader(prefix)
    }
}

impl<T: DataValue> Default for MetricRegistry<T> {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("euclidean", load_euclidean::<T>);
        registry.register("manhattan", load_manhattan::<T>);
        registry
    }
}

fn load_euclidean<T: DataValue>(_prefix: &Path) -> Result<Arc<dyn DistanceMetric<T>>> {
    Ok(Arc::new(EuclideanDistance))
}

fn load_manhattan<T: DataValue>(_prefix: &Path) -> Result<Arc<dyn DistanceMetric<T>>> {
    Ok(Arc::new(ManhattanDistance))
}

/// Load a metric saved at `prefix` using the default registry.
pub fn load_distance_metric<T: DataValue>(prefix: &Path) -> Result<Arc<dyn DistanceMetric<T>>> {
    MetricRegistry::default().load(prefix)
}
