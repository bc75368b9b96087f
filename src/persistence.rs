//! Saving and loading prebuilt indices.
//!
//! A prebuilt index is saved as a set of files sharing a path prefix. The
//! prefix is used verbatim, so `dir/` places files inside `dir` while
//! `dir/index_` gives them an `index_` stem. Every index writes:
//!
//! - `ALGORITHM`: the name of the algorithm, used to pick a loader.
//! - `CONFIG.json`: dimensions, number of observations, numeric type and
//!   algorithm-specific sizes.
//! - `DISTANCE`: the name of the distance metric, where one is used.
//!
//! plus raw little-endian arrays for the algorithm's own data.

use crate::brute_force::{load_bruteforce_prebuilt, BRUTEFORCE_ALGORITHM};
use crate::distances::MetricRegistry;
use crate::error::{ErrorCode, KnnError, Result};
use crate::kmknn::{load_kmknn_prebuilt, KMKNN_ALGORITHM};
use crate::l2_normalized::{load_l2_normalized_prebuilt, L2_NORMALIZED_ALGORITHM};
use crate::searcher::Prebuilt;
use crate::types::{DataValue, NumericType, ObservationIndex, StoredValue};
use crate::vptree::{load_vptree_prebuilt, VPTREE_ALGORITHM};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ffi::OsString;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// File holding the algorithm name.
pub const ALGORITHM_FILE: &str = "ALGORITHM";

/// File holding the serialized [`PrebuiltConfig`].
pub const CONFIG_FILE: &str = "CONFIG.json";

/// Append `name` to a path prefix without inserting a separator.
pub fn prefixed(prefix: &Path, name: &str) -> PathBuf {
    let mut joined: OsString = prefix.as_os_str().to_os_string();
    joined.push(name);
    PathBuf::from(joined)
}

fn open_failure(path: &Path, err: std::io::Error) -> KnnError {
    KnnError::io(format!(
        "failed to open a binary file at '{}': {}",
        path.display(),
        err
    ))
}

/// Save an array as little-endian values to `path`.
///
/// Any directories in the path should already exist.
pub fn quick_save<V: StoredValue>(path: &Path, contents: &[V]) -> Result<()> {
    let file = File::create(path).map_err(|e| open_failure(path, e))?;
    let mut bytes = Vec::with_capacity(contents.len() * V::BYTES);
    for &value in contents {
        value.write_le(&mut bytes);
    }

    let mut writer = BufWriter::new(file);
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Read `length` little-endian values from `path`.
///
/// Trailing bytes are ignored; a file that is too short is reported as data
/// loss.
pub fn quick_load<V: StoredValue>(path: &Path, length: usize) -> Result<Vec<V>> {
    let file = File::open(path).map_err(|e| open_failure(path, e))?;
    let total = length
        .checked_mul(V::BYTES)
        .ok_or_else(|| KnnError::out_of_range("array size overflows usize"))?;

    let mut bytes = vec![0u8; total];
    BufReader::new(file).read_exact(&mut bytes).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            KnnError::data_loss(format!(
                "expected {} {} values in '{}'",
                length,
                V::NUMERIC_TYPE,
                path.display()
            ))
        } else {
            KnnError::from(e)
        }
    })?;

    Ok(bytes.chunks_exact(V::BYTES).map(V::read_le).collect())
}

/// Save a string to `path`, without a trailing newline.
pub fn quick_save_string(path: &Path, contents: &str) -> Result<()> {
    let mut file = File::create(path).map_err(|e| open_failure(path, e))?;
    file.write_all(contents.as_bytes())?;
    Ok(())
}

/// Read the entire contents of `path` as a string.
pub fn quick_load_as_string(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| open_failure(path, e))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).map_err(|e| {
        if e.kind() == std::io::ErrorKind::InvalidData {
            KnnError::data_loss(format!("'{}' is not valid UTF-8", path.display()))
        } else {
            KnnError::from(e)
        }
    })?;
    Ok(contents)
}

/// Metadata saved alongside every prebuilt index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrebuiltConfig {
    /// Number of observations in the index.
    pub num_observations: ObservationIndex,

    /// Number of dimensions of each observation.
    pub num_dimensions: usize,

    /// Type of the stored data and distances.
    pub numeric_type: NumericType,

    /// Number of tree nodes, for VP trees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_nodes: Option<usize>,

    /// Number of non-empty clusters, for KMKNN.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_centers: Option<usize>,
}

impl PrebuiltConfig {
    /// Create a configuration for an index holding values of type `T`.
    pub fn new<T: StoredValue>(num_observations: ObservationIndex, num_dimensions: usize) -> Self {
        Self {
            num_observations,
            num_dimensions,
            numeric_type: T::NUMERIC_TYPE,
            num_nodes: None,
            num_centers: None,
        }
    }

    /// Set the number of tree nodes.
    pub fn with_num_nodes(mut self, num_nodes: usize) -> Self {
        self.num_nodes = Some(num_nodes);
        self
    }

    /// Set the number of cluster centers.
    pub fn with_num_centers(mut self, num_centers: usize) -> Self {
        self.num_centers = Some(num_centers);
        self
    }

    /// Total number of stored values, i.e. dimensions times observations.
    pub fn data_length(&self) -> Result<usize> {
        self.num_dimensions
            .checked_mul(self.num_observations as usize)
            .ok_or_else(|| KnnError::out_of_range("saved matrix size overflows usize"))
    }

    /// Write to `prefix + "CONFIG.json"`.
    pub fn save(&self, prefix: &Path) -> Result<()> {
        let path = prefixed(prefix, CONFIG_FILE);
        let json = serde_json::to_string_pretty(self)?;
        quick_save_string(&path, &json)
    }

    /// Read from `prefix + "CONFIG.json"`.
    pub fn load(prefix: &Path) -> Result<Self> {
        let path = prefixed(prefix, CONFIG_FILE);
        let json = quick_load_as_string(&path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Check that the saved values have type `T`.
    pub fn check_numeric_type<T: StoredValue>(&self) -> Result<()> {
        if self.numeric_type != T::NUMERIC_TYPE {
            return Err(KnnError::invalid_argument(format!(
                "saved index holds {} values but {} values were requested",
                self.numeric_type,
                T::NUMERIC_TYPE
            )));
        }
        Ok(())
    }

    /// Fetch a required algorithm-specific field.
    pub fn require(field: Option<usize>, name: &str) -> Result<usize> {
        field.ok_or_else(|| {
            KnnError::new(
                ErrorCode::DataLoss,
                format!("saved configuration is missing '{}'", name),
            )
        })
    }
}

/// Write the algorithm name to `prefix + "ALGORITHM"`.
pub fn save_algorithm(prefix: &Path, name: &str) -> Result<()> {
    quick_save_string(&prefixed(prefix, ALGORITHM_FILE), name)
}

/// Function that reconstitutes a prebuilt index from files at a prefix.
///
/// The registry is passed through so that wrapper indices can load the
/// index they wrap.
pub type LoadPrebuiltFunction<T> = fn(&Path, &LoadRegistry<T>) -> Result<Box<dyn Prebuilt<T>>>;

/// Mapping of algorithm names to loading functions.
///
/// Custom [`Prebuilt`] implementations can be made loadable by registering
/// the name they write to `ALGORITHM`.
pub struct LoadRegistry<T: DataValue> {
    loaders: HashMap<String, LoadPrebuiltFunction<T>>,
    metrics: MetricRegistry<T>,
}

impl<T: DataValue> LoadRegistry<T> {
    /// Create a registry without any algorithms, using the default metrics.
    pub fn empty() -> Self {
        Self {
            loaders: HashMap::new(),
            metrics: MetricRegistry::default(),
        }
    }

    /// Register (or replace) the loader for `name`.
    pub fn register(&mut self, name: impl Into<String>, loader: LoadPrebuiltFunction<T>) {
        self.loaders.insert(name.into(), loader);
    }

    /// Check whether a loader exists for `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.loaders.contains_key(name)
    }

    /// Registry used to reload distance metrics.
    pub fn metrics(&self) -> &MetricRegistry<T> {
        &self.metrics
    }

    /// Mutable access to the metric registry, e.g. to add custom metrics.
    pub fn metrics_mut(&mut self) -> &mut MetricRegistry<T> {
        &mut self.metrics
    }

    /// Load the prebuilt index saved at `prefix`.
    pub fn load(&self, prefix: &Path) -> Result<Box<dyn Prebuilt<T>>> {
        let path = prefixed(prefix, ALGORITHM_FILE);
        let method = quick_load_as_string(&path)?;
        let loader = self.loaders.get(method.as_str()).ok_or_else(|| {
            KnnError::not_found(format!(
                "cannot find load_prebuilt method for '{}' at '{}'",
                method,
                path.display()
            ))
        })?;

        tracing::debug!(method = %method, prefix = %prefix.display(), "loading prebuilt index");
        loader(prefix, self)
    }

    /// Load the prebuilt index saved at `prefix` into an [`Arc`].
    pub fn load_shared(&self, prefix: &Path) -> Result<Arc<dyn Prebuilt<T>>> {
        self.load(prefix).map(Arc::from)
    }
}

impl<T: DataValue> Default for LoadRegistry<T> {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(BRUTEFORCE_ALGORITHM, load_bruteforce_prebuilt::<T>);
        registry.register(VPTREE_ALGORITHM, load_vptree_prebuilt::<T>);
        registry.register(KMKNN_ALGORITHM, load_kmknn_prebuilt::<T>);
        registry.register(L2_NORMALIZED_ALGORITHM, load_l2_normalized_prebuilt::<T>);
        registry
    }
}

/// Load a prebuilt index saved at `prefix` with the default registry.
pub fn load_prebuilt<T: DataValue>(prefix: &Path) -> Result<Box<dyn Prebuilt<T>>> {
    LoadRegistry::default().load(prefix)
}

/// Load a prebuilt index saved at `prefix` into an [`Arc`].
pub fn load_prebuilt_shared<T: DataValue>(prefix: &Path) -> Result<Arc<dyn Prebuilt<T>>> {
    LoadRegistry::default().load_shared(prefix)
}
