//! Utility functions and types for knncolle.

pub(crate) mod parallel;

pub use parallel::{partition_range, ThreadPool, MIN_PARALLEL_SIZE};
