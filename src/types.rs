//! Core type definitions for knncolle.
//!
//! This module contains the fundamental type aliases and traits used throughout the library.

use num_traits::Float;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Index type for observations in a dataset.
/// Can represent up to 4 billion observations with u32.
pub type ObservationIndex = u32;

/// A nearest neighbor result: (index, distance).
pub type NeighborPair<T> = (ObservationIndex, T);

/// Neighbors of multiple observations.
///
/// Each entry corresponds to an observation and holds its neighbors sorted by
/// increasing distance.
pub type NeighborList<T> = Vec<Vec<NeighborPair<T>>>;

/// Identity of a numeric type, recorded when saving prebuilt indices so that
/// the loader can check it is reconstituting the same types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NumericType {
    #[serde(rename = "uint8")]
    UInt8,
    #[serde(rename = "int8")]
    Int8,
    #[serde(rename = "uint16")]
    UInt16,
    #[serde(rename = "int16")]
    Int16,
    #[serde(rename = "uint32")]
    UInt32,
    #[serde(rename = "int32")]
    Int32,
    #[serde(rename = "uint64")]
    UInt64,
    #[serde(rename = "int64")]
    Int64,
    #[serde(rename = "float")]
    Float,
    #[serde(rename = "double")]
    Double,
    #[serde(rename = "unknown")]
    Unknown,
}

impl NumericType {
    /// Get the name of this numeric type.
    pub fn name(&self) -> &'static str {
        match self {
            NumericType::UInt8 => "uint8",
            NumericType::Int8 => "int8",
            NumericType::UInt16 => "uint16",
            NumericType::Int16 => "int16",
            NumericType::UInt32 => "uint32",
            NumericType::Int32 => "int32",
            NumericType::UInt64 => "uint64",
            NumericType::Int64 => "int64",
            NumericType::Float => "float",
            NumericType::Double => "double",
            NumericType::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for NumericType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Trait for values that can be written to and read from disk as
/// little-endian arrays.
pub trait StoredValue: Copy + Default + Send + Sync + 'static {
    /// Numeric type recorded alongside saved arrays.
    const NUMERIC_TYPE: NumericType;

    /// Size of one value in bytes.
    const BYTES: usize;

    /// Append the little-endian encoding of this value.
    fn write_le(self, out: &mut Vec<u8>);

    /// Decode a value from exactly `Self::BYTES` little-endian bytes.
    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! impl_stored_value {
    ($ty:ty, $numeric:expr) => {
        impl StoredValue for $ty {
            const NUMERIC_TYPE: NumericType = $numeric;
            const BYTES: usize = std::mem::size_of::<$ty>();

            #[inline]
            fn write_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            #[inline]
            fn read_le(bytes: &[u8]) -> Self {
                let mut buf = [0u8; std::mem::size_of::<$ty>()];
                buf.copy_from_slice(bytes);
                <$ty>::from_le_bytes(buf)
            }
        }
    };
}

impl_stored_value!(u8, NumericType::UInt8);
impl_stored_value!(i8, NumericType::Int8);
impl_stored_value!(u16, NumericType::UInt16);
impl_stored_value!(i16, NumericType::Int16);
impl_stored_value!(u32, NumericType::UInt32);
impl_stored_value!(i32, NumericType::Int32);
impl_stored_value!(u64, NumericType::UInt64);
impl_stored_value!(i64, NumericType::Int64);
impl_stored_value!(f32, NumericType::Float);
impl_stored_value!(f64, NumericType::Double);

/// Get the numeric type of `T`.
pub fn numeric_type_of<T: StoredValue>() -> NumericType {
    T::NUMERIC_TYPE
}

/// Trait for floating-point types used as observation data and distances.
pub trait DataValue: Float + StoredValue + Debug {
    /// Totally ordered wrapper, used for heaps and sorting.
    type Ordered: Ord + Copy + Debug + Send + Sync;

    /// Wrap this value for total ordering.
    fn ordered(self) -> Self::Ordered;

    /// Unwrap a totally ordered value.
    fn from_ordered(value: Self::Ordered) -> Self;

    /// Convert from f64, used for constants and k-means accumulators.
    fn of_f64(v: f64) -> Self;

    /// Convert to f64.
    fn as_f64(self) -> f64;
}

impl DataValue for f32 {
    type Ordered = OrderedFloat<f32>;

    #[inline]
    fn ordered(self) -> Self::Ordered {
        OrderedFloat(self)
    }

    #[inline]
    fn from_ordered(value: Self::Ordered) -> Self {
        value.0
    }

    #[inline]
    fn of_f64(v: f64) -> Self {
        v as f32
    }

    #[inline]
    fn as_f64(self) -> f64 {
        self as f64
    }
}

impl DataValue for f64 {
    type Ordered = OrderedFloat<f64>;

    #[inline]
    fn ordered(self) -> Self::Ordered {
        OrderedFloat(self)
    }

    #[inline]
    fn from_ordered(value: Self::Ordered) -> Self {
        value.0
    }

    #[inline]
    fn of_f64(v: f64) -> Self {
        v
    }

    #[inline]
    fn as_f64(self) -> f64 {
        self
    }
}
