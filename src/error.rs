//! Error types for knncolle.
//!
//! Every fallible operation returns a [`KnnError`] carrying a status-like
//! [`ErrorCode`] and a human readable message.

use std::fmt;
use thiserror::Error;

/// Error codes for neighbor search operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Invalid argument provided.
    InvalidArgument,
    /// Resource not found.
    NotFound,
    /// Index or value out of range.
    OutOfRange,
    /// Operation not supported by this implementation.
    Unimplemented,
    /// Failed to read or write a file.
    Io,
    /// Stored data was truncated or malformed.
    DataLoss,
    /// Internal error.
    Internal,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::InvalidArgument => write!(f, "INVALID_ARGUMENT"),
            ErrorCode::NotFound => write!(f, "NOT_FOUND"),
            ErrorCode::OutOfRange => write!(f, "OUT_OF_RANGE"),
            ErrorCode::Unimplemented => write!(f, "UNIMPLEMENTED"),
            ErrorCode::Io => write!(f, "IO"),
            ErrorCode::DataLoss => write!(f, "DATA_LOSS"),
            ErrorCode::Internal => write!(f, "INTERNAL"),
        }
    }
}

/// Main error type for knncolle operations.
#[derive(Error, Debug, Clone)]
pub struct KnnError {
    code: ErrorCode,
    message: String,
}

impl KnnError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Get the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, msg)
    }

    /// Create a not found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, msg)
    }

    /// Create an out of range error.
    pub fn out_of_range(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::OutOfRange, msg)
    }

    /// Create an unimplemented error.
    pub fn unimplemented(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unimplemented, msg)
    }

    /// Create an I/O error.
    pub fn io(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Io, msg)
    }

    /// Create a data loss error.
    pub fn data_loss(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::DataLoss, msg)
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, msg)
    }
}

impl fmt::Display for KnnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl From<std::io::Error> for KnnError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof => KnnError::data_loss(err.to_string()),
            _ => KnnError::io(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for KnnError {
    fn from(err: serde_json::Error) -> Self {
        KnnError::invalid_argument(format!("malformed JSON: {}", err))
    }
}

/// Result type alias for knncolle operations.
pub type Result<T> = std::result::Result<T, KnnError>;
