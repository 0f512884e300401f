//! Error types for the reconstruction attack
//!
//! Configuration errors are raised before the reconstruction loop starts,
//! input errors at load time, and numerical divergence mid-loop. Nothing is
//! retried: every failure is returned to the caller.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for attack setup and execution
#[derive(Debug, Error)]
pub enum LeakageError {
    /// Invalid configuration value (batch size, intervals, optimizer settings)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Tensor shape does not match what the consumer expects
    #[error("Shape mismatch for {what}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Index outside of a dataset or class range
    #[error("Index {index} out of range for {what} of length {len}")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },

    /// File could not be read or written
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File contents could not be decoded
    #[error("Could not decode {path}: {message}")]
    Decode { path: PathBuf, message: String },

    /// Configuration file is not valid JSON for the expected schema
    #[error("Invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The matching objective left the finite range
    #[error("Numerical divergence: objective became {value}")]
    NumericalDivergence { value: f64 },
}

impl LeakageError {
    /// Wrap an I/O error together with the offending path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LeakageError::Io {
            path: path.into(),
            source,
        }
    }

    /// Build a decode error for `path`.
    pub fn decode(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        LeakageError::Decode {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, LeakageError>;
