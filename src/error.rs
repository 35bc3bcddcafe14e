// Error types for the data preparation stage
//
// Library code returns `DashboardError`; the binaries wrap it in anyhow.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used across the library
pub type Result<T> = std::result::Result<T, DashboardError>;

#[derive(Error, Debug)]
pub enum DashboardError {
    /// Input file could not be opened or stat'ed
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Input file is not valid CSV
    #[error("Failed to parse CSV {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// A required header column is absent
    #[error("{path} is missing required column '{column}'")]
    MissingColumn { path: PathBuf, column: String },

    /// Configuration file could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unknown view slug
    #[error("Unknown view: {0}")]
    UnknownView(String),

    /// Date argument that does not parse
    #[error("Invalid date: {0}")]
    InvalidDate(String),
}

impl DashboardError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DashboardError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        DashboardError::Csv {
            path: path.into(),
            source,
        }
    }
}
