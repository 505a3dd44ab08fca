//! Error types shared across gpu-mtv.

use std::path::PathBuf;
use thiserror::Error;

/// Failure taxonomy of a voxelization run.
///
/// Every variant is fatal; nothing in the pipeline retries.
#[derive(Error, Debug)]
pub enum Error {
    /// The graphics backend refused to create a resource.
    #[error("Resource creation failed: {0}")]
    ResourceCreation(String),

    /// Missing or malformed mesh input.
    #[error("Failed to load asset: {0}")]
    AssetLoad(String),

    /// Invalid run parameters, detected before any pipeline is created.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A fence wait exceeded its bound.
    #[error("Synchronization timeout: {0}")]
    SynchronizationTimeout(String),

    /// The output file could not be written.
    #[error("Serialization failed for {}: {source}", path.display())]
    Serialization {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed data encountered while reading a file back.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Submission or device failure.
    #[error("GPU error: {0}")]
    Gpu(String),
}

impl Error {
    /// Wrap an I/O error with the path it happened on.
    pub fn serialization(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Serialization {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
