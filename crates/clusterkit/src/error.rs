//! Error types for clusterkit setup operations.
//!
//! Calls made through [`ResourceApi`](declarative::ResourceApi) report
//! [`ApiError`](declarative::ApiError); this type covers everything around
//! them: building a client and loading or saving simulated cluster state.

use std::io;
use std::path::PathBuf;

/// Result type alias for clusterkit operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur outside of API calls.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The configured server URL cannot be used.
    #[error("invalid server URL '{url}': {reason}")]
    InvalidServer {
        /// The URL as configured.
        url: String,
        /// What is wrong with it.
        reason: String,
    },

    /// IO error while reading or writing a snapshot.
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path involved in the error.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// A snapshot file could not be parsed or serialized.
    #[error("invalid cluster snapshot {path}: {message}")]
    Snapshot {
        /// Path of the snapshot file.
        path: PathBuf,
        /// Parser message.
        message: String,
    },
}

impl Error {
    /// Create an IO error with path context.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
