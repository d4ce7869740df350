//! Error types for hwtally
//!
//! The accountants in [`crate::core`] never fail: they degrade to zero
//! vectors, retained snapshots, or the next identity tier. The types here
//! cover construction-time failures (configuration, platform setup) and the
//! raw data collaborators in [`crate::source`].

use std::io;
use thiserror::Error;

/// Result type alias for hwtally operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Unsupported platform
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// Initialization error (COM/WMI setup)
    #[error("Initialization error: {0}")]
    InitializationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Raw data source error
    #[error("Source error: {0}")]
    Source(#[from] SourceError),
}

/// Failure reported by a raw counter collaborator
///
/// These are expected outcomes on real machines (missing files, no root,
/// vanished counter instances) and are handled locally by the accountants.
#[derive(Error, Debug)]
pub enum SourceError {
    /// Path or counter instance does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Caller lacks the privilege to read the source
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Performance counter could not be opened or sampled
    #[error("counter unavailable: {0}")]
    CounterUnavailable(String),

    /// Query exceeded the configured timeout
    #[error("timed out after {timeout_ms} ms: {query}")]
    Timeout { query: String, timeout_ms: u64 },

    /// External tool exited unsuccessfully
    #[error("command failed: {0}")]
    CommandFailed(String),

    /// Other I/O error
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl SourceError {
    /// Map an I/O error on `path` to the matching variant
    pub fn from_io(path: impl Into<String>, err: io::Error) -> Self {
        let path = path.into();
        match err.kind() {
            io::ErrorKind::NotFound => SourceError::NotFound(path),
            io::ErrorKind::PermissionDenied => SourceError::PermissionDenied(path),
            _ => SourceError::Io { path, source: err },
        }
    }

    /// True for failures that are a normal part of running unprivileged
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            SourceError::NotFound(_) | SourceError::PermissionDenied(_)
        )
    }
}
