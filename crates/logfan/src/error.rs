//! Error types for the log plugin host.
//!
//! `HostError` covers the host surface itself; `PluginError` is the error
//! contract plugin implementations report through.

use thiserror::Error;

/// Result type alias for host operations
pub type Result<T> = std::result::Result<T, HostError>;

/// Result type alias for plugin operations
pub type PluginResult<T> = std::result::Result<T, PluginError>;

/// Errors the host itself can surface.
///
/// Plugin faults are never fatal to the host; they are contained per plugin
/// and reported on the job log instead.
#[derive(Error, Debug)]
pub enum HostError {
    /// `run()` consumes the host's orchestration state and may only be
    /// called once.
    #[error("host run() already started")]
    AlreadyRan,
}

/// Errors that can occur in plugin operations
#[derive(Debug, Error)]
pub enum PluginError {
    /// Connection to an external system failed
    #[error("connection error: {0}")]
    Connection(String),

    /// Timeout waiting for a response
    #[error("timeout: {0}")]
    Timeout(String),

    /// Data serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl PluginError {
    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
