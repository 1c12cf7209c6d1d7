// src/errors.rs

//! Crate-wide error type and aliases.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A caller handed us something unusable (e.g. an empty path).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Startup precondition failed (sources, destination relationship).
    #[error("{0}")]
    Validation(String),

    #[error("Backend not found: {0}")]
    UnknownBackend(String),

    /// An external backend command failed for one target.
    #[error("{command} failed for {target}: {message}")]
    Backend {
        command: String,
        target: String,
        message: String,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SyncError {
    pub fn backend(
        command: impl Into<String>,
        target: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        SyncError::Backend {
            command: command.into(),
            target: target.into(),
            message: message.into(),
        }
    }

    /// Backend failures are scoped to one path or one container; the watch
    /// loop reports them and keeps going.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SyncError::Backend { .. })
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
