//! Error taxonomy for workspace and configuration operations.

use std::path::PathBuf;

use crate::domain::Role;

/// Errors produced by workspace store operations.
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("file i/o failed for {}: {source}", path.display())]
    FileIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("file already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("no active {0} file")]
    NoActiveFile(Role),

    /// A rename target that is not a single file name.
    #[error("invalid file name: {0}")]
    InvalidName(String),
}

impl WorkspaceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileIo {
            path: path.into(),
            source,
        }
    }
}

/// Errors produced while resolving configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

/// Result type for workspace operations.
pub type Result<T> = std::result::Result<T, WorkspaceError>;
