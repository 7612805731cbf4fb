use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the preferences layer.
///
/// Missing keys and an inactive store are never errors; they resolve to
/// defaults. Only object (de)serialization and explicit synchronous writes
/// report failures.
#[derive(Debug, Error)]
pub enum PreferencesError {
    #[error("Failed to encode object for key '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to decode object for key '{key}': {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Persistence error: {0}")]
    Persist(String),
    #[error("Invalid store config: {0}")]
    InvalidConfig(#[source] serde_json::Error),
}

impl PreferencesError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PreferencesError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type PreferencesResult<T> = Result<T, PreferencesError>;
