//! Error types for recording and replay

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecplayError {
    #[error("Not found: {kind} with id {id}")]
    NotFound { kind: String, id: String },

    #[error("A recording is already in progress: {0}")]
    AlreadyRecording(String),

    #[error("No recording in progress")]
    NotRecording,

    #[error("Session {0} was stopped but not saved; stop again to retry the save")]
    UnsavedSession(String),

    #[error("Session {0} is still recording and cannot be replayed")]
    SessionStillRecording(String),

    #[error("Invalid session id: {0:?}")]
    InvalidSessionId(String),

    #[error("Failed to write {path}: {reason}")]
    StorageWrite { path: PathBuf, reason: String },

    #[error("Failed to read {path}: {reason}")]
    StorageRead { path: PathBuf, reason: String },

    #[error("Playwright not found. Install with: npx playwright install")]
    PlaywrightNotFound,

    #[error("{0}")]
    Browser(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl RecplayError {
    pub fn session_not_found(id: impl Into<String>) -> Self {
        RecplayError::NotFound {
            kind: "session".to_string(),
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RecplayError::NotFound { .. })
    }
}

pub type RecplayResult<T> = Result<T, RecplayError>;
