//! Error types for ledger operations.

use std::path::PathBuf;

use crate::store::TierUnavailable;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Malformed table file {}: {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Ledger not initialized at {0}")]
    NotInitialized(PathBuf),

    #[error("Ledger already initialized at {0}")]
    AlreadyInitialized(PathBuf),

    #[error("Remote unavailable: {0}")]
    Remote(#[from] TierUnavailable),

    #[error("Not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, Error>;
