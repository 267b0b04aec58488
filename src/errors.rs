use std::path::PathBuf;
use thiserror::Error;

use crate::filter::FilterSyntaxError;

#[derive(Error, Debug)]
pub enum WiredError {
    /// The durable store is unreadable or corrupt. Fatal to startup unless
    /// the caller accepts a rebuild (see `Cache::rebuild`).
    #[error("cache unavailable at {path}: {reason}")]
    CacheUnavailable { path: PathBuf, reason: String },
    /// A sync is already running. Callers retry later; requests are never
    /// queued.
    #[error("a library sync is already in progress")]
    SyncInProgress,
    #[error(transparent)]
    FilterSyntax(#[from] FilterSyntaxError),
    #[error("playlist does not exist: {0}")]
    PlaylistDoesNotExist(String),
    #[error("reorder rejected for playlist {id}: {reason}")]
    PlaylistReorderInvalid { id: String, reason: String },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration file not found ({0})")]
    NotFound(PathBuf),
    #[error("failed to decode configuration file ({path}): {message}")]
    Decode { path: PathBuf, message: String },
    #[error("missing key {key} in configuration file ({path})")]
    MissingKey { path: PathBuf, key: String },
    #[error("invalid value for {key} in configuration file ({path}): {message}")]
    InvalidValue { path: PathBuf, key: String, message: String },
}

/// A single file whose metadata could not be read during a sync. These are
/// collected into the sync summary, never raised as `WiredError`.
#[derive(Error, Debug, Clone)]
#[error("failed to read metadata from {path}: {reason}")]
pub struct MetadataReadFailure {
    pub path: PathBuf,
    pub reason: String,
}

pub type Result<T> = std::result::Result<T, WiredError>;
