// src/error.rs

use crate::repository::changelog::OrderingFault;
use thiserror::Error;

/// Core error types for Debrepo
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid or unreadable repository settings
    #[error("Configuration error: {0}")]
    Config(String),

    /// A manifest lacks one of the fields every package must carry
    #[error("Missing essential control field '{field}'")]
    MissingEssentialField { field: String },

    /// A version string that cannot be parsed
    #[error("Invalid version '{0}'")]
    InvalidVersion(String),

    /// The archive container or its control member cannot be read
    #[error("Corrupt archive {path}: {reason}")]
    CorruptArchive { path: String, reason: String },

    /// Unpacking or repacking an archive failed
    #[error("Failed to repack {path}: {reason}")]
    RepackFailure { path: String, reason: String },

    /// Changelog history is not ordered newest-first
    #[error(transparent)]
    OrderingFault(#[from] OrderingFault),

    /// Two archives would be published to the same path
    #[error("Output {path} is already claimed by group '{group}'")]
    OutputConflict { path: String, group: String },

    /// A group ended up with no usable artifact
    #[error("Group '{0}' has no usable package")]
    EmptyGroup(String),
}

/// Result type alias using Debrepo's Error type
pub type Result<T> = std::result::Result<T, Error>;
