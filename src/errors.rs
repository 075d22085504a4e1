//! Error types for the extranuts application.
//!
//! Only operations that touch the outside world (files, the sync backend,
//! the editor) or that name an entity which must exist can fail. Parsing,
//! completion and selector navigation are infallible.

use std::{io, path::PathBuf};

use thiserror::Error;

/// The main error type for the extranuts application.
#[derive(Error, Debug)]
pub enum NutsError {
    /// Errors related to file I/O operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Errors related to serialization/deserialization operations.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Note was not found when performing an operation.
    #[error("Note not found: {id}")]
    NoteNotFound { id: String },

    /// Category was not found when performing an operation.
    #[error("Category not found: {id}")]
    CategoryNotFound { id: i64 },

    /// A category that would break naming, colour or hierarchy rules.
    #[error("Invalid category: {message}")]
    InvalidCategory { message: String },

    /// A selector id outside of 1..=100.
    #[error("Invalid selector id: {value} (expected 1-100)")]
    InvalidSelector { value: i64 },

    /// Invalid note format or content.
    #[error("Invalid note format: {message}")]
    InvalidFormat { message: String },

    /// A sync operation could not reach the backend.
    #[error("Sync failed: {message}")]
    SyncFailed { message: String },

    /// Errors related to configuration.
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Directory creation or access failed.
    #[error("Failed to create or access directory: {path}")]
    DirectoryError { path: PathBuf },

    /// for mutex lock acquisition issues
    #[error("{message}")]
    LockAcquisitionFailed { message: String },

    /// file not found
    #[error("File not found: {file_path}")]
    FileNotFound { file_path: String },

    #[error("{message}")]
    EditorError { message: String },

    /// Generic application error with a custom message.
    #[error("{message}")]
    ApplicationError { message: String },
}
