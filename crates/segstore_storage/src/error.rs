//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The requested file does not exist in the directory.
    #[error("file not found: {name}")]
    NotFound {
        /// Name of the missing file.
        name: String,
    },

    /// A file with this name already exists (or is reserved by an open writer).
    #[error("file already exists: {name}")]
    AlreadyExists {
        /// Name of the existing file.
        name: String,
    },

    /// A read went past the end of the input.
    #[error("read past EOF: {resource} (pos {position}, len {len}, requested {requested})")]
    EndOfInput {
        /// Description of the input being read.
        resource: String,
        /// Position at which the read started.
        position: u64,
        /// Length of the input.
        len: u64,
        /// Number of bytes requested.
        requested: u64,
    },

    /// The resource was already closed.
    #[error("already closed: {resource}")]
    AlreadyClosed {
        /// Description of the closed resource.
        resource: String,
    },

    /// The file contents are corrupted.
    #[error("corrupted data in {resource}: {message}")]
    Corrupted {
        /// Description of the input being read.
        resource: String,
        /// What was wrong.
        message: String,
    },

    /// The file was written by a format version older than supported.
    #[error("format too old in {resource}: version {version} (supported {min}..={max})")]
    IndexFormatTooOld {
        /// Description of the input being read.
        resource: String,
        /// Version found in the header.
        version: i32,
        /// Minimum supported version.
        min: i32,
        /// Maximum supported version.
        max: i32,
    },

    /// The file was written by a format version newer than supported.
    #[error("format too new in {resource}: version {version} (supported {min}..={max})")]
    IndexFormatTooNew {
        /// Description of the input being read.
        resource: String,
        /// Version found in the header.
        version: i32,
        /// Minimum supported version.
        min: i32,
        /// Maximum supported version.
        max: i32,
    },

    /// The file name is not a valid directory entry name.
    #[error("invalid file name: {name:?}")]
    InvalidName {
        /// The rejected name.
        name: String,
    },

    /// A directory lock is held by someone else.
    #[error("lock obtain failed: {name}")]
    LockObtainFailed {
        /// Name of the lock file.
        name: String,
    },
}

impl StoreError {
    /// Creates a corruption error.
    pub fn corrupted(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Corrupted {
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// Creates an already-closed error.
    pub fn already_closed(resource: impl Into<String>) -> Self {
        Self::AlreadyClosed {
            resource: resource.into(),
        }
    }

    /// Creates a not-found error.
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    /// Returns true if this is an end-of-input condition.
    ///
    /// Callers use this to detect truncated files as opposed to generic I/O failures.
    #[must_use]
    pub fn is_end_of_input(&self) -> bool {
        matches!(self, Self::EndOfInput { .. })
    }

    /// Returns true if this error means the file does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Io(e) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Checks that `name` is usable as a flat directory entry.
pub(crate) fn validate_name(name: &str) -> StoreResult<()> {
    if name.is_empty() || name.contains('/') || name.contains('\\') || name == "." || name == ".."
    {
        return Err(StoreError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}
