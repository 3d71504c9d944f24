//! Error types for codec operations.

use segstore_storage::StoreError;
use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while writing or reading segment codecs.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Storage error (I/O failure, missing file, truncated input, ...).
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// The codec configuration cannot be used.
    ///
    /// Raised when a field-to-format policy returns no format, when a format
    /// name is unknown, or when per-field formats are nested.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the problem.
        message: String,
    },

    /// A field attribute was written twice in one session.
    ///
    /// This is an internal invariant violation, not a recoverable condition.
    #[error("duplicate attribute {key:?} on field {field:?} (previous value {previous:?})")]
    DuplicateAttribute {
        /// The field carrying the attribute.
        field: String,
        /// The attribute key.
        key: String,
        /// The value that was already present.
        previous: String,
    },

    /// Segment metadata is inconsistent.
    #[error("corrupted segment metadata: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// An argument passed to a codec was invalid.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of why the argument is invalid.
        message: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },
}

impl CodecError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    /// Returns the underlying storage error, if any.
    #[must_use]
    pub fn as_store_error(&self) -> Option<&StoreError> {
        match self {
            Self::Store(e) => Some(e),
            _ => None,
        }
    }
}
