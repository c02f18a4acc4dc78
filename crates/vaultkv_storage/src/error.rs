//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The operation's context was cancelled.
    #[error("operation canceled")]
    Canceled,

    /// The operation's context deadline passed.
    #[error("operation deadline exceeded")]
    DeadlineExceeded,

    /// The value exceeds the backend's configured limit.
    #[error("value too large: {size} bytes exceeds limit of {limit}")]
    ValueTooLarge {
        /// Size of the rejected value.
        size: usize,
        /// Configured maximum.
        limit: usize,
    },

    /// The key cannot be stored by this backend.
    #[error("invalid key {key:?}: {reason}")]
    InvalidKey {
        /// The offending key.
        key: String,
        /// Why it was rejected.
        reason: String,
    },

    /// No factory is registered under the requested backend type.
    #[error("unknown physical backend type: {0}")]
    UnknownBackend(String),

    /// The backend configuration map is missing or has a bad value.
    #[error("invalid backend configuration: {0}")]
    InvalidConfig(String),

    /// Opaque failure reported by a backend implementation.
    #[error("backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Creates an invalid key error.
    pub fn invalid_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Creates an opaque backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    /// Returns true if this error came from a cancelled or expired context.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Canceled | Self::DeadlineExceeded)
    }
}
