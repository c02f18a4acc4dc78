//! Error types for vaultkv core.

use thiserror::Error;
use vaultkv_storage::StorageError;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in barrier and view operations.
///
/// An absent key is not an error: lookups return `Ok(None)`.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Physical storage error, surfaced unchanged.
    #[error("storage error: {0}")]
    Storage(StorageError),

    /// The barrier is sealed (or was never initialized).
    #[error("barrier is sealed")]
    Sealed,

    /// No keyring exists in the underlying store.
    #[error("barrier is not initialized")]
    NotInitialized,

    /// A keyring already exists in the underlying store.
    #[error("barrier is already initialized")]
    AlreadyInitialized,

    /// AEAD tag check failed: wrong key, or tampered/corrupted ciphertext.
    #[error("message authentication failed")]
    AuthenticationFailure,

    /// The envelope's version byte is not understood.
    #[error("unsupported envelope version: {0}")]
    UnsupportedVersion(u8),

    /// The keyring's active term has no key; only a corrupted keyring
    /// record causes this. Entries naming an unknown term are reported as
    /// [`CoreError::AuthenticationFailure`].
    #[error("no encryption key for term {0}")]
    UnknownTerm(u32),

    /// Data does not have the expected layout.
    #[error("invalid format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// Invalid key size.
    #[error("invalid key size: expected {expected} bytes, got {actual}")]
    InvalidKeySize {
        /// Expected size in bytes.
        expected: usize,
        /// Actual size in bytes.
        actual: usize,
    },

    /// The random source could not supply enough bytes.
    #[error("random source failed: {message}")]
    Entropy {
        /// Description of the failure.
        message: String,
    },

    /// Encryption failed.
    #[error("encryption failed: {message}")]
    EncryptionFailed {
        /// Description of the failure.
        message: String,
    },

    /// The key lies in the barrier's reserved namespace.
    #[error("key is reserved for barrier use: {0}")]
    ReservedKey(String),

    /// The key tries to escape its view with a relative path.
    #[error("relative paths not supported: {0}")]
    RelativePath(String),

    /// The keyring could not be encoded or decoded.
    #[error("codec error: {message}")]
    Codec {
        /// Description of the failure.
        message: String,
    },

    /// The operation's context was cancelled.
    #[error("operation canceled")]
    Canceled,

    /// The operation's context deadline passed.
    #[error("operation deadline exceeded")]
    DeadlineExceeded,
}

impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Canceled => Self::Canceled,
            StorageError::DeadlineExceeded => Self::DeadlineExceeded,
            other => Self::Storage(other),
        }
    }
}

impl CoreError {
    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an invalid key size error.
    pub fn invalid_key_size(actual: usize, expected: usize) -> Self {
        Self::InvalidKeySize { expected, actual }
    }

    /// Creates an entropy error.
    pub fn entropy(message: impl Into<String>) -> Self {
        Self::Entropy {
            message: message.into(),
        }
    }

    /// Creates an encryption failed error.
    pub fn encryption_failed(message: impl Into<String>) -> Self {
        Self::EncryptionFailed {
            message: message.into(),
        }
    }

    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Returns true if the operation stopped because its context ended.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Canceled | Self::DeadlineExceeded)
    }
}
