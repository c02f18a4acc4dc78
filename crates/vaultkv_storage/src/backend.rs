//! Physical backend trait definition.

use crate::context::Context;
use crate::error::StorageResult;

/// A raw key/value pair at the physical storage boundary.
///
/// Once data has passed through the encryption barrier, `value` is always a
/// sealed envelope and never application plaintext.
#[derive(Clone, PartialEq, Eq)]
pub struct Entry {
    /// Hierarchical, slash-separated key.
    pub key: String,
    /// Opaque value bytes.
    pub value: Vec<u8>,
}

impl Entry {
    /// Creates a new entry.
    pub fn new(key: impl Into<String>, value: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry")
            .field("key", &self.key)
            .field("value_len", &self.value.len())
            .finish()
    }
}

/// A durable key/value store underneath the vaultkv stack.
///
/// Physical backends are **opaque byte stores**. They do not understand
/// envelopes, keyrings or views.
///
/// # Invariants
///
/// - `get` returns exactly the bytes of the last successful `put` for a key
/// - `get` of an absent key is `Ok(None)`, not an error
/// - `delete` of an absent key succeeds
/// - `list` returns every stored key starting with `prefix`, in sorted order
/// - Each method calls [`Context::check`] before doing I/O
/// - Backends must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For testing
/// - [`super::FileBackend`] - For persistent storage
/// - [`super::CacheBackend`] - LRU wrapper around another backend
pub trait PhysicalBackend: Send + Sync {
    /// Stores `entry`, replacing any previous value under its key.
    ///
    /// # Errors
    ///
    /// Returns an error if the context has ended, the key or value is
    /// rejected, or an I/O error occurs.
    fn put(&self, ctx: &Context, entry: &Entry) -> StorageResult<()>;

    /// Fetches the entry stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the context has ended or an I/O error occurs.
    fn get(&self, ctx: &Context, key: &str) -> StorageResult<Option<Entry>>;

    /// Removes the entry stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the context has ended or an I/O error occurs.
    fn delete(&self, ctx: &Context, key: &str) -> StorageResult<()>;

    /// Lists all keys beginning with `prefix`.
    ///
    /// # Errors
    ///
    /// Returns an error if the context has ended or an I/O error occurs.
    fn list(&self, ctx: &Context, prefix: &str) -> StorageResult<Vec<String>>;
}

impl<T: PhysicalBackend + ?Sized> PhysicalBackend for std::sync::Arc<T> {
    fn put(&self, ctx: &Context, entry: &Entry) -> StorageResult<()> {
        (**self).put(ctx, entry)
    }

    fn get(&self, ctx: &Context, key: &str) -> StorageResult<Option<Entry>> {
        (**self).get(ctx, key)
    }

    fn delete(&self, ctx: &Context, key: &str) -> StorageResult<()> {
        (**self).delete(ctx, key)
    }

    fn list(&self, ctx: &Context, prefix: &str) -> StorageResult<Vec<String>> {
        (**self).list(ctx, prefix)
    }
}
