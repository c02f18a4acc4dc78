//! Logical entry storage trait.

use crate::error::CoreResult;
use vaultkv_storage::Context;

/// A logical entry handed to the barrier or a view.
///
/// Values are plaintext at this level; `Debug` only prints their length.
#[derive(Clone, PartialEq, Eq)]
pub struct StorageEntry {
    /// Hierarchical, slash-separated key.
    pub key: String,
    /// Plaintext value.
    pub value: Vec<u8>,
}

impl StorageEntry {
    /// Creates a new entry.
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl std::fmt::Debug for StorageEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEntry")
            .field("key", &self.key)
            .field("value_len", &self.value.len())
            .finish()
    }
}

/// Key/value storage operating on logical entries.
///
/// Implemented by the encryption barrier and by [`crate::StorageView`], so
/// views can be stacked over a barrier or over each other.
pub trait Storage: Send + Sync {
    /// Stores `entry`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is sealed, the context has ended, or
    /// the write fails below.
    fn put(&self, ctx: &Context, entry: &StorageEntry) -> CoreResult<()>;

    /// Fetches the entry under `key`, `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is sealed, the context has ended, the
    /// stored data fails authentication, or the read fails below.
    fn get(&self, ctx: &Context, key: &str) -> CoreResult<Option<StorageEntry>>;

    /// Removes the entry under `key`. Absent keys are not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is sealed, the context has ended, or
    /// the delete fails below.
    fn delete(&self, ctx: &Context, key: &str) -> CoreResult<()>;

    /// Lists keys starting with `prefix`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is sealed, the context has ended, or
    /// the listing fails below.
    fn list(&self, ctx: &Context, prefix: &str) -> CoreResult<Vec<String>>;
}

impl<T: Storage + ?Sized> Storage for std::sync::Arc<T> {
    fn put(&self, ctx: &Context, entry: &StorageEntry) -> CoreResult<()> {
        (**self).put(ctx, entry)
    }

    fn get(&self, ctx: &Context, key: &str) -> CoreResult<Option<StorageEntry>> {
        (**self).get(ctx, key)
    }

    fn delete(&self, ctx: &Context, key: &str) -> CoreResult<()> {
        (**self).delete(ctx, key)
    }

    fn list(&self, ctx: &Context, prefix: &str) -> CoreResult<Vec<String>> {
        (**self).list(ctx, prefix)
    }
}
