//! In-memory physical backend for testing.

use crate::backend::{Entry, PhysicalBackend};
use crate::context::Context;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// An in-memory physical backend.
///
/// This backend stores all data in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral stacks that don't need persistence
///
/// Keys are kept in a `BTreeMap` so prefix listing is a range scan.
///
/// # Thread Safety
///
/// This backend is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use vaultkv_storage::{Context, Entry, InMemoryBackend, PhysicalBackend};
///
/// let backend = InMemoryBackend::new();
/// let ctx = Context::background();
/// backend.put(&ctx, &Entry::new("a/b", vec![1, 2, 3])).unwrap();
/// assert_eq!(backend.list(&ctx, "a/").unwrap(), vec!["a/b".to_string()]);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    data: RwLock<BTreeMap<String, Vec<u8>>>,
    max_value_size: Option<usize>,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend that rejects values larger than `limit` bytes.
    #[must_use]
    pub fn with_max_value_size(limit: usize) -> Self {
        Self {
            data: RwLock::default(),
            max_value_size: Some(limit),
        }
    }

    /// Returns the raw value under `key` without a context.
    ///
    /// Useful for tests that inspect what actually reached storage.
    #[must_use]
    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.data.read().get(key).cloned()
    }

    /// Overwrites the raw value under `key` without a context.
    ///
    /// Useful for tests that tamper with stored data.
    pub fn set_raw(&self, key: &str, value: Vec<u8>) {
        self.data.write().insert(key.to_string(), value);
    }

    /// Returns the number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Clears all data from the backend.
    pub fn clear(&self) {
        self.data.write().clear();
    }
}

impl PhysicalBackend for InMemoryBackend {
    fn put(&self, ctx: &Context, entry: &Entry) -> StorageResult<()> {
        ctx.check()?;
        if let Some(limit) = self.max_value_size {
            if entry.value.len() > limit {
                return Err(StorageError::ValueTooLarge {
                    size: entry.value.len(),
                    limit,
                });
            }
        }
        self.data
            .write()
            .insert(entry.key.clone(), entry.value.clone());
        Ok(())
    }

    fn get(&self, ctx: &Context, key: &str) -> StorageResult<Option<Entry>> {
        ctx.check()?;
        Ok(self
            .data
            .read()
            .get(key)
            .map(|value| Entry::new(key, value.clone())))
    }

    fn delete(&self, ctx: &Context, key: &str) -> StorageResult<()> {
        ctx.check()?;
        self.data.write().remove(key);
        Ok(())
    }

    fn list(&self, ctx: &Context, prefix: &str) -> StorageResult<Vec<String>> {
        ctx.check()?;
        let data = self.data.read();
        Ok(data
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }
}
