//! Prefix-scoped view over any [`Storage`].

use crate::error::{CoreError, CoreResult};
use crate::storage::{Storage, StorageEntry};
use std::sync::Arc;
use tracing::debug;
use vaultkv_storage::Context;

/// A namespaced window onto a [`Storage`].
///
/// Every key is prefixed with the view's prefix on the way down and
/// stripped of it on the way back. The view holds no state of its own.
///
/// Two views isolate each other only if neither prefix is a prefix of the
/// other; callers pick prefixes such as `"a/"` and `"b/"`.
#[derive(Clone)]
pub struct StorageView {
    storage: Arc<dyn Storage>,
    prefix: String,
}

impl StorageView {
    /// Creates a view of `storage` under `prefix`.
    pub fn new(storage: Arc<dyn Storage>, prefix: impl Into<String>) -> Self {
        Self {
            storage,
            prefix: prefix.into(),
        }
    }

    /// Returns the prefix this view adds to every key.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Creates a view nested under this one.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::RelativePath`] if `prefix` contains `..`.
    pub fn sub_view(&self, prefix: &str) -> CoreResult<Self> {
        check_relative(prefix)?;
        Ok(Self {
            storage: Arc::clone(&self.storage),
            prefix: format!("{}{prefix}", self.prefix),
        })
    }

    /// Deletes every key visible through this view.
    ///
    /// # Errors
    ///
    /// Stops at the first failing delete and returns its error.
    pub fn clear(&self, ctx: &Context) -> CoreResult<()> {
        let keys = self.list(ctx, "")?;
        debug!(prefix = %self.prefix, count = keys.len(), "clearing view");
        for key in keys {
            self.delete(ctx, &key)?;
        }
        Ok(())
    }

    fn expand(&self, key: &str) -> CoreResult<String> {
        check_relative(key)?;
        Ok(format!("{}{key}", self.prefix))
    }
}

fn check_relative(key: &str) -> CoreResult<()> {
    if key.contains("..") {
        return Err(CoreError::RelativePath(key.to_string()));
    }
    Ok(())
}

impl Storage for StorageView {
    fn put(&self, ctx: &Context, entry: &StorageEntry) -> CoreResult<()> {
        let entry = StorageEntry {
            key: self.expand(&entry.key)?,
            value: entry.value.clone(),
        };
        self.storage.put(ctx, &entry)
    }

    fn get(&self, ctx: &Context, key: &str) -> CoreResult<Option<StorageEntry>> {
        let Some(mut entry) = self.storage.get(ctx, &self.expand(key)?)? else {
            return Ok(None);
        };
        entry.key = key.to_string();
        Ok(Some(entry))
    }

    fn delete(&self, ctx: &Context, key: &str) -> CoreResult<()> {
        self.storage.delete(ctx, &self.expand(key)?)
    }

    fn list(&self, ctx: &Context, prefix: &str) -> CoreResult<Vec<String>> {
        let keys = self.storage.list(ctx, &self.expand(prefix)?)?;
        Ok(keys
            .into_iter()
            .filter_map(|key| key.strip_prefix(self.prefix.as_str()).map(str::to_string))
            .collect())
    }
}

impl std::fmt::Debug for StorageView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageView")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}
