//! Named physical backend factories.
//!
//! Callers pick a backend by its type string (`"inmem"`, `"file"`) and pass a
//! string-keyed configuration map, e.g. straight out of a config file.

use crate::backend::PhysicalBackend;
use crate::error::{StorageError, StorageResult};
use crate::file::FileBackend;
use crate::memory::InMemoryBackend;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Constructor for one backend type.
pub type BackendFactory =
    Box<dyn Fn(&HashMap<String, String>) -> StorageResult<Arc<dyn PhysicalBackend>> + Send + Sync>;

/// Registry mapping backend type names to factories.
///
/// # Example
///
/// ```rust
/// use std::collections::HashMap;
/// use vaultkv_storage::BackendRegistry;
///
/// let registry = BackendRegistry::with_defaults();
/// let backend = registry.create("inmem", &HashMap::new()).unwrap();
/// # let _ = backend;
/// ```
#[derive(Default)]
pub struct BackendRegistry {
    factories: HashMap<String, BackendFactory>,
}

impl BackendRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the built-in `inmem` and `file` backends.
    ///
    /// - `inmem` accepts an optional `max_value_size` (bytes)
    /// - `file` requires `path`, the root directory
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("inmem", Box::new(inmem_factory));
        registry.register("file", Box::new(file_factory));
        registry
    }

    /// Registers `factory` under `name`, replacing any previous one.
    pub fn register(&mut self, name: impl Into<String>, factory: BackendFactory) {
        self.factories.insert(name.into(), factory);
    }

    /// Returns true if a factory is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Returns the registered backend names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Builds a backend of type `name` from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::UnknownBackend`] for an unregistered name, or
    /// whatever the factory reports for a bad configuration.
    pub fn create(
        &self,
        name: &str,
        config: &HashMap<String, String>,
    ) -> StorageResult<Arc<dyn PhysicalBackend>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| StorageError::UnknownBackend(name.to_string()))?;
        debug!(backend = name, "constructing physical backend");
        factory(config)
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.names())
            .finish()
    }
}

fn inmem_factory(config: &HashMap<String, String>) -> StorageResult<Arc<dyn PhysicalBackend>> {
    let backend = match config.get("max_value_size") {
        Some(raw) => {
            let limit = raw.parse::<usize>().map_err(|_| {
                StorageError::invalid_config(format!("max_value_size is not a number: {raw}"))
            })?;
            InMemoryBackend::with_max_value_size(limit)
        }
        None => InMemoryBackend::new(),
    };
    Ok(Arc::new(backend))
}

fn file_factory(config: &HashMap<String, String>) -> StorageResult<Arc<dyn PhysicalBackend>> {
    let path = config
        .get("path")
        .ok_or_else(|| StorageError::invalid_config("'path' must be set"))?;
    Ok(Arc::new(FileBackend::open(Path::new(path))?))
}
