//! Storage stack fixtures.
//!
//! Builds the full layering used in production,
//! physical → counting → cache → barrier, with handles to every layer.

use crate::mock::CountingBackend;
use std::sync::{Arc, Once};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;
use vaultkv_core::{AesGcmBarrier, EncryptionKey, OsRandom, SecurityBarrier, StorageView};
use vaultkv_storage::{
    CacheBackend, CacheConfig, Context, FileBackend, InMemoryBackend, InmemSink, PhysicalBackend,
};

static TRACING: Once = Once::new();

/// Installs a `tracing` subscriber honouring `RUST_LOG`, once per process.
///
/// Output goes through the test writer so it is captured per test.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// A complete stack with handles to each layer.
pub struct TestStack {
    /// Context used by the fixture; tests may use their own.
    pub ctx: Context,
    /// The raw store at the bottom.
    pub physical: Arc<dyn PhysicalBackend>,
    /// Call counter directly above the raw store.
    pub counting: Arc<CountingBackend>,
    /// The write-through cache.
    pub cache: Arc<CacheBackend>,
    /// The encryption barrier.
    pub barrier: Arc<AesGcmBarrier>,
    /// Metrics reported by the cache.
    pub metrics: Arc<InmemSink>,
    /// Root key the barrier was initialized with.
    pub root_key: EncryptionKey,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestStack {
    /// Creates an in-memory stack, initialized and unsealed.
    pub fn new() -> Self {
        Self::with_cache_config(CacheConfig::default())
    }

    /// Creates an in-memory stack with a custom cache configuration.
    pub fn with_cache_config(config: CacheConfig) -> Self {
        let stack = Self::build(Arc::new(InMemoryBackend::new()), config, None);
        stack.unseal();
        stack
    }

    /// Creates an in-memory stack that is initialized but sealed.
    pub fn sealed() -> Self {
        Self::build(Arc::new(InMemoryBackend::new()), CacheConfig::default(), None)
    }

    /// Creates a file-backed stack in a temporary directory, unsealed.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let backend =
            FileBackend::open(temp_dir.path()).expect("Failed to open file backend");
        let stack = Self::build(Arc::new(backend), CacheConfig::default(), Some(temp_dir));
        stack.unseal();
        stack
    }

    /// Re-opens the same physical store behind a fresh cache and barrier,
    /// as a process restart would. The new barrier is sealed.
    pub fn reopen(self) -> Self {
        let counting = Arc::new(CountingBackend::new(self.physical.clone()));
        let metrics = Arc::new(InmemSink::new());
        let cache = Arc::new(CacheBackend::with_metrics(
            counting.clone(),
            CacheConfig::default(),
            metrics.clone(),
        ));
        let barrier = Arc::new(AesGcmBarrier::new(cache.clone()));

        Self {
            ctx: Context::background(),
            physical: self.physical,
            counting,
            cache,
            barrier,
            metrics,
            root_key: self.root_key,
            _temp_dir: self._temp_dir,
        }
    }

    /// Unseals the barrier with the fixture's root key.
    pub fn unseal(&self) {
        self.barrier
            .unseal(&self.ctx, self.root_key.as_bytes())
            .expect("Failed to unseal barrier");
    }

    /// Returns a view over the barrier under `prefix`.
    pub fn view(&self, prefix: &str) -> StorageView {
        StorageView::new(self.barrier.clone(), prefix)
    }

    fn build(physical: Arc<dyn PhysicalBackend>, config: CacheConfig, temp_dir: Option<TempDir>) -> Self {
        init_tracing();

        let ctx = Context::background();
        let counting = Arc::new(CountingBackend::new(physical.clone()));
        let metrics = Arc::new(InmemSink::new());
        let cache = Arc::new(CacheBackend::with_metrics(
            counting.clone(),
            config,
            metrics.clone(),
        ));
        let barrier = Arc::new(AesGcmBarrier::new(cache.clone()));

        let root_key = barrier
            .generate_key(&OsRandom)
            .expect("Failed to generate root key");
        barrier
            .initialize(&ctx, root_key.as_bytes(), None, &OsRandom)
            .expect("Failed to initialize barrier");

        Self {
            ctx,
            physical,
            counting,
            cache,
            barrier,
            metrics,
            root_key,
            _temp_dir: temp_dir,
        }
    }
}

impl Default for TestStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vaultkv_core::{Storage, StorageEntry};

    #[test]
    fn stack_is_unsealed() {
        let stack = TestStack::new();
        assert!(!stack.barrier.sealed());
        stack
            .barrier
            .put(&stack.ctx, &StorageEntry::new("k", "v"))
            .unwrap();
    }

    #[test]
    fn sealed_stack_is_sealed() {
        let stack = TestStack::sealed();
        assert!(stack.barrier.sealed());
        assert!(stack.barrier.initialized(&stack.ctx).unwrap());
    }

    #[test]
    fn reopen_keeps_data() {
        let stack = TestStack::new();
        stack
            .barrier
            .put(&stack.ctx, &StorageEntry::new("k", "v"))
            .unwrap();

        let stack = stack.reopen();
        assert!(stack.barrier.sealed());
        stack.unseal();
        let entry = stack.barrier.get(&stack.ctx, "k").unwrap().unwrap();
        assert_eq!(entry.value, b"v");
    }
}
