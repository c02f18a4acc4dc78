//! Read-through / write-through LRU cache in front of a physical backend.
//!
//! ## Consistency Policy
//!
//! - Writes reach the wrapped backend before the cache is updated, and the
//!   cache is only updated when the write succeeded
//! - Deletes reach the wrapped backend before the key is evicted
//! - Misses read through and cache the result only when the key exists;
//!   absent keys are never cached
//! - Writes that bypass this cache are not observed until the key is
//!   evicted or [`CacheBackend::purge`] is called
//!
//! Reads and writes of the same key are serialized through striped locks so
//! a read-through cannot reinstall a value a concurrent write just replaced.

use crate::backend::{Entry, PhysicalBackend};
use crate::config::CacheConfig;
use crate::context::Context;
use crate::error::StorageResult;
use crate::metrics::{MetricsSink, NoopSink};
use lru::LruCache;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace};

/// Number of per-key lock stripes.
const LOCK_STRIPES: usize = 256;

/// A bounded, thread-safe cache wrapping another [`PhysicalBackend`].
///
/// The cache is never the system of record: evicting an entry only drops
/// the in-memory copy.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use vaultkv_storage::{CacheBackend, CacheConfig, Context, Entry, InMemoryBackend, PhysicalBackend};
///
/// let cache = CacheBackend::new(Arc::new(InMemoryBackend::new()), CacheConfig::new().size(0));
/// let ctx = Context::background();
/// cache.put(&ctx, &Entry::new("k", b"v".to_vec())).unwrap();
/// assert_eq!(cache.get(&ctx, "k").unwrap().unwrap().value, b"v");
/// ```
pub struct CacheBackend {
    backend: Arc<dyn PhysicalBackend>,
    lru: Mutex<LruCache<String, Vec<u8>>>,
    locks: Vec<RwLock<()>>,
    config: CacheConfig,
    enabled: AtomicBool,
    metrics: Arc<dyn MetricsSink>,
}

impl CacheBackend {
    /// Creates a cache without a metrics sink.
    pub fn new(backend: Arc<dyn PhysicalBackend>, config: CacheConfig) -> Self {
        Self::with_metrics(backend, config, Arc::new(NoopSink))
    }

    /// Creates a cache that reports hits, misses and latencies to `metrics`.
    pub fn with_metrics(
        backend: Arc<dyn PhysicalBackend>,
        config: CacheConfig,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let lru = match NonZeroUsize::new(config.size) {
            Some(capacity) => LruCache::new(capacity),
            None => LruCache::unbounded(),
        };
        debug!(size = config.size, enabled = config.enabled, "creating physical cache");

        Self {
            backend,
            lru: Mutex::new(lru),
            locks: (0..LOCK_STRIPES).map(|_| RwLock::new(())).collect(),
            enabled: AtomicBool::new(config.enabled),
            config,
            metrics,
        }
    }

    /// Drops every cached entry without touching the wrapped backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the context has already ended; nothing is purged
    /// in that case.
    pub fn purge(&self, ctx: &Context) -> StorageResult<()> {
        ctx.check()?;
        self.lru.lock().clear();
        debug!("physical cache purged");
        Ok(())
    }

    /// Enables or disables caching. Disabling purges the cache.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        if !enabled {
            self.lru.lock().clear();
        }
    }

    /// Returns whether caching is enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Returns the number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lru.lock().len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lru.lock().is_empty()
    }

    /// Returns the wrapped backend.
    #[must_use]
    pub fn inner(&self) -> &Arc<dyn PhysicalBackend> {
        &self.backend
    }

    fn cacheable(&self, key: &str) -> bool {
        self.is_enabled() && !self.config.is_excluded(key)
    }

    fn stripe(&self, key: &str) -> &RwLock<()> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        // Truncation is fine, only the low bits pick the stripe
        #[allow(clippy::cast_possible_truncation)]
        let index = (hasher.finish() as usize) % self.locks.len();
        &self.locks[index]
    }

    fn read_lock(&self, key: &str) -> RwLockReadGuard<'_, ()> {
        self.stripe(key).read()
    }

    fn write_lock(&self, key: &str) -> RwLockWriteGuard<'_, ()> {
        self.stripe(key).write()
    }

    /// Caches `value` unless the cache was disabled meanwhile.
    ///
    /// The flag is re-read under the `lru` mutex, which `set_enabled(false)`
    /// takes to purge, so an insert never lands after that purge.
    fn insert(&self, key: &str, value: &[u8]) {
        let mut lru = self.lru.lock();
        if self.is_enabled() {
            lru.put(key.to_string(), value.to_vec());
        }
    }

    fn evict(&self, key: &str) {
        self.lru.lock().pop(key);
    }
}

impl PhysicalBackend for CacheBackend {
    fn put(&self, ctx: &Context, entry: &Entry) -> StorageResult<()> {
        ctx.check()?;
        let start = Instant::now();

        let _guard = self.write_lock(&entry.key);
        let result = self.backend.put(ctx, entry);
        self.metrics.record_latency(&["cache", "put"], start.elapsed());
        result?;
        self.metrics.incr_counter(&["cache", "write"], 1);

        if let Err(err) = ctx.check() {
            // The write landed; the old cached value must not survive it
            self.evict(&entry.key);
            return Err(err);
        }

        if self.cacheable(&entry.key) {
            self.insert(&entry.key, &entry.value);
        }
        Ok(())
    }

    fn get(&self, ctx: &Context, key: &str) -> StorageResult<Option<Entry>> {
        ctx.check()?;
        let start = Instant::now();

        if !self.cacheable(key) {
            let result = self.backend.get(ctx, key);
            self.metrics.record_latency(&["cache", "get"], start.elapsed());
            let entry = result?;
            ctx.check()?;
            return Ok(entry);
        }

        let _guard = self.read_lock(key);

        let cached = self.lru.lock().get(key).cloned();
        if let Some(value) = cached {
            trace!(key, "cache hit");
            self.metrics.incr_counter(&["cache", "hit"], 1);
            self.metrics.record_latency(&["cache", "get"], start.elapsed());
            return Ok(Some(Entry::new(key, value)));
        }

        trace!(key, "cache miss");
        self.metrics.incr_counter(&["cache", "miss"], 1);
        let result = self.backend.get(ctx, key);
        self.metrics.record_latency(&["cache", "get"], start.elapsed());
        let entry = result?;
        ctx.check()?;

        if let Some(entry) = &entry {
            self.insert(key, &entry.value);
        }
        Ok(entry)
    }

    fn delete(&self, ctx: &Context, key: &str) -> StorageResult<()> {
        ctx.check()?;
        let start = Instant::now();

        let _guard = self.write_lock(key);
        let result = self.backend.delete(ctx, key);
        self.metrics.record_latency(&["cache", "delete"], start.elapsed());
        result?;
        self.metrics.incr_counter(&["cache", "delete"], 1);

        self.evict(key);
        ctx.check()
    }

    fn list(&self, ctx: &Context, prefix: &str) -> StorageResult<Vec<String>> {
        ctx.check()?;
        let keys = self.backend.list(ctx, prefix)?;
        ctx.check()?;
        Ok(keys)
    }
}

impl std::fmt::Debug for CacheBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheBackend")
            .field("size", &self.config.size)
            .field("enabled", &self.is_enabled())
            .field("cached", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use crate::memory::InMemoryBackend;
    use crate::metrics::InmemSink;

    fn ctx() -> Context {
        Context::background()
    }

    fn setup(config: CacheConfig) -> (Arc<InMemoryBackend>, CacheBackend, Arc<InmemSink>) {
        let backend = Arc::new(InMemoryBackend::new());
        let sink = Arc::new(InmemSink::new());
        let cache = CacheBackend::with_metrics(backend.clone(), config, sink.clone());
        (backend, cache, sink)
    }

    #[test]
    fn put_writes_through() {
        let (backend, cache, sink) = setup(CacheConfig::default());
        cache.put(&ctx(), &Entry::new("k", b"v".to_vec())).unwrap();

        assert_eq!(backend.raw("k").unwrap(), b"v");
        assert_eq!(cache.len(), 1);
        assert_eq!(sink.counter("cache.write"), 1);
    }

    #[test]
    fn get_hit_and_miss() {
        let (backend, cache, sink) = setup(CacheConfig::default());
        backend.set_raw("k", b"v".to_vec());

        assert_eq!(cache.get(&ctx(), "k").unwrap().unwrap().value, b"v");
        assert_eq!(sink.counter("cache.miss"), 1);
        assert_eq!(sink.counter("cache.hit"), 0);

        assert_eq!(cache.get(&ctx(), "k").unwrap().unwrap().value, b"v");
        assert_eq!(sink.counter("cache.hit"), 1);
        assert_eq!(sink.latency("cache.get").unwrap().count, 2);
    }

    #[test]
    fn missing_keys_are_not_cached() {
        let (backend, cache, _) = setup(CacheConfig::default());
        assert!(cache.get(&ctx(), "k").unwrap().is_none());
        assert!(cache.is_empty());

        // A writer bypassing the cache becomes visible immediately
        backend.set_raw("k", b"late".to_vec());
        assert_eq!(cache.get(&ctx(), "k").unwrap().unwrap().value, b"late");
    }

    #[test]
    fn stale_until_purge() {
        let (backend, cache, _) = setup(CacheConfig::default());
        cache.put(&ctx(), &Entry::new("k", b"v".to_vec())).unwrap();

        backend.delete(&ctx(), "k").unwrap();
        assert_eq!(cache.get(&ctx(), "k").unwrap().unwrap().value, b"v");

        cache.purge(&ctx()).unwrap();
        assert!(cache.get(&ctx(), "k").unwrap().is_none());
    }

    #[test]
    fn delete_evicts() {
        let (backend, cache, sink) = setup(CacheConfig::default());
        cache.put(&ctx(), &Entry::new("k", b"v".to_vec())).unwrap();
        cache.delete(&ctx(), "k").unwrap();

        assert!(cache.is_empty());
        assert!(backend.raw("k").is_none());
        assert!(cache.get(&ctx(), "k").unwrap().is_none());
        assert_eq!(sink.counter("cache.delete"), 1);
    }

    #[test]
    fn failed_put_leaves_cache_alone() {
        let backend = Arc::new(InMemoryBackend::with_max_value_size(2));
        let cache = CacheBackend::new(backend, CacheConfig::default());
        cache.put(&ctx(), &Entry::new("k", b"ok".to_vec())).unwrap();

        let result = cache.put(&ctx(), &Entry::new("k", b"too big".to_vec()));
        assert!(matches!(result, Err(StorageError::ValueTooLarge { .. })));
        assert_eq!(cache.get(&ctx(), "k").unwrap().unwrap().value, b"ok");
    }

    #[test]
    fn bounded_cache_evicts_least_recent() {
        let (backend, cache, _) = setup(CacheConfig::new().size(2));
        for key in ["a", "b", "c"] {
            cache.put(&ctx(), &Entry::new(key, key.as_bytes().to_vec())).unwrap();
        }
        assert_eq!(cache.len(), 2);

        // Evicted entries are still served from the backend
        assert_eq!(backend.len(), 3);
        assert_eq!(cache.get(&ctx(), "a").unwrap().unwrap().value, b"a");
    }

    #[test]
    fn unbounded_cache_keeps_everything() {
        let (_, cache, _) = setup(CacheConfig::new().size(0));
        for i in 0..1000 {
            cache
                .put(&ctx(), &Entry::new(format!("k{i}"), vec![1]))
                .unwrap();
        }
        assert_eq!(cache.len(), 1000);
    }

    #[test]
    fn excluded_prefixes_bypass() {
        let (backend, cache, sink) = setup(CacheConfig::new().exclude_prefix("wal/"));
        cache.put(&ctx(), &Entry::new("wal/1", b"v".to_vec())).unwrap();
        assert!(cache.is_empty());

        backend.delete(&ctx(), "wal/1").unwrap();
        assert!(cache.get(&ctx(), "wal/1").unwrap().is_none());
        assert_eq!(sink.counter("cache.miss"), 0);
    }

    #[test]
    fn disabled_cache_is_passthrough() {
        let (backend, cache, _) = setup(CacheConfig::default());
        cache.put(&ctx(), &Entry::new("k", b"v".to_vec())).unwrap();
        cache.set_enabled(false);
        assert!(!cache.is_enabled());
        assert!(cache.is_empty());

        backend.set_raw("k", b"fresh".to_vec());
        assert_eq!(cache.get(&ctx(), "k").unwrap().unwrap().value, b"fresh");
        assert!(cache.is_empty());
    }

    #[test]
    fn cancelled_context_skips_io() {
        let (backend, cache, _) = setup(CacheConfig::default());
        let cancelled = Context::background();
        cancelled.cancel();

        let result = cache.put(&cancelled, &Entry::new("k", b"v".to_vec()));
        assert!(matches!(result, Err(StorageError::Canceled)));
        assert!(backend.is_empty());
        assert!(cache.is_empty());
        assert!(cache.purge(&cancelled).is_err());
    }

    #[test]
    fn list_passthrough() {
        let (_, cache, _) = setup(CacheConfig::default());
        cache.put(&ctx(), &Entry::new("a/1", vec![1])).unwrap();
        cache.put(&ctx(), &Entry::new("b/1", vec![1])).unwrap();
        assert_eq!(cache.list(&ctx(), "a/").unwrap(), vec!["a/1"]);
    }

    /// Disables the owning cache from inside a backend call.
    struct DisablingBackend {
        inner: InMemoryBackend,
        cache: Mutex<std::sync::Weak<CacheBackend>>,
    }

    impl DisablingBackend {
        fn disable_cache(&self) {
            if let Some(cache) = self.cache.lock().upgrade() {
                cache.set_enabled(false);
            }
        }
    }

    impl PhysicalBackend for DisablingBackend {
        fn put(&self, ctx: &Context, entry: &Entry) -> StorageResult<()> {
            self.inner.put(ctx, entry)?;
            self.disable_cache();
            Ok(())
        }

        fn get(&self, ctx: &Context, key: &str) -> StorageResult<Option<Entry>> {
            let entry = self.inner.get(ctx, key)?;
            self.disable_cache();
            Ok(entry)
        }

        fn delete(&self, ctx: &Context, key: &str) -> StorageResult<()> {
            self.inner.delete(ctx, key)
        }

        fn list(&self, ctx: &Context, prefix: &str) -> StorageResult<Vec<String>> {
            self.inner.list(ctx, prefix)
        }
    }

    fn disabling_setup() -> (Arc<DisablingBackend>, Arc<CacheBackend>) {
        let backend = Arc::new(DisablingBackend {
            inner: InMemoryBackend::new(),
            cache: Mutex::new(std::sync::Weak::new()),
        });
        let cache = Arc::new(CacheBackend::new(backend.clone(), CacheConfig::default()));
        *backend.cache.lock() = Arc::downgrade(&cache);
        (backend, cache)
    }

    #[test]
    fn disable_during_put_leaves_cache_empty() {
        let (_, cache) = disabling_setup();

        cache.put(&ctx(), &Entry::new("k", b"v".to_vec())).unwrap();

        assert!(!cache.is_enabled());
        assert!(cache.is_empty());
    }

    #[test]
    fn disable_during_read_through_leaves_cache_empty() {
        let (backend, cache) = disabling_setup();
        backend.inner.set_raw("k", b"v".to_vec());

        assert_eq!(cache.get(&ctx(), "k").unwrap().unwrap().value, b"v");

        assert!(!cache.is_enabled());
        assert!(cache.is_empty());
    }

    mod model {
        use super::*;
        use proptest::prelude::*;
        use std::collections::BTreeMap;

        #[derive(Debug, Clone)]
        enum Op {
            Put(u8, Vec<u8>),
            Get(u8),
            Delete(u8),
        }

        fn op_strategy() -> impl Strategy<Value = Op> {
            prop_oneof![
                (0u8..8, prop::collection::vec(any::<u8>(), 0..16)).prop_map(|(k, v)| Op::Put(k, v)),
                (0u8..8).prop_map(Op::Get),
                (0u8..8).prop_map(Op::Delete),
            ]
        }

        proptest! {
            #[test]
            fn cache_agrees_with_a_map(ops in prop::collection::vec(op_strategy(), 1..64)) {
                let (backend, cache, _) = setup(CacheConfig::new().size(3));
                let mut model = BTreeMap::new();

                for op in ops {
                    match op {
                        Op::Put(k, v) => {
                            let key = format!("k{k}");
                            cache.put(&ctx(), &Entry::new(key.clone(), v.clone())).unwrap();
                            model.insert(key, v);
                        }
                        Op::Get(k) => {
                            let key = format!("k{k}");
                            let got = cache.get(&ctx(), &key).unwrap().map(|e| e.value);
                            prop_assert_eq!(got.as_ref(), model.get(&key));
                        }
                        Op::Delete(k) => {
                            let key = format!("k{k}");
                            cache.delete(&ctx(), &key).unwrap();
                            model.remove(&key);
                        }
                    }
                    prop_assert!(cache.len() <= 3);
                }

                for (key, value) in &model {
                    let raw = backend.raw(key);
                    prop_assert_eq!(raw.as_ref(), Some(value));
                }
                prop_assert_eq!(backend.len(), model.len());
            }
        }
    }
}
