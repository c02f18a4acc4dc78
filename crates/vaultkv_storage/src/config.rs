//! Cache configuration.

/// Default number of entries held by the cache.
pub const DEFAULT_CACHE_SIZE: usize = 128 * 1024;

/// Configuration for a [`crate::CacheBackend`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of cached entries (0 = unbounded, no eviction).
    pub size: usize,

    /// Keys starting with any of these prefixes are never cached.
    pub exclude_prefixes: Vec<String>,

    /// Whether the cache starts enabled.
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_CACHE_SIZE,
            exclude_prefixes: Vec::new(),
            enabled: true,
        }
    }
}

impl CacheConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of entries (0 = unbounded).
    #[must_use]
    pub const fn size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    /// Sets whether the cache starts enabled.
    #[must_use]
    pub const fn enabled(mut self, value: bool) -> Self {
        self.enabled = value;
        self
    }

    /// Adds a prefix whose keys bypass the cache.
    #[must_use]
    pub fn exclude_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.exclude_prefixes.push(prefix.into());
        self
    }

    /// Returns true if `key` falls under an excluded prefix.
    #[must_use]
    pub fn is_excluded(&self, key: &str) -> bool {
        self.exclude_prefixes
            .iter()
            .any(|prefix| key.starts_with(prefix.as_str()))
    }
}
