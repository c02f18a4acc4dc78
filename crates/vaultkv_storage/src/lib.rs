//! # vaultkv Storage
//!
//! Physical backends and the write-through cache for vaultkv.
//!
//! This crate provides the lowest layers of the storage stack. Physical
//! backends are **opaque key/value stores** - they never interpret the
//! values they hold. Above the encryption barrier every value reaching
//! this crate is already a sealed envelope.
//!
//! ## Design Principles
//!
//! - Backends are simple key/value stores (put, get, delete, list)
//! - Must be `Send + Sync` for concurrent access
//! - Every operation takes a [`Context`] so callers can cancel or bound it
//! - Backends are selected by name through a [`BackendRegistry`]
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing and ephemeral storage
//! - [`FileBackend`] - One file per key under a root directory
//! - [`CacheBackend`] - LRU read-through / write-through wrapper
//!
//! ## Example
//!
//! ```rust
//! use vaultkv_storage::{Context, Entry, InMemoryBackend, PhysicalBackend};
//!
//! let backend = InMemoryBackend::new();
//! let ctx = Context::background();
//! backend.put(&ctx, &Entry::new("foo", b"bar".to_vec())).unwrap();
//! let entry = backend.get(&ctx, "foo").unwrap().unwrap();
//! assert_eq!(entry.value, b"bar");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod cache;
mod config;
mod context;
mod error;
mod file;
mod memory;
mod metrics;
mod registry;

pub use backend::{Entry, PhysicalBackend};
pub use cache::CacheBackend;
pub use config::{CacheConfig, DEFAULT_CACHE_SIZE};
pub use context::Context;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
pub use metrics::{InmemSink, LatencySummary, MetricsSink, NoopSink};
pub use registry::{BackendFactory, BackendRegistry};
