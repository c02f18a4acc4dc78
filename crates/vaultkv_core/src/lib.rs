//! # vaultkv Core
//!
//! Encryption barrier and logical views for vaultkv.
//!
//! This crate provides:
//! - [`AesGcmBarrier`], which encrypts every entry with AES-256-GCM before it
//!   reaches a [`PhysicalBackend`](vaultkv_storage::PhysicalBackend)
//! - The seal lifecycle ([`SecurityBarrier`]) with key rotation and rekeying
//! - The versioned ciphertext [`envelope`] format
//! - [`StorageView`] for prefix-scoped namespaces over any [`Storage`]
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use vaultkv_core::{AesGcmBarrier, OsRandom, SecurityBarrier, Storage, StorageEntry, StorageView};
//! use vaultkv_storage::{CacheBackend, CacheConfig, Context, InMemoryBackend};
//!
//! let ctx = Context::background();
//! let cache = CacheBackend::new(Arc::new(InMemoryBackend::new()), CacheConfig::default());
//! let barrier = Arc::new(AesGcmBarrier::new(Arc::new(cache)));
//!
//! let key = barrier.generate_key(&OsRandom).unwrap();
//! barrier.initialize(&ctx, key.as_bytes(), None, &OsRandom).unwrap();
//! barrier.unseal(&ctx, key.as_bytes()).unwrap();
//!
//! let view = StorageView::new(barrier, "prefix-example/");
//! view.put(&ctx, &StorageEntry::new("foo", "bar")).unwrap();
//! assert_eq!(view.list(&ctx, "").unwrap(), vec!["foo"]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod barrier;
mod crypto;
pub mod envelope;
mod error;
mod keyring;
mod storage;
mod view;

pub use barrier::{AesGcmBarrier, SecurityBarrier, BARRIER_PREFIX, KEYRING_PATH};
pub use crypto::{EncryptionKey, OsRandom, RandomSource, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use envelope::{Envelope, ENVELOPE_VERSION, KEYRING_TERM};
pub use error::{CoreError, CoreResult};
pub use keyring::{KeyInfo, Keyring, TermKey};
pub use storage::{Storage, StorageEntry};
pub use view::StorageView;
pub use vaultkv_storage::Context;
