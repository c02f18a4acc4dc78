//! The AES-256-GCM encryption barrier.
//!
//! ## Lifecycle
//!
//! ```text
//! uninitialized --initialize--> sealed --unseal--> unsealed --seal--> sealed
//! ```
//!
//! While sealed, no entry can be read or written and no physical I/O is
//! performed for entry operations. Unsealing decrypts the persisted keyring
//! with the caller's root key and keeps it in memory until [`seal`] drops it.
//!
//! ## Nonces
//!
//! Every write draws a fresh 96-bit nonce from the barrier's
//! [`RandomSource`]. With random nonces the chance of a repeat under one term
//! stays below 2^-32 for the first 2^32 writes; [`rotate`] starts a new term
//! to bound the writes per key.
//!
//! ## Locking
//!
//! State and key material live behind one `RwLock`. Entry operations hold
//! the read guard from the sealed check until decryption is finished;
//! initialize, unseal, seal, rotate and rekey take the write guard, so no
//! operation ever sees a half-unsealed barrier and none starts after a seal.
//!
//! [`seal`]: SecurityBarrier::seal
//! [`rotate`]: SecurityBarrier::rotate

use crate::crypto::{EncryptionKey, OsRandom, RandomSource};
use crate::envelope::{self, Envelope, KEYRING_TERM};
use crate::error::{CoreError, CoreResult};
use crate::keyring::{KeyInfo, Keyring};
use crate::storage::{Storage, StorageEntry};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};
use vaultkv_storage::{Context, Entry, PhysicalBackend};
use zeroize::Zeroizing;

/// Namespace reserved for the barrier's own records.
pub const BARRIER_PREFIX: &str = "core/barrier/";
/// Well-known key of the persisted keyring.
pub const KEYRING_PATH: &str = "core/barrier/keyring";

/// Seal lifecycle shared by barrier implementations.
pub trait SecurityBarrier: Storage {
    /// Returns true if a keyring exists in the underlying store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn initialized(&self, ctx: &Context) -> CoreResult<bool>;

    /// Persists a new keyring protected by `key`, establishing term 1.
    ///
    /// `extra_data` is stored encrypted in the keyring and can be read back
    /// with [`AesGcmBarrier::keyring_metadata`] once unsealed. The barrier
    /// stays sealed.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::AlreadyInitialized`] if a keyring exists.
    fn initialize(
        &self,
        ctx: &Context,
        key: &[u8],
        extra_data: Option<&[u8]>,
        random: &dyn RandomSource,
    ) -> CoreResult<()>;

    /// Generates a root key suitable for [`initialize`](Self::initialize).
    ///
    /// # Errors
    ///
    /// Returns an error if the random source fails.
    fn generate_key(&self, random: &dyn RandomSource) -> CoreResult<EncryptionKey>;

    /// Returns true while key material is not loaded.
    fn sealed(&self) -> bool;

    /// Loads the keyring using `key`. A no-op when already unsealed.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::AuthenticationFailure`] for a wrong key.
    fn unseal(&self, ctx: &Context, key: &[u8]) -> CoreResult<()>;

    /// Drops all key material from memory.
    fn seal(&self);

    /// Adds a new key term and makes it active. Returns the new term.
    ///
    /// # Errors
    ///
    /// Returns an error if sealed or the keyring cannot be persisted.
    fn rotate(&self, ctx: &Context, random: &dyn RandomSource) -> CoreResult<u32>;

    /// Re-encrypts the keyring under `new_key`. Data is not rewritten.
    ///
    /// # Errors
    ///
    /// Returns an error if sealed or the keyring cannot be persisted.
    fn rekey(&self, ctx: &Context, new_key: &[u8]) -> CoreResult<()>;

    /// Describes the active key term.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Sealed`] when sealed.
    fn active_key_info(&self) -> CoreResult<KeyInfo>;
}

enum BarrierState {
    Sealed,
    Unsealed(Keyring),
}

impl BarrierState {
    fn keyring(&self) -> CoreResult<&Keyring> {
        match self {
            Self::Unsealed(keyring) => Ok(keyring),
            Self::Sealed => Err(CoreError::Sealed),
        }
    }

    fn keyring_mut(&mut self) -> CoreResult<&mut Keyring> {
        match self {
            Self::Unsealed(keyring) => Ok(keyring),
            Self::Sealed => Err(CoreError::Sealed),
        }
    }
}

/// Encryption barrier over a physical backend using AES-256-GCM.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use vaultkv_core::{AesGcmBarrier, OsRandom, SecurityBarrier, Storage, StorageEntry};
/// use vaultkv_storage::{Context, InMemoryBackend};
///
/// let barrier = AesGcmBarrier::new(Arc::new(InMemoryBackend::new()));
/// let ctx = Context::background();
///
/// let key = barrier.generate_key(&OsRandom).unwrap();
/// barrier.initialize(&ctx, key.as_bytes(), None, &OsRandom).unwrap();
/// barrier.unseal(&ctx, key.as_bytes()).unwrap();
///
/// barrier.put(&ctx, &StorageEntry::new("foo", "bar")).unwrap();
/// assert_eq!(barrier.get(&ctx, "foo").unwrap().unwrap().value, b"bar");
/// ```
pub struct AesGcmBarrier {
    backend: Arc<dyn PhysicalBackend>,
    state: RwLock<BarrierState>,
    random: Arc<dyn RandomSource>,
}

impl AesGcmBarrier {
    /// Creates a sealed barrier over `backend` using the OS random source.
    pub fn new(backend: Arc<dyn PhysicalBackend>) -> Self {
        Self::with_random(backend, Arc::new(OsRandom))
    }

    /// Creates a sealed barrier drawing nonces and rotated keys from `random`.
    pub fn with_random(backend: Arc<dyn PhysicalBackend>, random: Arc<dyn RandomSource>) -> Self {
        Self {
            backend,
            state: RwLock::new(BarrierState::Sealed),
            random,
        }
    }

    /// Returns the metadata bound at initialization.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Sealed`] when sealed.
    pub fn keyring_metadata(&self) -> CoreResult<Option<Vec<u8>>> {
        let state = self.state.read();
        Ok(state.keyring()?.metadata().map(<[u8]>::to_vec))
    }

    /// Returns the terms present in the keyring, ascending.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Sealed`] when sealed.
    pub fn key_terms(&self) -> CoreResult<Vec<u32>> {
        let state = self.state.read();
        Ok(state.keyring()?.terms())
    }

    /// Checks whether `key` opens the persisted keyring, without unsealing.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotInitialized`] if there is no keyring, or a
    /// storage error if it cannot be read.
    pub fn verify_root(&self, ctx: &Context, key: &[u8]) -> CoreResult<bool> {
        let _state = self.state.read();
        ctx.check()?;
        let raw = self
            .backend
            .get(ctx, KEYRING_PATH)?
            .ok_or(CoreError::NotInitialized)?;
        ctx.check()?;

        match open_keyring(&raw.value, key) {
            Ok(_) => Ok(true),
            Err(CoreError::AuthenticationFailure | CoreError::InvalidKeySize { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn persist_keyring(
        &self,
        ctx: &Context,
        keyring: &Keyring,
        random: &dyn RandomSource,
    ) -> CoreResult<()> {
        let encoded = keyring.encode()?;
        let sealed = envelope::seal(
            keyring.root_key(),
            KEYRING_TERM,
            KEYRING_PATH,
            &encoded,
            random,
        )?;
        ctx.check()?;
        self.backend.put(ctx, &Entry::new(KEYRING_PATH, sealed))?;
        Ok(())
    }
}

/// Decrypts and decodes a persisted keyring record with `key`.
fn open_keyring(raw: &[u8], key: &[u8]) -> CoreResult<Keyring> {
    let root_key = EncryptionKey::from_bytes(key)?;
    let envelope = Envelope::parse(raw)?;
    if envelope.term() != KEYRING_TERM {
        return Err(CoreError::invalid_format(format!(
            "keyring record has term {}",
            envelope.term()
        )));
    }

    let plaintext = Zeroizing::new(envelope.open(&root_key, KEYRING_PATH)?);
    Keyring::decode(&plaintext)
}

fn check_reserved(key: &str) -> CoreResult<()> {
    if key.starts_with(BARRIER_PREFIX) {
        return Err(CoreError::ReservedKey(key.to_string()));
    }
    Ok(())
}

impl SecurityBarrier for AesGcmBarrier {
    fn initialized(&self, ctx: &Context) -> CoreResult<bool> {
        ctx.check()?;
        let found = self.backend.get(ctx, KEYRING_PATH)?.is_some();
        ctx.check()?;
        Ok(found)
    }

    fn initialize(
        &self,
        ctx: &Context,
        key: &[u8],
        extra_data: Option<&[u8]>,
        random: &dyn RandomSource,
    ) -> CoreResult<()> {
        let root_key = EncryptionKey::from_bytes(key)?;

        // Held across check-then-write so concurrent initializations serialize
        let _state = self.state.write();
        if self.initialized(ctx)? {
            return Err(CoreError::AlreadyInitialized);
        }

        let first_key = self.generate_key(random)?;
        let keyring = Keyring::new(root_key, first_key, extra_data.map(<[u8]>::to_vec));
        self.persist_keyring(ctx, &keyring, random)?;

        info!("barrier initialized");
        Ok(())
    }

    fn generate_key(&self, random: &dyn RandomSource) -> CoreResult<EncryptionKey> {
        EncryptionKey::generate(random)
    }

    fn sealed(&self) -> bool {
        matches!(*self.state.read(), BarrierState::Sealed)
    }

    fn unseal(&self, ctx: &Context, key: &[u8]) -> CoreResult<()> {
        let mut state = self.state.write();
        if matches!(*state, BarrierState::Unsealed(_)) {
            return Ok(());
        }

        ctx.check()?;
        let raw = self
            .backend
            .get(ctx, KEYRING_PATH)?
            .ok_or(CoreError::NotInitialized)?;
        ctx.check()?;

        let keyring = open_keyring(&raw.value, key).map_err(|err| {
            if matches!(err, CoreError::AuthenticationFailure) {
                warn!("unseal rejected: keyring failed authentication");
            }
            err
        })?;

        info!(term = keyring.active_term(), "barrier unsealed");
        *state = BarrierState::Unsealed(keyring);
        Ok(())
    }

    fn seal(&self) {
        let mut state = self.state.write();
        if matches!(*state, BarrierState::Unsealed(_)) {
            // Dropping the keyring zeroizes every key it holds
            *state = BarrierState::Sealed;
            info!("barrier sealed");
        }
    }

    fn rotate(&self, ctx: &Context, random: &dyn RandomSource) -> CoreResult<u32> {
        let mut state = self.state.write();
        let keyring = state.keyring_mut()?;
        ctx.check()?;

        let mut next = keyring.clone();
        let term = next.add_term(self.generate_key(random)?)?;
        self.persist_keyring(ctx, &next, random)?;
        *keyring = next;

        info!(term, "barrier key rotated");
        Ok(term)
    }

    fn rekey(&self, ctx: &Context, new_key: &[u8]) -> CoreResult<()> {
        let new_root = EncryptionKey::from_bytes(new_key)?;

        let mut state = self.state.write();
        let keyring = state.keyring_mut()?;
        ctx.check()?;

        let mut next = keyring.clone();
        next.set_root_key(new_root);
        self.persist_keyring(ctx, &next, self.random.as_ref())?;
        *keyring = next;

        info!("barrier root key replaced");
        Ok(())
    }

    fn active_key_info(&self) -> CoreResult<KeyInfo> {
        self.state.read().keyring()?.key_info()
    }
}

impl Storage for AesGcmBarrier {
    fn put(&self, ctx: &Context, entry: &StorageEntry) -> CoreResult<()> {
        let state = self.state.read();
        let keyring = state.keyring()?;
        check_reserved(&entry.key)?;
        ctx.check()?;

        let active = keyring.active_key()?;
        let sealed = envelope::seal(
            active.key(),
            active.term,
            &entry.key,
            &entry.value,
            self.random.as_ref(),
        )?;

        // Encryption is complete; a cancelled context never reaches the write
        ctx.check()?;
        self.backend.put(ctx, &Entry::new(entry.key.clone(), sealed))?;
        ctx.check()?;
        Ok(())
    }

    fn get(&self, ctx: &Context, key: &str) -> CoreResult<Option<StorageEntry>> {
        let state = self.state.read();
        let keyring = state.keyring()?;
        check_reserved(key)?;
        ctx.check()?;

        let Some(raw) = self.backend.get(ctx, key)? else {
            return Ok(None);
        };
        ctx.check()?;

        let envelope = Envelope::parse(&raw.value)?;
        // Terms are never removed, so a term missing from the keyring means
        // the header was altered
        let Some(term_key) = keyring.term_key(envelope.term()) else {
            warn!(key, term = envelope.term(), "stored entry names an unknown key term");
            return Err(CoreError::AuthenticationFailure);
        };
        let value = envelope.open(term_key.key(), key).map_err(|err| {
            warn!(key, term = envelope.term(), "stored entry failed authentication");
            err
        })?;

        Ok(Some(StorageEntry {
            key: key.to_string(),
            value,
        }))
    }

    fn delete(&self, ctx: &Context, key: &str) -> CoreResult<()> {
        let state = self.state.read();
        state.keyring()?;
        check_reserved(key)?;
        ctx.check()?;

        self.backend.delete(ctx, key)?;
        ctx.check()?;
        Ok(())
    }

    fn list(&self, ctx: &Context, prefix: &str) -> CoreResult<Vec<String>> {
        let state = self.state.read();
        state.keyring()?;
        ctx.check()?;

        let mut keys = self.backend.list(ctx, prefix)?;
        ctx.check()?;
        keys.retain(|key| !key.starts_with(BARRIER_PREFIX));
        debug!(prefix, count = keys.len(), "barrier list");
        Ok(keys)
    }
}

impl std::fmt::Debug for AesGcmBarrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesGcmBarrier")
            .field("sealed", &self.sealed())
            .finish_non_exhaustive()
    }
}
