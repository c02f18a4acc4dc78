//! The barrier keyring: root key plus every data-encryption key term.
//!
//! The keyring is persisted as CBOR inside an envelope of term
//! [`KEYRING_TERM`](crate::envelope::KEYRING_TERM), encrypted under the root
//! key. Older terms stay in the keyring after rotation so data written
//! under them remains readable.

use crate::crypto::EncryptionKey;
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Version of the keyring record layout.
pub const KEYRING_VERSION: u32 = 1;
/// Version of the data-encryption algorithm recorded per term (AES-256-GCM).
pub const TERM_KEY_VERSION: u32 = 1;

/// One generation of the data-encryption key.
#[derive(Clone)]
pub struct TermKey {
    /// Term identifier written into every envelope.
    pub term: u32,
    /// Algorithm version for this term.
    pub version: u32,
    /// When this term was installed.
    pub install_time: SystemTime,
    key: EncryptionKey,
}

impl TermKey {
    /// Returns the key of this term.
    #[must_use]
    pub fn key(&self) -> &EncryptionKey {
        &self.key
    }
}

impl std::fmt::Debug for TermKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TermKey")
            .field("term", &self.term)
            .field("version", &self.version)
            .field("install_time", &self.install_time)
            .finish_non_exhaustive()
    }
}

/// Public description of the active key; never includes key bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyInfo {
    /// The active term.
    pub term: u32,
    /// When the active term was installed.
    pub install_time: SystemTime,
}

/// Root key, key terms and initialization metadata.
#[derive(Clone, Debug)]
pub struct Keyring {
    root_key: EncryptionKey,
    keys: BTreeMap<u32, TermKey>,
    active_term: u32,
    metadata: Option<Vec<u8>>,
}

#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct PersistedTerm {
    term: u32,
    version: u32,
    value: Vec<u8>,
    install_time: u64,
}

#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct PersistedKeyring {
    version: u32,
    root_key: Vec<u8>,
    active_term: u32,
    keys: Vec<PersistedTerm>,
    metadata: Option<Vec<u8>>,
}

impl Keyring {
    /// Creates a keyring holding term 1.
    #[must_use]
    pub fn new(root_key: EncryptionKey, first_key: EncryptionKey, metadata: Option<Vec<u8>>) -> Self {
        let mut keys = BTreeMap::new();
        keys.insert(
            1,
            TermKey {
                term: 1,
                version: TERM_KEY_VERSION,
                install_time: SystemTime::now(),
                key: first_key,
            },
        );
        Self {
            root_key,
            keys,
            active_term: 1,
            metadata,
        }
    }

    /// Returns the root key the keyring is persisted under.
    #[must_use]
    pub fn root_key(&self) -> &EncryptionKey {
        &self.root_key
    }

    /// Replaces the root key.
    pub fn set_root_key(&mut self, root_key: EncryptionKey) {
        self.root_key = root_key;
    }

    /// Returns the term new writes are encrypted under.
    #[must_use]
    pub fn active_term(&self) -> u32 {
        self.active_term
    }

    /// Returns the active term's key.
    ///
    /// # Errors
    ///
    /// Returns an error if the active term is missing, which only a
    /// corrupted keyring can cause.
    pub fn active_key(&self) -> CoreResult<&TermKey> {
        self.keys
            .get(&self.active_term)
            .ok_or(CoreError::UnknownTerm(self.active_term))
    }

    /// Returns the key for `term`, if present.
    #[must_use]
    pub fn term_key(&self, term: u32) -> Option<&TermKey> {
        self.keys.get(&term)
    }

    /// Returns all terms, ascending.
    #[must_use]
    pub fn terms(&self) -> Vec<u32> {
        self.keys.keys().copied().collect()
    }

    /// Returns the metadata bound at initialization.
    #[must_use]
    pub fn metadata(&self) -> Option<&[u8]> {
        self.metadata.as_deref()
    }

    /// Describes the active key.
    ///
    /// # Errors
    ///
    /// Returns an error if the active term is missing.
    pub fn key_info(&self) -> CoreResult<KeyInfo> {
        let active = self.active_key()?;
        Ok(KeyInfo {
            term: active.term,
            install_time: active.install_time,
        })
    }

    /// Adds `key` as a new term one above the highest and makes it active.
    ///
    /// # Errors
    ///
    /// Returns an error if the term counter would overflow.
    pub fn add_term(&mut self, key: EncryptionKey) -> CoreResult<u32> {
        let highest = self.keys.keys().next_back().copied().unwrap_or(0);
        let term = highest
            .checked_add(1)
            .ok_or_else(|| CoreError::invalid_format("key term overflow"))?;
        self.keys.insert(
            term,
            TermKey {
                term,
                version: TERM_KEY_VERSION,
                install_time: SystemTime::now(),
                key,
            },
        );
        self.active_term = term;
        Ok(term)
    }

    /// Serializes the keyring to CBOR.
    ///
    /// The returned buffer holds key material and is zeroized on drop.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn encode(&self) -> CoreResult<Zeroizing<Vec<u8>>> {
        let record = PersistedKeyring {
            version: KEYRING_VERSION,
            root_key: self.root_key.as_bytes().to_vec(),
            active_term: self.active_term,
            keys: self
                .keys
                .values()
                .map(|term_key| PersistedTerm {
                    term: term_key.term,
                    version: term_key.version,
                    value: term_key.key.as_bytes().to_vec(),
                    install_time: term_key
                        .install_time
                        .duration_since(UNIX_EPOCH)
                        .unwrap_or_default()
                        .as_secs(),
                })
                .collect(),
            metadata: self.metadata.clone(),
        };

        let mut buf = Zeroizing::new(Vec::with_capacity(1024));
        ciborium::into_writer(&record, &mut *buf)
            .map_err(|err| CoreError::codec(format!("keyring encode: {err}")))?;
        Ok(buf)
    }

    /// Deserializes a keyring from CBOR.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid keyring record.
    pub fn decode(data: &[u8]) -> CoreResult<Self> {
        let record: PersistedKeyring = ciborium::from_reader(data)
            .map_err(|err| CoreError::codec(format!("keyring decode: {err}")))?;

        if record.version != KEYRING_VERSION {
            return Err(CoreError::invalid_format(format!(
                "unsupported keyring version {}",
                record.version
            )));
        }

        let mut keys = BTreeMap::new();
        for persisted in &record.keys {
            let term_key = TermKey {
                term: persisted.term,
                version: persisted.version,
                install_time: UNIX_EPOCH + Duration::from_secs(persisted.install_time),
                key: EncryptionKey::from_bytes(&persisted.value)?,
            };
            keys.insert(persisted.term, term_key);
        }

        if !keys.contains_key(&record.active_term) {
            return Err(CoreError::invalid_format(format!(
                "active term {} missing from keyring",
                record.active_term
            )));
        }

        Ok(Self {
            root_key: EncryptionKey::from_bytes(&record.root_key)?,
            keys,
            active_term: record.active_term,
            metadata: record.metadata.clone(),
        })
    }
}
