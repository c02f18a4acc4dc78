//! Key material and randomness for the barrier.
//!
//! ## Security Model
//!
//! - AES-256-GCM keys are exactly [`KEY_SIZE`] bytes
//! - Keys are zeroized on drop and redacted from `Debug`
//! - All key and nonce bytes come from a single injected [`RandomSource`]

use crate::error::{CoreError, CoreResult};
use aes_gcm::{
    aead::{generic_array::GenericArray, KeyInit},
    Aes256Gcm,
};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of the GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// Size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// Supplier of cryptographically secure random bytes.
///
/// The barrier uses exactly one source for key generation and nonces.
pub trait RandomSource: Send + Sync {
    /// Fills `dest` entirely with random bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Entropy`] if the source cannot supply them.
    fn try_fill(&self, dest: &mut [u8]) -> CoreResult<()>;
}

/// The operating system's random source.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn try_fill(&self, dest: &mut [u8]) -> CoreResult<()> {
        OsRng
            .try_fill_bytes(dest)
            .map_err(|err| CoreError::entropy(err.to_string()))
    }
}

/// Encryption key for AES-256-GCM.
///
/// The key is automatically zeroized when dropped for security.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl EncryptionKey {
    /// Generates a new key from `random`.
    ///
    /// # Errors
    ///
    /// Returns an error if the random source fails.
    pub fn generate(random: &dyn RandomSource) -> CoreResult<Self> {
        let mut bytes = [0u8; KEY_SIZE];
        if let Err(err) = random.try_fill(&mut bytes) {
            bytes.zeroize();
            return Err(err);
        }
        Ok(Self { bytes })
    }

    /// Creates a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes slice is not exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(CoreError::invalid_key_size(bytes.len(), KEY_SIZE));
        }

        let mut key_bytes = [0u8; KEY_SIZE];
        key_bytes.copy_from_slice(bytes);
        Ok(Self { bytes: key_bytes })
    }

    /// Returns the key as a byte slice.
    ///
    /// # Security
    ///
    /// Be careful with this method - don't log or serialize the result.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// Builds the AES-256-GCM cipher for this key.
    pub(crate) fn cipher(&self) -> Aes256Gcm {
        // EncryptionKey is always exactly KEY_SIZE bytes, matching AES-256
        Aes256Gcm::new(GenericArray::from_slice(&self.bytes))
    }
}

impl PartialEq for EncryptionKey {
    fn eq(&self, other: &Self) -> bool {
        // Constant time in the length of the key
        self.bytes
            .iter()
            .zip(other.bytes.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl Eq for EncryptionKey {}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Generates a fresh nonce from `random`.
pub(crate) fn generate_nonce(random: &dyn RandomSource) -> CoreResult<[u8; NONCE_SIZE]> {
    let mut nonce = [0u8; NONCE_SIZE];
    random.try_fill(&mut nonce)?;
    Ok(nonce)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenRandom;

    impl RandomSource for BrokenRandom {
        fn try_fill(&self, _dest: &mut [u8]) -> CoreResult<()> {
            Err(CoreError::entropy("pool exhausted"))
        }
    }

    #[test]
    fn generate_key() {
        let key1 = EncryptionKey::generate(&OsRandom).unwrap();
        let key2 = EncryptionKey::generate(&OsRandom).unwrap();

        // Keys should be different
        assert_ne!(key1, key2);
    }

    #[test]
    fn generate_key_without_entropy_fails() {
        let result = EncryptionKey::generate(&BrokenRandom);
        assert!(matches!(result, Err(CoreError::Entropy { .. })));
    }

    #[test]
    fn key_from_bytes() {
        let bytes = [42u8; KEY_SIZE];
        let key = EncryptionKey::from_bytes(&bytes).unwrap();
        assert_eq!(key.as_bytes(), &bytes);
    }

    #[test]
    fn key_wrong_size() {
        let short = [0u8; 16];
        assert!(matches!(
            EncryptionKey::from_bytes(&short),
            Err(CoreError::InvalidKeySize {
                expected: 32,
                actual: 16
            })
        ));

        let long = [0u8; 64];
        assert!(EncryptionKey::from_bytes(&long).is_err());
    }

    #[test]
    fn debug_is_redacted() {
        let key = EncryptionKey::from_bytes(&[0xAB; KEY_SIZE]).unwrap();
        let debug = format!("{key:?}");
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("171"));
    }

    #[test]
    fn nonces_differ() {
        let n1 = generate_nonce(&OsRandom).unwrap();
        let n2 = generate_nonce(&OsRandom).unwrap();
        assert_ne!(n1, n2);
    }
}
