//! Versioned ciphertext envelope.
//!
//! Every value the barrier writes is stored as:
//!
//! ```text
//! +---------+--------------+------------+--------------------------+
//! | version | term (u32 BE)| nonce (12) | ciphertext || tag (16)   |
//! +---------+--------------+------------+--------------------------+
//! ```
//!
//! The version byte is checked before anything else; unknown versions are
//! rejected without attempting decryption. The header and the storage key
//! are bound into the AEAD associated data, so an envelope copied to a
//! different key or relabelled with a different term fails authentication.

use crate::crypto::{generate_nonce, EncryptionKey, RandomSource, NONCE_SIZE, TAG_SIZE};
use crate::error::{CoreError, CoreResult};
use aes_gcm::{
    aead::{Aead, Payload},
    Nonce,
};

/// Current envelope format: AES-256-GCM, AAD = header || key.
pub const ENVELOPE_VERSION: u8 = 1;
/// Size of the version byte plus the term.
pub const HEADER_SIZE: usize = 1 + 4;
/// Smallest well-formed envelope (empty plaintext).
pub const MIN_ENVELOPE_SIZE: usize = HEADER_SIZE + NONCE_SIZE + TAG_SIZE;
/// Term reserved for the keyring record, encrypted under the root key.
pub const KEYRING_TERM: u32 = 0;

fn header(term: u32) -> [u8; HEADER_SIZE] {
    let mut header = [0u8; HEADER_SIZE];
    header[0] = ENVELOPE_VERSION;
    header[1..].copy_from_slice(&term.to_be_bytes());
    header
}

fn associated_data(header: &[u8], path: &str) -> Vec<u8> {
    let mut aad = Vec::with_capacity(header.len() + path.len());
    aad.extend_from_slice(header);
    aad.extend_from_slice(path.as_bytes());
    aad
}

/// Encrypts `plaintext` for storage under `path` with the key of `term`.
///
/// # Errors
///
/// Returns an error if the random source fails or encryption fails.
pub fn seal(
    key: &EncryptionKey,
    term: u32,
    path: &str,
    plaintext: &[u8],
    random: &dyn RandomSource,
) -> CoreResult<Vec<u8>> {
    let header = header(term);
    let nonce_bytes = generate_nonce(random)?;
    let aad = associated_data(&header, path);

    let ciphertext = key
        .cipher()
        .encrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: plaintext,
                aad: &aad,
            },
        )
        .map_err(|_| CoreError::encryption_failed("encryption error"))?;

    let mut out = Vec::with_capacity(HEADER_SIZE + NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&header);
    out.extend_from_slice(&nonce_bytes);
    out.extend(ciphertext);
    Ok(out)
}

/// A parsed, not yet decrypted envelope borrowing its input.
#[derive(Debug, Clone, Copy)]
pub struct Envelope<'a> {
    header: &'a [u8],
    term: u32,
    nonce: &'a [u8],
    ciphertext: &'a [u8],
}

impl<'a> Envelope<'a> {
    /// Parses the envelope layout.
    ///
    /// # Errors
    ///
    /// - [`CoreError::UnsupportedVersion`] for an unknown version byte
    /// - [`CoreError::InvalidFormat`] for an empty or truncated envelope
    pub fn parse(data: &'a [u8]) -> CoreResult<Self> {
        let Some(&version) = data.first() else {
            return Err(CoreError::invalid_format("empty envelope"));
        };
        if version != ENVELOPE_VERSION {
            return Err(CoreError::UnsupportedVersion(version));
        }
        if data.len() < MIN_ENVELOPE_SIZE {
            return Err(CoreError::invalid_format(format!(
                "envelope too short: {} bytes",
                data.len()
            )));
        }

        let mut term = [0u8; 4];
        term.copy_from_slice(&data[1..HEADER_SIZE]);

        Ok(Self {
            header: &data[..HEADER_SIZE],
            term: u32::from_be_bytes(term),
            nonce: &data[HEADER_SIZE..HEADER_SIZE + NONCE_SIZE],
            ciphertext: &data[HEADER_SIZE + NONCE_SIZE..],
        })
    }

    /// Returns the key term this envelope was encrypted under.
    #[must_use]
    pub fn term(&self) -> u32 {
        self.term
    }

    /// Authenticates and decrypts the envelope stored under `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::AuthenticationFailure`] if the tag check fails.
    pub fn open(&self, key: &EncryptionKey, path: &str) -> CoreResult<Vec<u8>> {
        let aad = associated_data(self.header, path);
        key.cipher()
            .decrypt(
                Nonce::from_slice(self.nonce),
                Payload {
                    msg: self.ciphertext,
                    aad: &aad,
                },
            )
            .map_err(|_| CoreError::AuthenticationFailure)
    }
}
