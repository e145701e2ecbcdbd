//! Payload sealing using AES-256-GCM.
//!
//! Devices seal entries before pushing them to server storage; the server
//! only ever handles the resulting `(iv, ciphertext)` pairs.

use crate::entry::Entry;
use crate::error::{CoreError, CoreResult};
use crate::wire::EncryptedEntry;
use aes_gcm::{
    aead::{generic_array::GenericArray, Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of the GCM IV in bytes.
pub const IV_SIZE: usize = 12;

/// Symmetric key for sealing payloads.
///
/// The key is zeroized when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PayloadKey {
    bytes: [u8; KEY_SIZE],
}

impl PayloadKey {
    /// Generates a new random key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Creates a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the slice is not exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(CoreError::invalid_key_size(bytes.len(), KEY_SIZE));
        }

        let mut key_bytes = [0u8; KEY_SIZE];
        key_bytes.copy_from_slice(bytes);
        Ok(Self { bytes: key_bytes })
    }

    /// Returns the key bytes. Do not log or persist the result.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for PayloadKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// A sealed payload: the IV and ciphertext the server schema stores in
/// separate columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedPayload {
    /// Initialization vector.
    pub iv: Vec<u8>,
    /// Ciphertext with the GCM tag appended.
    pub ciphertext: Vec<u8>,
}

/// Seals and opens payloads with one symmetric key.
pub struct PayloadCipher {
    cipher: Aes256Gcm,
}

impl PayloadCipher {
    /// Creates a cipher from a key.
    #[must_use]
    pub fn new(key: &PayloadKey) -> Self {
        let key_array = GenericArray::from_slice(key.as_bytes());
        Self {
            cipher: Aes256Gcm::new(key_array),
        }
    }

    /// Seals plaintext under a fresh random IV.
    pub fn seal(&self, plaintext: &[u8]) -> CoreResult<SealedPayload> {
        let mut iv = [0u8; IV_SIZE];
        rand::thread_rng().fill_bytes(&mut iv);
        let nonce = Nonce::from_slice(&iv);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| CoreError::encryption_failed("encryption error"))?;

        Ok(SealedPayload {
            iv: iv.to_vec(),
            ciphertext,
        })
    }

    /// Opens a sealed payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the IV has the wrong size or the ciphertext fails
    /// authentication (wrong key, corrupted data).
    pub fn open(&self, iv: &[u8], ciphertext: &[u8]) -> CoreResult<Vec<u8>> {
        if iv.len() != IV_SIZE {
            return Err(CoreError::decryption_failed("bad iv length"));
        }

        let nonce = Nonce::from_slice(iv);
        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CoreError::decryption_failed("decryption error"))
    }

    /// Seals a full entry into the unit pushed to server storage.
    pub fn seal_entry(&self, entry: &Entry) -> CoreResult<EncryptedEntry> {
        let sealed = self.seal(&entry.encode()?)?;
        Ok(EncryptedEntry::new(entry.id, sealed.iv, sealed.ciphertext))
    }

    /// Opens an encrypted entry pulled from server storage.
    ///
    /// # Errors
    ///
    /// Fails if decryption fails or the decrypted entry's ID does not match
    /// the ID the server stored it under.
    pub fn open_entry(&self, encrypted: &EncryptedEntry) -> CoreResult<Entry> {
        let plaintext = self.open(&encrypted.iv, &encrypted.ciphertext)?;
        let entry = Entry::decode(&plaintext)?;
        if entry.id != encrypted.entry_id {
            return Err(CoreError::decoding("entry id does not match envelope"));
        }
        Ok(entry)
    }
}

impl std::fmt::Debug for PayloadCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadCipher")
            .field("cipher", &"Aes256Gcm")
            .finish()
    }
}
