//! Units exchanged between journals and server storage.

use crate::codec::{from_cbor, to_cbor};
use crate::entry::{Entry, EntryId};
use crate::error::CoreResult;
use serde::{Deserialize, Serialize};

/// An encrypted entry as a device submits it to server storage.
///
/// The server never sees plaintext: it stores the IV and ciphertext as
/// opaque blobs keyed by the entry ID, which doubles as the deduplication
/// key for idempotent re-sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedEntry {
    /// ID of the encrypted entry, in the clear for deduplication.
    pub entry_id: EntryId,
    /// Initialization vector used for the payload.
    pub iv: Vec<u8>,
    /// Encrypted entry bytes.
    pub ciphertext: Vec<u8>,
}

impl EncryptedEntry {
    /// Creates an encrypted entry.
    pub fn new(entry_id: EntryId, iv: Vec<u8>, ciphertext: Vec<u8>) -> Self {
        Self {
            entry_id,
            iv,
            ciphertext,
        }
    }

    /// Encodes to CBOR bytes.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        to_cbor(self)
    }

    /// Decodes from CBOR bytes.
    pub fn decode(bytes: &[u8]) -> CoreResult<Self> {
        from_cbor(bytes)
    }
}

/// An encrypted entry after the server has assigned its sequence.
///
/// `sequence` is strictly increasing and gap-free within one partition and
/// is the cursor unit for incremental reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEntry {
    /// Server-assigned position within the partition.
    pub sequence: u64,
    /// The stored entry.
    pub entry: EncryptedEntry,
}

impl StoredEntry {
    /// Creates a stored entry.
    pub fn new(sequence: u64, entry: EncryptedEntry) -> Self {
        Self { sequence, entry }
    }

    /// Encodes to CBOR bytes.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        to_cbor(self)
    }

    /// Decodes from CBOR bytes.
    pub fn decode(bytes: &[u8]) -> CoreResult<Self> {
        from_cbor(bytes)
    }
}

/// A decrypted entry paired with the sequence its remote assigned it.
///
/// This is the unit a sync process hands to
/// `EventJournal::write_from_remote` after pulling and decrypting a remote's
/// stored entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    /// Sequence assigned by the remote this entry was pulled from.
    pub sequence: u64,
    /// The decrypted entry.
    pub entry: Entry,
}

impl RemoteEntry {
    /// Creates a remote entry.
    pub fn new(sequence: u64, entry: Entry) -> Self {
        Self { sequence, entry }
    }
}
