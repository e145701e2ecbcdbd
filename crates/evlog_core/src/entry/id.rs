//! Entry identifier.

use rand::RngCore;
use serde::de::{Error as DeError, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Number of random bytes following the timestamp prefix.
pub const RANDOM_LEN: usize = 10;

/// Unique, time-ordered identifier for an entry.
///
/// Entry IDs are 128-bit values laid out like UUIDv7: the first 48 bits hold
/// the creation time in unix milliseconds (big-endian), the remaining 80 bits
/// are random (with the UUID version/variant bits set). Comparing the raw
/// bytes therefore orders IDs by creation time, and the timestamp can always
/// be recovered from the ID without a separate clock column.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId([u8; 16]);

impl EntryId {
    /// Creates a fresh ID from the current time and random bytes.
    #[must_use]
    pub fn new() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        let mut random = [0u8; RANDOM_LEN];
        rand::thread_rng().fill_bytes(&mut random);

        Self::from_parts(millis, random)
    }

    /// Builds an ID from an explicit timestamp and random tail.
    ///
    /// The timestamp is truncated to 48 bits. Two of the random bytes have
    /// their high bits overwritten by the UUID version/variant markers.
    #[must_use]
    pub fn from_parts(timestamp_millis: u64, random: [u8; RANDOM_LEN]) -> Self {
        let mut bytes = [0u8; 16];
        let ts = (timestamp_millis & 0xFFFF_FFFF_FFFF).to_be_bytes();
        bytes[..6].copy_from_slice(&ts[2..8]);
        bytes[6..].copy_from_slice(&random);

        // UUIDv7 version and variant bits.
        bytes[6] = (bytes[6] & 0x0F) | 0x70;
        bytes[8] = (bytes[8] & 0x3F) | 0x80;

        Self(bytes)
    }

    /// Creates an entry ID from raw bytes.
    #[inline]
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Creates an entry ID from a slice.
    ///
    /// Returns `None` if the slice is not exactly 16 bytes.
    #[must_use]
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        if slice.len() == 16 {
            let mut bytes = [0u8; 16];
            bytes.copy_from_slice(slice);
            Some(Self(bytes))
        } else {
            None
        }
    }

    /// Returns the raw bytes.
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Returns the embedded creation time in unix milliseconds.
    ///
    /// Pure and total for any 16-byte value.
    #[must_use]
    pub fn timestamp_millis(&self) -> u64 {
        let mut ts = [0u8; 8];
        ts[2..8].copy_from_slice(&self.0[..6]);
        u64::from_be_bytes(ts)
    }

    /// Converts to a UUID.
    #[must_use]
    pub fn to_uuid(&self) -> Uuid {
        Uuid::from_bytes(self.0)
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntryId({})", self.to_uuid())
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_uuid())
    }
}

impl From<[u8; 16]> for EntryId {
    fn from(bytes: [u8; 16]) -> Self {
        Self::from_bytes(bytes)
    }
}

impl From<EntryId> for [u8; 16] {
    fn from(id: EntryId) -> Self {
        id.0
    }
}

impl Serialize for EntryId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for EntryId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IdVisitor;

        impl<'de> Visitor<'de> for IdVisitor {
            type Value = EntryId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("16 bytes")
            }

            fn visit_bytes<E: DeError>(self, v: &[u8]) -> Result<EntryId, E> {
                EntryId::from_slice(v)
                    .ok_or_else(|| E::invalid_length(v.len(), &"16 bytes"))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<EntryId, A::Error> {
                let mut bytes = [0u8; 16];
                for (i, byte) in bytes.iter_mut().enumerate() {
                    *byte = seq
                        .next_element()?
                        .ok_or_else(|| A::Error::invalid_length(i, &"16 bytes"))?;
                }
                if seq.next_element::<u8>()?.is_some() {
                    return Err(A::Error::invalid_length(17, &"16 bytes"));
                }
                Ok(EntryId::from_bytes(bytes))
            }
        }

        deserializer.deserialize_bytes(IdVisitor)
    }
}
