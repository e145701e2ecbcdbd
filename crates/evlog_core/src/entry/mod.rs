//! Domain entries.

mod id;

pub use id::{EntryId, RANDOM_LEN};

use crate::codec::{from_cbor, to_cbor};
use crate::error::CoreResult;
use serde::{Deserialize, Serialize};

/// A single domain event recorded in a journal.
///
/// Entries are created once by their writer and immutable thereafter. The
/// pair `(event, primary_key)` is the *logical key*: two entries sharing it
/// represent competing versions of the same fact and are surfaced as a
/// [`Conflict`](crate::Conflict) during remote ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Unique, time-ordered identifier.
    pub id: EntryId,
    /// Event name.
    pub event: String,
    /// Primary key of the fact this event concerns.
    pub primary_key: String,
    /// Opaque payload bytes.
    pub payload: Vec<u8>,
}

impl Entry {
    /// Creates an entry with a fresh ID.
    pub fn new(
        event: impl Into<String>,
        primary_key: impl Into<String>,
        payload: Vec<u8>,
    ) -> Self {
        Self::with_id(EntryId::new(), event, primary_key, payload)
    }

    /// Creates an entry with an explicit ID.
    pub fn with_id(
        id: EntryId,
        event: impl Into<String>,
        primary_key: impl Into<String>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            id,
            event: event.into(),
            primary_key: primary_key.into(),
            payload,
        }
    }

    /// Returns the creation time in unix milliseconds, derived from the ID.
    #[must_use]
    pub fn timestamp_millis(&self) -> u64 {
        self.id.timestamp_millis()
    }

    /// Returns the logical key `(event, primary_key)`.
    #[must_use]
    pub fn logical_key(&self) -> (&str, &str) {
        (&self.event, &self.primary_key)
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
