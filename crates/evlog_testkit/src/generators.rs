//! Deterministic builders and proptest strategies.

use evlog_core::{Entry, EntryId, RemoteEntry, RANDOM_LEN};
use proptest::prelude::*;
use rand::RngCore;

/// Builds an entry with a fully deterministic id.
pub fn entry_at(millis: u64, tail: u8, event: &str, primary_key: &str) -> Entry {
    let id = EntryId::from_parts(millis, [tail; RANDOM_LEN]);
    Entry::with_id(id, event, primary_key, vec![tail])
}

/// Builds a remote entry with a fully deterministic id.
pub fn remote_entry_at(
    sequence: u64,
    millis: u64,
    tail: u8,
    event: &str,
    primary_key: &str,
) -> RemoteEntry {
    RemoteEntry::new(sequence, entry_at(millis, tail, event, primary_key))
}

/// Returns a random payload of the given length.
pub fn payload(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Returns a random 32-byte public key.
pub fn public_key() -> Vec<u8> {
    payload(32)
}

/// Strategy producing well-formed entry ids.
pub fn arb_entry_id() -> impl Strategy<Value = EntryId> {
    (
        0u64..=0xFFFF_FFFF_FFFF,
        proptest::array::uniform10(any::<u8>()),
    )
        .prop_map(|(millis, random)| EntryId::from_parts(millis, random))
}

/// Strategy producing entries with short printable names and small payloads.
pub fn arb_entry() -> impl Strategy<Value = Entry> {
    (
        arb_entry_id(),
        "[a-z]{1,12}(\\.[a-z]{1,12})?",
        "[a-z0-9-]{1,16}",
        proptest::collection::vec(any::<u8>(), 0..64),
    )
        .prop_map(|(id, event, primary_key, payload)| {
            Entry::with_id(id, event, primary_key, payload)
        })
}
