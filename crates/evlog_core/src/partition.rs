//! Partition naming for per-identity server storage.

use sha2::{Digest, Sha256};

/// Number of hex characters in a partition suffix.
pub const SUFFIX_LEN: usize = 16;

/// Derives the storage-partition suffix for a public key.
///
/// The suffix is the first 16 hex characters of `sha256(public_key)`. It is
/// deterministic, so every server process maps a key to the same partition.
/// Truncation to 64 bits is an accepted risk: a collision between two
/// distinct public keys would silently share a partition, and no fallback is
/// attempted.
#[must_use]
pub fn partition_suffix(public_key: &[u8]) -> String {
    let digest = Sha256::digest(public_key);
    let mut suffix = String::with_capacity(SUFFIX_LEN);
    for byte in &digest[..SUFFIX_LEN / 2] {
        suffix.push_str(&format!("{byte:02x}"));
    }
    suffix
}
