//! # evlog core
//!
//! Shared primitives for the evlog replication protocol:
//!
//! - [`Entry`]/[`EntryId`] — time-ordered domain events and their 128-bit,
//!   timestamp-embedding identifiers
//! - [`EncryptedEntry`]/[`StoredEntry`]/[`RemoteEntry`] — the units exchanged
//!   between device journals and server storage
//! - [`Conflict`]/[`Compaction`] — deterministic conflict detection between
//!   concurrently created entries
//! - [`ChangeFeed`] — the publish/subscribe plumbing behind both the journal
//!   and server change feeds
//! - [`partition_suffix`] — per-identity partition naming
//! - `crypto` (feature `encryption`) — AES-256-GCM payload sealing
//!
//! The journal and server crates build on these; nothing here touches
//! storage.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod codec;
mod conflict;
#[cfg(feature = "encryption")]
pub mod crypto;
mod entry;
mod error;
mod feed;
mod partition;
mod wire;

pub use conflict::{Compaction, Conflict};
pub use entry::{Entry, EntryId, RANDOM_LEN};
pub use error::{CoreError, CoreResult};
pub use feed::ChangeFeed;
pub use partition::{partition_suffix, SUFFIX_LEN};
pub use wire::{EncryptedEntry, RemoteEntry, StoredEntry};
