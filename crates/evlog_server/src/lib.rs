//! # evlog server storage
//!
//! The remote half of the evlog replication protocol: a durable, ordered,
//! deduplicated log of encrypted entries per end-to-end-encrypted identity
//! ("public key"), with live change delivery to many concurrent readers.
//!
//! Each public key gets its own physically isolated partition, named from a
//! truncated hash of the key and created lazily on first write. The server
//! never sees plaintext — only entry IDs, IVs and ciphertext.
//!
//! This crate is the storage contract the transport layer (HTTP, sockets —
//! out of scope here) calls into:
//!
//! - [`Storage::write`] — idempotent batched ingest with server-assigned,
//!   gap-free sequences
//! - [`Storage::entries`] — restartable catch-up reads from a cursor
//! - [`Storage::changes`] — backlog plus live bus with a seamless,
//!   duplicate-free handover
//!
//! # Example
//!
//! ```
//! use evlog_server::Storage;
//! use evlog_core::{EncryptedEntry, EntryId};
//!
//! let storage = Storage::open_in_memory()?;
//! let entry = EncryptedEntry::new(EntryId::new(), vec![0; 12], vec![1, 2, 3]);
//!
//! let stored = storage.write(b"device public key", &[entry])?;
//! assert_eq!(stored[0].sequence, 1);
//! # Ok::<(), evlog_server::ServerError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod feed;
mod partition;
mod storage;

pub use error::{ServerError, ServerResult};
pub use feed::{Changes, Entries};
pub use storage::Storage;
