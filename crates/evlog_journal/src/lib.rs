//! # evlog journal
//!
//! The device-local half of the evlog replication protocol.
//!
//! An [`EventJournal`] is an append-only, SQLite-backed log of domain
//! entries plus a per-remote watermark of what each remote has committed.
//! It provides:
//!
//! - atomic local writes coupling the entry row with a caller-supplied side
//!   effect in one transaction
//! - idempotent bulk ingestion of remote entries with deterministic conflict
//!   detection and optional compaction
//! - incremental-push bookkeeping (`with_remote_uncommited`,
//!   `next_remote_sequence`)
//! - a live change subscription that publishes only after commit
//!
//! # Example
//!
//! ```
//! use evlog_journal::EventJournal;
//!
//! let journal = EventJournal::open_in_memory()?;
//! let changes = journal.changes();
//!
//! let entry = journal.write("note.saved", "n1", b"hello".to_vec(), |_tx, _entry| Ok(()))?;
//! assert_eq!(changes.recv().unwrap(), entry);
//! # Ok::<(), evlog_journal::JournalError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod journal;
mod rows;

pub use error::{JournalError, JournalResult};
pub use journal::EventJournal;
