//! Conflict detection between concurrently created entries.

use crate::entry::Entry;

/// Two entries that share a logical key but have different IDs.
///
/// Conflicts are detected during remote ingestion by comparing each incoming
/// entry against the journal's current row for the same `(event,
/// primary_key)`. The core only detects and reports them; deciding what a
/// conflict *means* is up to the caller, optionally assisted by
/// [`Compaction`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    /// The entry already present in the ingesting journal.
    pub local: Entry,
    /// The incoming entry from the remote.
    pub remote: Entry,
}

impl Conflict {
    /// Creates a conflict pair.
    pub fn new(local: Entry, remote: Entry) -> Self {
        Self { local, remote }
    }

    /// Returns the shared logical key.
    #[must_use]
    pub fn logical_key(&self) -> (&str, &str) {
        self.local.logical_key()
    }

    /// Returns the winning side.
    ///
    /// The winner is the entry with the larger raw ID bytes. Since the ID's
    /// high bytes are its creation timestamp, this picks the newest entry and
    /// falls back to a lexicographic ID compare when timestamps are equal.
    /// The rule is a pure function of the two entries, so every device
    /// computes the same winner without coordination.
    #[must_use]
    pub fn winner(&self) -> &Entry {
        if self.remote.id > self.local.id {
            &self.remote
        } else {
            &self.local
        }
    }

    /// Returns the superseded side.
    #[must_use]
    pub fn superseded(&self) -> &Entry {
        if self.remote.id > self.local.id {
            &self.local
        } else {
            &self.remote
        }
    }
}

/// Policy applied to conflicting entries during remote ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compaction {
    /// Keep both sides; the caller reconciles from the returned conflicts.
    #[default]
    Off,
    /// Keep only [`Conflict::winner`], deleting the superseded row inside
    /// the ingest transaction.
    KeepWinner,
}

impl Compaction {
    /// Returns true if superseded entries are dropped.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        matches!(self, Compaction::KeepWinner)
    }
}
