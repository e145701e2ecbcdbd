//! Partition read feeds: paged backlog and live changes.

use crate::error::{ServerError, ServerResult};
use crate::partition::Partition;
use crate::storage::{stored_entry_from_row, table_exists, Storage};
use evlog_core::StoredEntry;
use rusqlite::params;
use std::collections::VecDeque;
use std::sync::mpsc::Receiver;
use std::sync::Arc;

/// Rows fetched per backlog page.
const PAGE_SIZE: usize = 256;

/// Lazy, paged, finite iterator over one partition's stored entries.
///
/// Pages are read on demand, each under its own short-lived lock, so a slow
/// consumer never holds the store open. A partition that has never been
/// written yields nothing.
pub struct Entries {
    storage: Storage,
    partition: Arc<Partition>,
    cursor: u64,
    buffer: VecDeque<StoredEntry>,
    done: bool,
}

impl Entries {
    pub(crate) fn new(storage: Storage, public_key: &[u8], from_sequence: u64) -> Self {
        let partition = storage.partition(public_key);
        Self {
            storage,
            partition,
            cursor: from_sequence,
            buffer: VecDeque::new(),
            done: false,
        }
    }

    fn fetch_page(&mut self) -> ServerResult<()> {
        const METHOD: &str = "entries";

        let conn = self.storage.inner().conn.lock();
        if !table_exists(&conn, self.partition.table()).map_err(ServerError::map(METHOD))? {
            self.done = true;
            return Ok(());
        }

        let mut stmt = conn
            .prepare(&format!(
                "SELECT sequence, entry_id, iv, encrypted_entry FROM {}
                 WHERE sequence >= ?1 ORDER BY sequence ASC LIMIT ?2",
                self.partition.table()
            ))
            .map_err(ServerError::map(METHOD))?;
        let rows = stmt
            .query_map(
                params![self.cursor as i64, PAGE_SIZE as i64],
                stored_entry_from_row,
            )
            .map_err(ServerError::map(METHOD))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(ServerError::map(METHOD))?;

        if rows.len() < PAGE_SIZE {
            self.done = true;
        }
        if let Some(last) = rows.last() {
            self.cursor = last.sequence + 1;
        }
        self.buffer.extend(rows);
        Ok(())
    }
}

impl Iterator for Entries {
    type Item = ServerResult<StoredEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(row) = self.buffer.pop_front() {
                return Some(Ok(row));
            }
            if self.done {
                return None;
            }
            if let Err(err) = self.fetch_page() {
                self.done = true;
                return Some(Err(err));
            }
        }
    }
}

/// Live, ordered, effectively-infinite iterator over one partition.
///
/// Drains the backlog first, then blocks on the partition's change bus.
/// The subscription is taken out *before* the backlog read, so an entry
/// committed around the seam appears in the backlog, the bus, or both —
/// duplicates are dropped by sequence, which makes the seam gap-free and
/// duplicate-free.
pub struct Changes {
    receiver: Receiver<StoredEntry>,
    backlog: Option<Entries>,
    last_sequence: u64,
}

impl Changes {
    pub(crate) fn new(storage: Storage, public_key: &[u8], from_sequence: u64) -> Self {
        let partition = storage.partition(public_key);
        // Subscribe first: anything committed after this lands on the bus.
        let receiver = partition.feed().subscribe();
        let backlog = storage.entries(public_key, from_sequence);
        Self {
            receiver,
            backlog: Some(backlog),
            last_sequence: from_sequence.saturating_sub(1),
        }
    }
}

impl Iterator for Changes {
    type Item = ServerResult<StoredEntry>;

    /// Blocks while waiting for live entries. Ends only when every handle to
    /// the storage has been dropped.
    fn next(&mut self) -> Option<Self::Item> {
        if let Some(backlog) = &mut self.backlog {
            match backlog.next() {
                Some(Ok(row)) => {
                    self.last_sequence = row.sequence;
                    return Some(Ok(row));
                }
                Some(Err(err)) => return Some(Err(err)),
                None => self.backlog = None,
            }
        }

        loop {
            match self.receiver.recv() {
                Ok(row) if row.sequence > self.last_sequence => {
                    self.last_sequence = row.sequence;
                    return Some(Ok(row));
                }
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    }
}
