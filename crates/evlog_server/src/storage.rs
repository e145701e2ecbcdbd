//! Multi-tenant server storage.

use crate::error::{ServerError, ServerResult};
use crate::feed::{Changes, Entries};
use crate::partition::{Partition, Partitions};
use evlog_core::{EncryptedEntry, EntryId, StoredEntry};
use parking_lot::Mutex;
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, Row};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Maximum rows per insert statement, bounded by SQLite's default host
/// parameter limit (999) at three parameters per row.
const WRITE_BATCH_ROWS: usize = 256;

pub(crate) struct Inner {
    pub(crate) conn: Mutex<Connection>,
    remote_id: String,
    partitions: Partitions,
}

/// The authoritative, ordered, deduplicated store of encrypted entries,
/// partitioned by public key.
///
/// One partition holds the entries of one end-to-end-encrypted identity; the
/// server only ever sees entry IDs, IVs and ciphertext. Sequence numbers are
/// assigned at insert time by the store — the single ordering authority for
/// its partitions — serialized through the database write transaction.
///
/// `Storage` is a cheap handle over shared state; clone it to hand feeds to
/// other threads.
#[derive(Clone)]
pub struct Storage {
    inner: Arc<Inner>,
}

impl Storage {
    /// Opens (creating if needed) storage at the given path.
    pub fn open(path: impl AsRef<Path>) -> ServerResult<Self> {
        let conn = Connection::open(path).map_err(ServerError::map("open"))?;
        Self::with_connection(conn)
    }

    /// Opens fresh in-memory storage.
    pub fn open_in_memory() -> ServerResult<Self> {
        let conn = Connection::open_in_memory().map_err(ServerError::map("open"))?;
        Self::with_connection(conn)
    }

    /// Wraps an existing connection, applying the schema and establishing
    /// the storage's remote identity.
    ///
    /// The identity row is created idempotently: insert if absent, else
    /// read. It is generated once per store and never rotated.
    pub fn with_connection(mut conn: Connection) -> ServerResult<Self> {
        const METHOD: &str = "open";

        let remote_id = {
            let tx = conn.transaction().map_err(ServerError::map(METHOD))?;
            tx.execute(
                "CREATE TABLE IF NOT EXISTS remote_id (remote_id TEXT NOT NULL)",
                [],
            )
            .map_err(ServerError::map(METHOD))?;
            tx.execute(
                "INSERT INTO remote_id (remote_id)
                 SELECT ?1 WHERE NOT EXISTS (SELECT 1 FROM remote_id)",
                params![uuid::Uuid::new_v4().to_string()],
            )
            .map_err(ServerError::map(METHOD))?;
            let remote_id: String = tx
                .query_row("SELECT remote_id FROM remote_id LIMIT 1", [], |row| {
                    row.get(0)
                })
                .map_err(ServerError::map(METHOD))?;
            tx.commit().map_err(ServerError::map(METHOD))?;
            remote_id
        };

        Ok(Self {
            inner: Arc::new(Inner {
                conn: Mutex::new(conn),
                remote_id,
                partitions: Partitions::default(),
            }),
        })
    }

    /// Returns this storage's stable remote identity.
    #[must_use]
    pub fn remote_id(&self) -> &str {
        &self.inner.remote_id
    }

    /// Writes encrypted entries into a public key's partition.
    ///
    /// The partition (and its table) is created lazily on first write. The
    /// whole batch runs in one transaction with bounded-size insert
    /// statements; rows whose `entry_id` already exists in the partition are
    /// silently ignored, so re-sending a batch is safe.
    ///
    /// Because sequence assignment order under concurrent writers is not
    /// guaranteed to match input order, the just-inserted rows are re-read
    /// ordered by their assigned sequence before being published on the
    /// partition's change bus. Returns only the entries that were genuinely
    /// new, each with its assigned sequence.
    pub fn write(
        &self,
        public_key: &[u8],
        entries: &[EncryptedEntry],
    ) -> ServerResult<Vec<StoredEntry>> {
        const METHOD: &str = "write";

        let partition = self.inner.partitions.resolve(public_key);
        let stored = {
            let mut conn = self.inner.conn.lock();
            let tx = conn.transaction().map_err(ServerError::map(METHOD))?;

            ensure_partition_table(&tx, &partition).map_err(ServerError::map(METHOD))?;

            let prev_max: i64 = tx
                .query_row(
                    &format!(
                        "SELECT COALESCE(MAX(sequence), 0) FROM {}",
                        partition.table()
                    ),
                    [],
                    |row| row.get(0),
                )
                .map_err(ServerError::map(METHOD))?;

            for chunk in entries.chunks(WRITE_BATCH_ROWS) {
                let mut sql = format!(
                    "INSERT OR IGNORE INTO {} (entry_id, iv, encrypted_entry) VALUES ",
                    partition.table()
                );
                let mut values: Vec<Value> = Vec::with_capacity(chunk.len() * 3);
                for (i, entry) in chunk.iter().enumerate() {
                    if i > 0 {
                        sql.push(',');
                    }
                    sql.push_str("(?, ?, ?)");
                    values.push(Value::Blob(entry.entry_id.as_bytes().to_vec()));
                    values.push(Value::Blob(entry.iv.clone()));
                    values.push(Value::Blob(entry.ciphertext.clone()));
                }
                tx.execute(&sql, params_from_iter(values))
                    .map_err(ServerError::map(METHOD))?;
            }

            let submitted: HashSet<EntryId> = entries.iter().map(|e| e.entry_id).collect();
            let stored = {
                let mut stmt = tx
                    .prepare(&format!(
                        "SELECT sequence, entry_id, iv, encrypted_entry FROM {}
                         WHERE sequence > ?1 ORDER BY sequence ASC",
                        partition.table()
                    ))
                    .map_err(ServerError::map(METHOD))?;
                let rows = stmt
                    .query_map(params![prev_max], stored_entry_from_row)
                    .map_err(ServerError::map(METHOD))?
                    .collect::<rusqlite::Result<Vec<_>>>()
                    .map_err(ServerError::map(METHOD))?
                    .into_iter()
                    .filter(|row| submitted.contains(&row.entry.entry_id))
                    .collect::<Vec<_>>();
                rows
            };

            tx.commit().map_err(ServerError::map(METHOD))?;
            stored
        };

        debug!(
            partition = partition.table(),
            submitted = entries.len(),
            inserted = stored.len(),
            "partition write committed"
        );
        partition.feed().emit_batch(&stored);
        Ok(stored)
    }

    /// Reads a public key's partition from a sequence cursor.
    ///
    /// Returns a lazy, paged, finite iterator over entries with
    /// `sequence >= from_sequence` in sequence order. Restartable: a fresh
    /// call with a different cursor replays from that point. A partition
    /// that has never been written reads as empty.
    #[must_use]
    pub fn entries(&self, public_key: &[u8], from_sequence: u64) -> Entries {
        Entries::new(self.clone(), public_key, from_sequence)
    }

    /// Follows a public key's partition live from a sequence cursor.
    ///
    /// The returned iterator first drains the backlog (as
    /// [`entries`](Storage::entries) would), then blocks on the partition's
    /// change bus, with no gap and no duplicate at the seam. It only ends if
    /// every handle to this storage is dropped; dropping it releases the
    /// subscription without affecting other subscribers or in-flight writes.
    #[must_use]
    pub fn changes(&self, public_key: &[u8], from_sequence: u64) -> Changes {
        Changes::new(self.clone(), public_key, from_sequence)
    }

    pub(crate) fn partition(&self, public_key: &[u8]) -> Arc<Partition> {
        self.inner.partitions.resolve(public_key)
    }

    pub(crate) fn inner(&self) -> &Inner {
        &self.inner
    }
}

fn ensure_partition_table(conn: &Connection, partition: &Partition) -> rusqlite::Result<()> {
    // sequence is the rowid: strictly increasing, and gap-free because rows
    // are never deleted from a partition.
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            sequence        INTEGER PRIMARY KEY,
            iv              BLOB NOT NULL,
            entry_id        BLOB NOT NULL UNIQUE,
            encrypted_entry BLOB NOT NULL
        );",
        table = partition.table()
    ))
}

pub(crate) fn table_exists(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
    use rusqlite::OptionalExtension;

    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub(crate) fn stored_entry_from_row(row: &Row<'_>) -> rusqlite::Result<StoredEntry> {
    let sequence: i64 = row.get(0)?;
    let blob: Vec<u8> = row.get(1)?;
    let entry_id = EntryId::from_slice(&blob).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            Type::Blob,
            Box::new(evlog_core::CoreError::invalid_entry_id(blob.len())),
        )
    })?;

    Ok(StoredEntry::new(
        sequence as u64,
        EncryptedEntry::new(entry_id, row.get(2)?, row.get(3)?),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn storage() -> Storage {
        Storage::open_in_memory().unwrap()
    }

    fn encrypted(tail: u8) -> EncryptedEntry {
        EncryptedEntry::new(EntryId::new(), vec![tail; 12], vec![tail, tail])
    }

    #[test]
    fn remote_id_is_stable_across_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.db");

        let first = Storage::open(&path).unwrap().remote_id().to_string();
        let second = Storage::open(&path).unwrap().remote_id().to_string();
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn distinct_stores_get_distinct_identities() {
        assert_ne!(storage().remote_id(), storage().remote_id());
    }

    #[test]
    fn write_assigns_increasing_gap_free_sequences() {
        let storage = storage();
        let batch: Vec<_> = (0u8..5).map(encrypted).collect();

        let stored = storage.write(b"pk", &batch).unwrap();
        assert_eq!(stored.len(), 5);
        for (i, row) in stored.iter().enumerate() {
            assert_eq!(row.sequence, i as u64 + 1);
        }

        let more = storage.write(b"pk", &[encrypted(9)]).unwrap();
        assert_eq!(more[0].sequence, 6);
    }

    #[test]
    fn write_is_idempotent() {
        let storage = storage();
        let batch: Vec<_> = (0u8..3).map(encrypted).collect();

        let first = storage.write(b"pk", &batch).unwrap();
        assert_eq!(first.len(), 3);

        let second = storage.write(b"pk", &batch).unwrap();
        assert!(second.is_empty());

        let all: Vec<_> = storage
            .entries(b"pk", 0)
            .collect::<ServerResult<Vec<_>>>()
            .unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn duplicates_within_one_batch_are_ignored() {
        let storage = storage();
        let entry = encrypted(1);

        let stored = storage
            .write(b"pk", &[entry.clone(), entry.clone(), encrypted(2)])
            .unwrap();
        assert_eq!(stored.len(), 2);
    }

    #[test]
    fn write_returns_only_newly_inserted() {
        let storage = storage();
        let old = encrypted(1);
        storage.write(b"pk", &[old.clone()]).unwrap();

        let fresh = encrypted(2);
        let stored = storage.write(b"pk", &[old, fresh.clone()]).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].entry, fresh);
        assert_eq!(stored[0].sequence, 2);
    }

    #[test]
    fn large_batches_are_chunked() {
        let storage = storage();
        let batch: Vec<_> = (0..(WRITE_BATCH_ROWS + 17))
            .map(|_| encrypted(0))
            .collect();

        let stored = storage.write(b"pk", &batch).unwrap();
        assert_eq!(stored.len(), WRITE_BATCH_ROWS + 17);
        assert_eq!(stored.last().unwrap().sequence, (WRITE_BATCH_ROWS + 17) as u64);
    }

    #[test]
    fn partitions_are_isolated() {
        let storage = storage();
        storage.write(b"pk-a", &[encrypted(1)]).unwrap();
        storage.write(b"pk-b", &[encrypted(2), encrypted(3)]).unwrap();

        let a: Vec<_> = storage
            .entries(b"pk-a", 0)
            .collect::<ServerResult<Vec<_>>>()
            .unwrap();
        let b: Vec<_> = storage
            .entries(b"pk-b", 0)
            .collect::<ServerResult<Vec<_>>>()
            .unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 2);
        // Each partition numbers independently from 1.
        assert_eq!(a[0].sequence, 1);
        assert_eq!(b[0].sequence, 1);
    }

    #[test]
    fn entries_respects_cursor() {
        let storage = storage();
        let batch: Vec<_> = (0u8..4).map(encrypted).collect();
        storage.write(b"pk", &batch).unwrap();

        let tail: Vec<_> = storage
            .entries(b"pk", 3)
            .collect::<ServerResult<Vec<_>>>()
            .unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].sequence, 3);
        assert_eq!(tail[1].sequence, 4);
    }

    #[test]
    fn entries_of_unknown_partition_is_empty() {
        let storage = storage();
        assert_eq!(storage.entries(b"never-seen", 0).count(), 0);
    }

    #[test]
    fn changes_sees_backlog_then_live_without_gap_or_dup() {
        let storage = storage();
        storage.write(b"pk", &[encrypted(1), encrypted(2)]).unwrap();

        let mut changes = storage.changes(b"pk", 0);

        // Committed after the subscription but before the backlog is read:
        // this lands in both the backlog and the live bus and must still be
        // yielded exactly once.
        storage.write(b"pk", &[encrypted(3)]).unwrap();

        let first = changes.next().unwrap().unwrap();
        let second = changes.next().unwrap().unwrap();
        let third = changes.next().unwrap().unwrap();
        assert_eq!(
            (first.sequence, second.sequence, third.sequence),
            (1, 2, 3)
        );

        let writer = {
            let storage = storage.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                storage.write(b"pk", &[encrypted(4)]).unwrap();
            })
        };

        let fourth = changes.next().unwrap().unwrap();
        assert_eq!(fourth.sequence, 4);
        writer.join().unwrap();
    }

    #[test]
    fn changes_respects_cursor() {
        let storage = storage();
        let stored = storage
            .write(b"pk", &[encrypted(1), encrypted(2), encrypted(3)])
            .unwrap();

        let mut changes = storage.changes(b"pk", stored[1].sequence);
        assert_eq!(changes.next().unwrap().unwrap().sequence, 2);
        assert_eq!(changes.next().unwrap().unwrap().sequence, 3);
    }

    #[test]
    fn dropped_subscription_does_not_disturb_writers() {
        let storage = storage();
        let changes = storage.changes(b"pk", 0);
        drop(changes);

        storage.write(b"pk", &[encrypted(1)]).unwrap();
        assert_eq!(storage.partition(b"pk").feed().subscriber_count(), 0);
    }
}
