//! The device-local event journal.

use crate::error::{JournalError, JournalResult};
use crate::rows;
use evlog_core::{ChangeFeed, Compaction, Conflict, Entry, EntryId, RemoteEntry};
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use rusqlite::{params, Connection, Transaction};
use std::path::Path;
use std::sync::mpsc::Receiver;
use tracing::debug;

/// The single source of truth for events a device has produced or accepted.
///
/// The journal durably records locally-originated and remotely-ingested
/// entries, tracks a per-remote watermark of what each remote has committed,
/// and broadcasts newly committed entries to local subscribers. It is
/// single-writer by construction: one device, one journal.
///
/// Every multi-step operation runs inside one SQLite transaction; on any
/// failure the transaction rolls back and the next call observes the journal
/// as if the failed operation never ran.
pub struct EventJournal {
    conn: Mutex<Option<Connection>>,
    feed: ChangeFeed<Entry>,
}

impl EventJournal {
    /// Opens (creating if needed) a journal at the given path.
    pub fn open(path: impl AsRef<Path>) -> JournalResult<Self> {
        let conn = Connection::open(path).map_err(JournalError::map("open"))?;
        Self::with_connection(conn)
    }

    /// Opens a fresh in-memory journal.
    pub fn open_in_memory() -> JournalResult<Self> {
        let conn = Connection::open_in_memory().map_err(JournalError::map("open"))?;
        Self::with_connection(conn)
    }

    /// Wraps an existing connection, applying the journal schema.
    pub fn with_connection(conn: Connection) -> JournalResult<Self> {
        conn.execute_batch(rows::SCHEMA)
            .map_err(JournalError::map("open"))?;
        Ok(Self {
            conn: Mutex::new(Some(conn)),
            feed: ChangeFeed::new(),
        })
    }

    fn conn(&self, method: &'static str) -> JournalResult<MappedMutexGuard<'_, Connection>> {
        MutexGuard::try_map(self.conn.lock(), |conn| conn.as_mut())
            .map_err(|_| JournalError::destroyed(method))
    }

    /// Writes a locally-originated entry.
    ///
    /// A fresh [`EntryId`](evlog_core::EntryId) is generated from the current
    /// time; the row insert and the caller-supplied `effect` run in one
    /// transaction. The entry becomes visible to readers and to [`changes`]
    /// only if both succeeded; on failure nothing is observable.
    ///
    /// The `effect` receives the open transaction, so derived local state
    /// can be updated atomically with the entry itself.
    ///
    /// [`changes`]: EventJournal::changes
    pub fn write<F>(
        &self,
        event: &str,
        primary_key: &str,
        payload: Vec<u8>,
        effect: F,
    ) -> JournalResult<Entry>
    where
        F: FnOnce(&Transaction<'_>, &Entry) -> JournalResult<()>,
    {
        const METHOD: &str = "write";

        let entry = Entry::new(event, primary_key, payload);
        {
            let mut conn = self.conn(METHOD)?;
            let tx = conn.transaction().map_err(JournalError::map(METHOD))?;
            rows::insert_entry(&tx, &entry).map_err(JournalError::map(METHOD))?;
            effect(&tx, &entry)?;
            tx.commit().map_err(JournalError::map(METHOD))?;
        }

        debug!(id = %entry.id, event, primary_key, "journal write committed");
        self.feed.emit(entry.clone());
        Ok(entry)
    }

    /// Ingests entries pulled from a remote.
    ///
    /// One transaction covers the whole batch. Per entry:
    ///
    /// 1. the `(remote_id, entry_id, sequence)` watermark row is recorded;
    ///    if it already existed the entry was processed from this remote
    ///    before and is skipped entirely, which keeps re-deliveries free of
    ///    duplicate rows *and* duplicate conflict reports;
    /// 2. an entry whose id already exists locally is not re-inserted (this
    ///    is also how the device's own pushed entries are acknowledged);
    /// 3. otherwise a local entry with the same logical key and a different
    ///    id is reported as a [`Conflict`], and `compaction` decides whether
    ///    the superseded side is dropped inside the same transaction;
    /// 4. surviving entries are inserted.
    ///
    /// Newly inserted entries are published to subscribers after commit.
    /// Returns the detected conflicts for the caller to reconcile.
    pub fn write_from_remote(
        &self,
        remote_id: &str,
        entries: &[RemoteEntry],
        compaction: Compaction,
    ) -> JournalResult<Vec<Conflict>> {
        const METHOD: &str = "write_from_remote";

        let mut conflicts = Vec::new();
        let mut inserted = Vec::new();
        {
            let mut conn = self.conn(METHOD)?;
            let tx = conn.transaction().map_err(JournalError::map(METHOD))?;

            for remote in entries {
                let recorded =
                    rows::record_watermark(&tx, remote_id, remote.entry.id, remote.sequence)
                        .map_err(JournalError::map(METHOD))?;
                if recorded == 0 {
                    continue;
                }

                if rows::entry_exists(&tx, remote.entry.id).map_err(JournalError::map(METHOD))? {
                    continue;
                }

                let local = rows::find_by_logical_key(
                    &tx,
                    &remote.entry.event,
                    &remote.entry.primary_key,
                )
                .map_err(JournalError::map(METHOD))?;

                match local {
                    Some(local) => {
                        let conflict = Conflict::new(local, remote.entry.clone());
                        debug!(
                            event = %remote.entry.event,
                            primary_key = %remote.entry.primary_key,
                            winner = %conflict.winner().id,
                            "conflict detected during remote ingest"
                        );

                        let keep_remote = match compaction {
                            Compaction::Off => true,
                            Compaction::KeepWinner => {
                                let remote_wins = conflict.winner().id == remote.entry.id;
                                if remote_wins {
                                    rows::delete_entry(&tx, conflict.superseded().id)
                                        .map_err(JournalError::map(METHOD))?;
                                }
                                remote_wins
                            }
                        };

                        if keep_remote {
                            rows::insert_entry(&tx, &remote.entry)
                                .map_err(JournalError::map(METHOD))?;
                            inserted.push(remote.entry.clone());
                        }
                        conflicts.push(conflict);
                    }
                    None => {
                        rows::insert_entry(&tx, &remote.entry)
                            .map_err(JournalError::map(METHOD))?;
                        inserted.push(remote.entry.clone());
                    }
                }
            }

            tx.commit().map_err(JournalError::map(METHOD))?;
        }

        debug!(
            remote_id,
            received = entries.len(),
            inserted = inserted.len(),
            conflicts = conflicts.len(),
            "remote ingest committed"
        );
        self.feed.emit_batch(&inserted);
        Ok(conflicts)
    }

    /// Returns local entries the given remote has not committed yet, in id
    /// (hence creation-time) order. This is what a sync process pushes next.
    pub fn with_remote_uncommited(&self, remote_id: &str) -> JournalResult<Vec<Entry>> {
        const METHOD: &str = "with_remote_uncommited";

        let conn = self.conn(METHOD)?;
        let mut stmt = conn
            .prepare(
                "SELECT id, event, primary_key, payload FROM entries AS e
                 WHERE NOT EXISTS (
                     SELECT 1 FROM remotes AS r
                     WHERE r.remote_id = ?1 AND r.entry_id = e.id
                 )
                 ORDER BY e.id ASC",
            )
            .map_err(JournalError::map(METHOD))?;

        let entries = stmt
            .query_map(params![remote_id], rows::entry_from_row)
            .map_err(JournalError::map(METHOD))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(JournalError::map(METHOD))?;
        Ok(entries)
    }

    /// Returns the next sequence expected from the given remote: `0` when no
    /// rows exist for it, else the highest recorded sequence plus one.
    pub fn next_remote_sequence(&self, remote_id: &str) -> JournalResult<u64> {
        const METHOD: &str = "next_remote_sequence";

        let conn = self.conn(METHOD)?;
        let next: i64 = conn
            .query_row(
                "SELECT COALESCE(MAX(sequence) + 1, 0) FROM remotes WHERE remote_id = ?1",
                params![remote_id],
                |row| row.get(0),
            )
            .map_err(JournalError::map(METHOD))?;
        Ok(next as u64)
    }

    /// Subscribes to entries committed after this call.
    ///
    /// The subscription is live-only: it never replays history (use
    /// [`entries`](EventJournal::entries) or
    /// [`with_remote_uncommited`](EventJournal::with_remote_uncommited) for
    /// backlog) and never misses an entry committed after it was created.
    /// Dropping the receiver releases the subscription.
    pub fn changes(&self) -> Receiver<Entry> {
        self.feed.subscribe()
    }

    /// Returns all entries in id order.
    pub fn entries(&self) -> JournalResult<Vec<Entry>> {
        const METHOD: &str = "entries";

        let conn = self.conn(METHOD)?;
        let mut stmt = conn
            .prepare("SELECT id, event, primary_key, payload FROM entries ORDER BY id ASC")
            .map_err(JournalError::map(METHOD))?;

        let entries = stmt
            .query_map([], rows::entry_from_row)
            .map_err(JournalError::map(METHOD))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(JournalError::map(METHOD))?;
        Ok(entries)
    }

    /// Looks up one entry by id.
    pub fn entry(&self, id: EntryId) -> JournalResult<Option<Entry>> {
        const METHOD: &str = "entry";

        let conn = self.conn(METHOD)?;
        rows::find_entry(&conn, id).map_err(JournalError::map(METHOD))
    }

    /// Returns the number of entries.
    pub fn len(&self) -> JournalResult<usize> {
        const METHOD: &str = "len";

        let conn = self.conn(METHOD)?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))
            .map_err(JournalError::map(METHOD))?;
        Ok(count as usize)
    }

    /// Returns true if the journal holds no entries.
    pub fn is_empty(&self) -> JournalResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Releases the underlying storage resources.
    ///
    /// Idempotent; subsequent operations fail with a `Destroyed` error.
    pub fn destroy(&self) {
        self.conn.lock().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evlog_core::{EntryId, RANDOM_LEN};
    use std::time::Duration;

    fn journal() -> EventJournal {
        EventJournal::open_in_memory().unwrap()
    }

    fn no_effect(_: &Transaction<'_>, _: &Entry) -> JournalResult<()> {
        Ok(())
    }

    fn remote_entry(sequence: u64, millis: u64, tail: u8, key: &str) -> RemoteEntry {
        let id = EntryId::from_parts(millis, [tail; RANDOM_LEN]);
        RemoteEntry::new(sequence, Entry::with_id(id, "note.saved", key, vec![tail]))
    }

    #[test]
    fn write_persists_and_publishes() {
        let journal = journal();
        let changes = journal.changes();

        let entry = journal
            .write("note.saved", "n1", vec![1, 2, 3], no_effect)
            .unwrap();

        assert_eq!(journal.len().unwrap(), 1);
        assert_eq!(journal.entry(entry.id).unwrap(), Some(entry.clone()));

        let published = changes.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(published, entry);
    }

    #[test]
    fn effect_runs_inside_the_transaction() {
        let journal = journal();

        journal
            .write("note.saved", "n1", vec![], |tx, entry| {
                // The entry row is already visible to the effect.
                let count: i64 = tx
                    .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))
                    .map_err(JournalError::map("write"))?;
                assert_eq!(count, 1);
                tx.execute(
                    "CREATE TABLE IF NOT EXISTS derived (entry_id BLOB)",
                    [],
                )
                .map_err(JournalError::map("write"))?;
                tx.execute(
                    "INSERT INTO derived (entry_id) VALUES (?1)",
                    params![entry.id.as_bytes().as_slice()],
                )
                .map_err(JournalError::map("write"))?;
                Ok(())
            })
            .unwrap();

        let derived: i64 = journal
            .conn("test")
            .unwrap()
            .query_row("SELECT COUNT(*) FROM derived", [], |row| row.get(0))
            .unwrap();
        assert_eq!(derived, 1);
    }

    #[test]
    fn failed_effect_rolls_back_everything() {
        let journal = journal();
        let changes = journal.changes();

        let result = journal.write("note.saved", "n1", vec![], |_, _| {
            Err(JournalError::effect("write", "derived state update failed"))
        });

        assert!(matches!(result, Err(JournalError::Effect { .. })));
        assert!(journal.is_empty().unwrap());
        assert!(changes.try_recv().is_err());
    }

    #[test]
    fn write_from_remote_inserts_and_advances_watermark() {
        let journal = journal();
        let batch = vec![
            remote_entry(1, 1_000, 0x01, "a"),
            remote_entry(2, 2_000, 0x02, "b"),
        ];

        let conflicts = journal
            .write_from_remote("server-1", &batch, Compaction::Off)
            .unwrap();

        assert!(conflicts.is_empty());
        assert_eq!(journal.len().unwrap(), 2);
        assert_eq!(journal.next_remote_sequence("server-1").unwrap(), 3);
        assert_eq!(journal.next_remote_sequence("server-2").unwrap(), 0);
    }

    #[test]
    fn write_from_remote_is_idempotent() {
        let journal = journal();
        let changes = journal.changes();
        let batch = vec![
            remote_entry(1, 1_000, 0x01, "a"),
            remote_entry(2, 2_000, 0x02, "b"),
        ];

        journal
            .write_from_remote("server-1", &batch, Compaction::Off)
            .unwrap();
        let second = journal
            .write_from_remote("server-1", &batch, Compaction::Off)
            .unwrap();

        assert!(second.is_empty());
        assert_eq!(journal.len().unwrap(), 2);
        assert_eq!(journal.next_remote_sequence("server-1").unwrap(), 3);

        // Only the first delivery was published.
        assert_eq!(changes.try_iter().count(), 2);
    }

    #[test]
    fn redelivered_conflict_is_not_reported_twice() {
        let journal = journal();
        journal
            .write("note.saved", "n1", vec![0xAA], no_effect)
            .unwrap();

        let batch = vec![remote_entry(1, u64::MAX, 0x10, "n1")];
        let first = journal
            .write_from_remote("server-1", &batch, Compaction::Off)
            .unwrap();
        assert_eq!(first.len(), 1);

        let second = journal
            .write_from_remote("server-1", &batch, Compaction::Off)
            .unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn conflict_reports_both_sides() {
        let journal = journal();
        let local = journal
            .write("note.saved", "n1", vec![0xAA], no_effect)
            .unwrap();

        let incoming = remote_entry(1, u64::MAX, 0x10, "n1");
        let conflicts = journal
            .write_from_remote("server-1", &[incoming.clone()], Compaction::Off)
            .unwrap();

        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].local, local);
        assert_eq!(conflicts[0].remote, incoming.entry);
        // Compaction off: both rows survive.
        assert_eq!(journal.len().unwrap(), 2);
    }

    #[test]
    fn compaction_drops_superseded_local_row() {
        let journal = journal();
        journal
            .write("note.saved", "n1", vec![0xAA], no_effect)
            .unwrap();

        // Far-future timestamp: the remote entry wins.
        let incoming = remote_entry(1, u64::MAX, 0x10, "n1");
        let conflicts = journal
            .write_from_remote("server-1", &[incoming.clone()], Compaction::KeepWinner)
            .unwrap();

        assert_eq!(conflicts.len(), 1);
        let entries = journal.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0], incoming.entry);
    }

    #[test]
    fn compaction_skips_superseded_remote_entry() {
        let journal = journal();
        let local = journal
            .write("note.saved", "n1", vec![0xAA], no_effect)
            .unwrap();

        // Epoch-old timestamp: the local entry wins.
        let incoming = remote_entry(1, 1, 0x10, "n1");
        let conflicts = journal
            .write_from_remote("server-1", &[incoming], Compaction::KeepWinner)
            .unwrap();

        assert_eq!(conflicts.len(), 1);
        let entries = journal.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0], local);
        // The watermark still advanced for the dropped entry.
        assert_eq!(journal.next_remote_sequence("server-1").unwrap(), 2);
    }

    #[test]
    fn own_entries_are_acknowledged_not_duplicated() {
        let journal = journal();
        let entry = journal
            .write("note.saved", "n1", vec![1], no_effect)
            .unwrap();

        assert_eq!(journal.with_remote_uncommited("server-1").unwrap().len(), 1);

        // The server echoes the entry back with its assigned sequence.
        let echo = RemoteEntry::new(1, entry);
        let conflicts = journal
            .write_from_remote("server-1", &[echo], Compaction::Off)
            .unwrap();

        assert!(conflicts.is_empty());
        assert_eq!(journal.len().unwrap(), 1);
        assert!(journal.with_remote_uncommited("server-1").unwrap().is_empty());
    }

    #[test]
    fn uncommitted_entries_are_ordered_by_id() {
        let journal = journal();
        journal.write("e", "k1", vec![], no_effect).unwrap();
        journal.write("e", "k2", vec![], no_effect).unwrap();
        journal.write("e", "k3", vec![], no_effect).unwrap();

        let pending = journal.with_remote_uncommited("server-1").unwrap();
        assert_eq!(pending.len(), 3);
        assert!(pending.windows(2).all(|pair| pair[0].id < pair[1].id));
    }

    #[test]
    fn changes_does_not_replay_history() {
        let journal = journal();
        journal.write("e", "k1", vec![], no_effect).unwrap();

        let changes = journal.changes();
        journal.write("e", "k2", vec![], no_effect).unwrap();

        let received: Vec<Entry> = changes.try_iter().collect();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].primary_key, "k2");
    }

    #[test]
    fn reopening_preserves_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.db");

        {
            let journal = EventJournal::open(&path).unwrap();
            journal.write("e", "k", vec![1], no_effect).unwrap();
            journal
                .write_from_remote("server-1", &[remote_entry(1, 1_000, 0x01, "r")], Compaction::Off)
                .unwrap();
            journal.destroy();
        }

        let journal = EventJournal::open(&path).unwrap();
        assert_eq!(journal.len().unwrap(), 2);
        assert_eq!(journal.next_remote_sequence("server-1").unwrap(), 2);
    }

    #[test]
    fn destroy_is_idempotent() {
        let journal = journal();
        journal.write("e", "k", vec![], no_effect).unwrap();

        journal.destroy();
        journal.destroy();

        let err = journal.len().unwrap_err();
        assert!(matches!(err, JournalError::Destroyed { method: "len" }));

        let err = journal
            .write("e", "k", vec![], no_effect)
            .unwrap_err();
        assert!(matches!(err, JournalError::Destroyed { method: "write" }));
    }
}
