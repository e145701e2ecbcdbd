//! Schema and row mapping for the journal tables.

use evlog_core::{CoreError, Entry, EntryId};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

/// Journal schema.
///
/// `entries.timestamp` is derived from the entry id at insert time and kept
/// only for SQL-side inspection; the read path recovers the timestamp from
/// the id. `remotes` holds one row per entry a given remote is known to have
/// committed.
pub(crate) const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS entries (
    id          BLOB PRIMARY KEY,
    event       TEXT NOT NULL,
    primary_key TEXT NOT NULL,
    payload     BLOB NOT NULL,
    timestamp   INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_entries_logical_key ON entries (event, primary_key);
CREATE TABLE IF NOT EXISTS remotes (
    remote_id   TEXT NOT NULL,
    entry_id    BLOB NOT NULL,
    sequence    INTEGER NOT NULL,
    PRIMARY KEY (remote_id, entry_id)
);
";

pub(crate) fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<Entry> {
    let blob: Vec<u8> = row.get(0)?;
    let id = EntryId::from_slice(&blob).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            Type::Blob,
            Box::new(CoreError::invalid_entry_id(blob.len())),
        )
    })?;

    Ok(Entry {
        id,
        event: row.get(1)?,
        primary_key: row.get(2)?,
        payload: row.get(3)?,
    })
}

pub(crate) fn insert_entry(conn: &Connection, entry: &Entry) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO entries (id, event, primary_key, payload, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            entry.id.as_bytes().as_slice(),
            entry.event,
            entry.primary_key,
            entry.payload,
            entry.timestamp_millis() as i64,
        ],
    )?;
    Ok(())
}

pub(crate) fn delete_entry(conn: &Connection, id: EntryId) -> rusqlite::Result<()> {
    conn.execute(
        "DELETE FROM entries WHERE id = ?1",
        params![id.as_bytes().as_slice()],
    )?;
    Ok(())
}

pub(crate) fn entry_exists(conn: &Connection, id: EntryId) -> rusqlite::Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM entries WHERE id = ?1",
            params![id.as_bytes().as_slice()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub(crate) fn find_entry(conn: &Connection, id: EntryId) -> rusqlite::Result<Option<Entry>> {
    conn.query_row(
        "SELECT id, event, primary_key, payload FROM entries WHERE id = ?1",
        params![id.as_bytes().as_slice()],
        entry_from_row,
    )
    .optional()
}

/// Looks up the newest local entry with the given logical key.
///
/// With compaction disabled a key can accumulate more than one row; incoming
/// entries are always compared against the newest, which keeps the outcome
/// deterministic.
pub(crate) fn find_by_logical_key(
    conn: &Connection,
    event: &str,
    primary_key: &str,
) -> rusqlite::Result<Option<Entry>> {
    conn.query_row(
        "SELECT id, event, primary_key, payload FROM entries
         WHERE event = ?1 AND primary_key = ?2
         ORDER BY id DESC
         LIMIT 1",
        params![event, primary_key],
        entry_from_row,
    )
    .optional()
}

pub(crate) fn record_watermark(
    conn: &Connection,
    remote_id: &str,
    entry_id: EntryId,
    sequence: u64,
) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT OR IGNORE INTO remotes (remote_id, entry_id, sequence) VALUES (?1, ?2, ?3)",
        params![remote_id, entry_id.as_bytes().as_slice(), sequence as i64],
    )
}
