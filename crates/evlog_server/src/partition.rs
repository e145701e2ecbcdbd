//! Per-identity partition handles.
//!
//! Every public key maps to one partition: its own `events_<suffix>` table
//! plus an in-process change bus. The registry below is the only place a
//! partition table name is ever built.

use evlog_core::{partition_suffix, ChangeFeed, StoredEntry};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Handle to one public key's partition.
pub(crate) struct Partition {
    table: String,
    feed: ChangeFeed<StoredEntry>,
}

impl Partition {
    fn new(suffix: &str) -> Self {
        Self {
            table: format!("events_{suffix}"),
            feed: ChangeFeed::new(),
        }
    }

    /// Returns the partition's table name.
    pub(crate) fn table(&self) -> &str {
        &self.table
    }

    /// Returns the partition's change bus.
    pub(crate) fn feed(&self) -> &ChangeFeed<StoredEntry> {
        &self.feed
    }
}

/// Registry mapping partition suffixes to live handles.
///
/// Handles are created lazily and cached so all writers and subscribers of
/// one partition share the same change bus.
#[derive(Default)]
pub(crate) struct Partitions {
    map: RwLock<HashMap<String, Arc<Partition>>>,
}

impl Partitions {
    /// Resolves the partition handle for a public key.
    pub(crate) fn resolve(&self, public_key: &[u8]) -> Arc<Partition> {
        let suffix = partition_suffix(public_key);

        if let Some(partition) = self.map.read().get(&suffix) {
            return Arc::clone(partition);
        }

        let mut map = self.map.write();
        Arc::clone(
            map.entry(suffix.clone())
                .or_insert_with(|| Arc::new(Partition::new(&suffix))),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_is_cached() {
        let partitions = Partitions::default();
        let a = partitions.resolve(b"key-1");
        let b = partitions.resolve(b"key-1");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn distinct_keys_get_distinct_tables() {
        let partitions = Partitions::default();
        let a = partitions.resolve(b"key-1");
        let b = partitions.resolve(b"key-2");
        assert_ne!(a.table(), b.table());
        assert!(a.table().starts_with("events_"));
    }
}
