//! Test fixtures for journals and server storage.

use evlog_journal::EventJournal;
use evlog_server::Storage;
use std::sync::Once;
use tempfile::TempDir;

/// A test journal with automatic cleanup.
pub struct TestJournal {
    /// The journal instance.
    pub journal: EventJournal,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestJournal {
    /// Creates an in-memory test journal.
    pub fn memory() -> Self {
        Self {
            journal: EventJournal::open_in_memory().expect("open in-memory journal"),
            _temp_dir: None,
        }
    }

    /// Creates a file-based test journal in a temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("create temp directory");
        let journal =
            EventJournal::open(temp_dir.path().join("journal.db")).expect("open file journal");
        Self {
            journal,
            _temp_dir: Some(temp_dir),
        }
    }
}

impl std::ops::Deref for TestJournal {
    type Target = EventJournal;

    fn deref(&self) -> &Self::Target {
        &self.journal
    }
}

/// A test server storage with automatic cleanup.
pub struct TestStorage {
    /// The storage instance.
    pub storage: Storage,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestStorage {
    /// Creates in-memory test storage.
    pub fn memory() -> Self {
        Self {
            storage: Storage::open_in_memory().expect("open in-memory storage"),
            _temp_dir: None,
        }
    }

    /// Creates file-based test storage in a temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("create temp directory");
        let storage = Storage::open(temp_dir.path().join("storage.db")).expect("open file storage");
        Self {
            storage,
            _temp_dir: Some(temp_dir),
        }
    }
}

impl std::ops::Deref for TestStorage {
    type Target = Storage;

    fn deref(&self) -> &Self::Target {
        &self.storage
    }
}

/// Runs a test with a temporary in-memory journal.
pub fn with_temp_journal<F, R>(f: F) -> R
where
    F: FnOnce(&EventJournal) -> R,
{
    let test_journal = TestJournal::memory();
    f(&test_journal.journal)
}

/// Runs a test with temporary in-memory server storage.
pub fn with_temp_storage<F, R>(f: F) -> R
where
    F: FnOnce(&Storage) -> R,
{
    let test_storage = TestStorage::memory();
    f(&test_storage.storage)
}

/// Installs a test-friendly tracing subscriber once per process.
///
/// Controlled by `RUST_LOG`; safe to call from every test.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
