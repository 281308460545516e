//! SQLite-backed store fixtures for integration tests — a `tempfile`
//! database that outlives the `Store` handle wrapping it, matching how
//! the teacher's `forwarder`/`timer-core` suites open a scratch journal per
//! test rather than sharing one on-disk file across cases.

use tempfile::NamedTempFile;
use ws_store::Store;

pub struct StoreFixture {
    _file: NamedTempFile,
    pub store: Store,
}

impl StoreFixture {
    pub fn open() -> Self {
        let file = NamedTempFile::new().expect("create temp db file");
        let store = Store::open(file.path()).expect("open fixture store");
        StoreFixture { _file: file, store }
    }
}
