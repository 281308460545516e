use std::collections::BTreeMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use watchstate::options::{BackupOptions, ImportOptions};
use watchstate::orchestrator::{BackendHandle, Orchestrator};
use ws_testing::{test_backend_config, FakeAdapter};
use ws_testing::StoreFixture;
use ws_types::{BackendKind, Library, LibraryKind, MediaKind, Metadata, State};

fn fake_state(title: &str, updated: i64) -> State {
    State::new(
        MediaKind::Movie,
        "jellyfin",
        Some(title.to_owned()),
        Some(2020),
        None,
        None,
        BTreeMap::from([("imdb".to_owned(), format!("tt{title}"))]),
        Metadata {
            library_id: "1".to_owned(),
            remote_id: "1".to_owned(),
            path: None,
            added_at: None,
            played_at: None,
            watched: true,
            progress_ms: None,
            extra: serde_json::Value::Null,
        },
        true,
        updated,
        None,
        false,
    )
}

#[tokio::test]
async fn import_admits_movie_and_tv_libraries_only_and_skips_others() {
    let mut fixture = StoreFixture::open();
    let adapter = FakeAdapter::new("jellyfin")
        .with_library(Library { id: "1".to_owned(), title: "Movies".to_owned(), kind: LibraryKind::Movies })
        .with_library(Library { id: "2".to_owned(), title: "Music".to_owned(), kind: LibraryKind::Other("music".to_owned()) })
        .with_page(vec![fake_state("Arrival", 100)]);

    let handle = BackendHandle { config: test_backend_config("jellyfin", BackendKind::Jellyfin), adapter: Arc::new(adapter) };
    let orchestrator = Orchestrator::new(vec![handle]);

    let report = orchestrator
        .import(&mut fixture.store, ImportOptions::default(), CancellationToken::new())
        .await
        .expect("import succeeds");

    let tally = report.backends.get("jellyfin").expect("jellyfin tally present");
    assert_eq!(tally.libraries, 1);
    assert_eq!(tally.items, 1);
    assert!(!tally.has_errors);

    let stored = fixture.store.iter_since(0).expect("read back store");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].title.as_deref(), Some("Arrival"));
}

#[tokio::test]
async fn import_is_a_noop_when_no_libraries_are_configured() {
    let mut fixture = StoreFixture::open();
    // No libraries seeded, so the page loop does nothing and the backend's
    // tally simply stays empty. A genuine `list_libraries` failure is
    // covered by the unreachable-backend scenario in tests/scenarios.rs.
    let adapter = FakeAdapter::new("jellyfin");
    let handle = BackendHandle { config: test_backend_config("jellyfin", BackendKind::Jellyfin), adapter: Arc::new(adapter) };
    let orchestrator = Orchestrator::new(vec![handle]);

    let report = orchestrator
        .import(&mut fixture.store, ImportOptions::default(), CancellationToken::new())
        .await
        .expect("import succeeds");

    let tally = report.backends.get("jellyfin").expect("jellyfin tally present");
    assert_eq!(tally.libraries, 0);
    assert_eq!(tally.items, 0);
}

#[tokio::test]
async fn metadata_only_import_counts_items_but_writes_nothing_to_store() {
    let mut fixture = StoreFixture::open();
    let adapter = FakeAdapter::new("jellyfin")
        .with_library(Library { id: "1".to_owned(), title: "Movies".to_owned(), kind: LibraryKind::Movies })
        .with_page(vec![fake_state("Arrival", 100)]);

    let handle = BackendHandle { config: test_backend_config("jellyfin", BackendKind::Jellyfin), adapter: Arc::new(adapter) };
    let orchestrator = Orchestrator::new(vec![handle]);

    let opts = ImportOptions { metadata_only: true, ..Default::default() };
    let report = orchestrator
        .import(&mut fixture.store, opts, CancellationToken::new())
        .await
        .expect("import succeeds");

    let tally = report.backends.get("jellyfin").expect("jellyfin tally present");
    assert_eq!(tally.libraries, 1);
    assert_eq!(tally.items, 1, "items are still counted against TotalRecordCount");
    assert!(!tally.has_errors);

    let stored = fixture.store.iter_since(0).expect("read back store");
    assert!(stored.is_empty(), "metadata_only must not write play state to the store");
}

#[tokio::test]
async fn backup_writes_one_json_line_per_state_and_paginates() {
    let mut fixture = StoreFixture::open();
    for n in 0..5 {
        let state = fake_state(&format!("Movie{n}"), 100 + i64::from(n));
        fixture.store.upsert(&state).expect("seed state");
    }

    let handle = BackendHandle {
        config: test_backend_config("jellyfin", BackendKind::Jellyfin),
        adapter: Arc::new(FakeAdapter::new("jellyfin")),
    };
    let orchestrator = Orchestrator::new(vec![handle]);

    let mut buf = Vec::new();
    let report = orchestrator
        .backup(&fixture.store, BackupOptions { page_size: 2 }, &CancellationToken::new(), &mut buf)
        .expect("backup succeeds");

    assert_eq!(report.states_written, 5);
    let lines = String::from_utf8(buf).expect("utf8 output");
    assert_eq!(lines.lines().count(), 5);
}
