use std::collections::BTreeMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use watchstate::orchestrator::{BackendHandle, Orchestrator};
use watchstate::options::ExportOptions;
use ws_testing::{test_backend_config, FakeAdapter, StoreFixture};
use ws_types::{BackendKind, MediaKind, Metadata, State};

fn canonical_state(watched: bool, updated: i64) -> State {
    State::new(
        MediaKind::Movie,
        "plex",
        Some("Arrival".to_owned()),
        Some(2016),
        None,
        None,
        BTreeMap::from([("imdb".to_owned(), "tt2543164".to_owned())]),
        Metadata {
            library_id: "1".to_owned(),
            remote_id: "100".to_owned(),
            path: None,
            added_at: None,
            played_at: None,
            watched,
            progress_ms: None,
            extra: serde_json::Value::Null,
        },
        watched,
        updated,
        None,
        false,
    )
}

#[tokio::test]
async fn export_pushes_to_a_fresh_target_when_canonical_is_watched() {
    let mut fixture = StoreFixture::open();
    let state = canonical_state(true, 100);
    fixture.store.upsert(&state).expect("seed canonical state");

    let adapter = Arc::new(FakeAdapter::new("jellyfin"));
    let handle = BackendHandle {
        config: test_backend_config("jellyfin", BackendKind::Jellyfin),
        adapter: adapter.clone(),
    };
    let orchestrator = Orchestrator::new(vec![handle]);

    let report = orchestrator
        .export(&fixture.store, ExportOptions::default(), CancellationToken::new())
        .await
        .expect("export succeeds");

    assert_eq!(adapter.pushed.lock().unwrap().len(), 1);
    assert_eq!(report.backends.get("jellyfin").map(|t| t.queued), Some(1));
}

#[tokio::test]
async fn export_is_a_noop_when_remote_already_matches() {
    let mut fixture = StoreFixture::open();
    let mut state = canonical_state(true, 100);
    state.metadata.insert(
        "jellyfin".to_owned(),
        Metadata {
            library_id: "1".to_owned(),
            remote_id: "200".to_owned(),
            path: None,
            added_at: None,
            played_at: chrono::DateTime::from_timestamp(50, 0),
            watched: true,
            progress_ms: None,
            extra: serde_json::Value::Null,
        },
    );
    fixture.store.upsert(&state).expect("seed canonical state");

    let adapter = Arc::new(FakeAdapter::new("jellyfin"));
    let handle = BackendHandle {
        config: test_backend_config("jellyfin", BackendKind::Jellyfin),
        adapter: adapter.clone(),
    };
    let orchestrator = Orchestrator::new(vec![handle]);

    orchestrator
        .export(&fixture.store, ExportOptions::default(), CancellationToken::new())
        .await
        .expect("export succeeds");

    assert!(adapter.pushed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn export_skips_tainted_states() {
    let mut fixture = StoreFixture::open();
    let mut state = canonical_state(true, 100);
    state.tainted = true;
    fixture.store.upsert(&state).expect("seed canonical state");

    let adapter = Arc::new(FakeAdapter::new("jellyfin"));
    let handle = BackendHandle {
        config: test_backend_config("jellyfin", BackendKind::Jellyfin),
        adapter: adapter.clone(),
    };
    let orchestrator = Orchestrator::new(vec![handle]);

    orchestrator
        .export(&fixture.store, ExportOptions::default(), CancellationToken::new())
        .await
        .expect("export succeeds");

    assert!(adapter.pushed.lock().unwrap().is_empty());
}
