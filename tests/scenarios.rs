use std::collections::BTreeMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use watchstate::ingest;
use watchstate::options::ImportOptions;
use watchstate::orchestrator::{BackendHandle, Orchestrator};
use ws_testing::{test_backend_config, FakeAdapter, StoreFixture};
use ws_types::{BackendConfig, BackendKind, Library, LibraryKind, MediaKind, Metadata, State, WebhookRequest};

fn dune(via: &str, watched: bool, updated: i64) -> State {
    State::new(
        MediaKind::Movie,
        via,
        Some("Dune".to_owned()),
        Some(2021),
        None,
        None,
        BTreeMap::from([("imdb".to_owned(), "tt1160419".to_owned())]),
        Metadata {
            library_id: "1".to_owned(),
            remote_id: "42".to_owned(),
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

fn movies_library(id: &str) -> Library {
    Library { id: id.to_owned(), title: "Movies".to_owned(), kind: LibraryKind::Movies }
}

/// S1 — a Jellyfin import reports one watched movie with an imdb guid.
#[tokio::test]
async fn s1_jellyfin_import_creates_one_movie_state() {
    let mut fixture = StoreFixture::open();
    let adapter = FakeAdapter::new("home_jellyfin")
        .with_library(movies_library("1"))
        .with_page(vec![dune("home_jellyfin", true, 100)]);
    let handle = BackendHandle {
        config: test_backend_config("home_jellyfin", BackendKind::Jellyfin),
        adapter: Arc::new(adapter),
    };
    let orchestrator = Orchestrator::new(vec![handle]);

    orchestrator
        .import(&mut fixture.store, ImportOptions::default(), CancellationToken::new())
        .await
        .expect("import succeeds");

    let stored = fixture.store.iter_since(0).expect("read back store");
    assert_eq!(stored.len(), 1);
    assert!(stored[0].watched);
    assert_eq!(stored[0].via, "home_jellyfin");
    assert_eq!(stored[0].guids.get("imdb").map(String::as_str), Some("tt1160419"));
}

/// S2 — a later Plex webhook for the same movie merges into the same row
/// instead of creating a second one, and `via` flips to Plex.
#[tokio::test]
async fn s2_plex_webhook_merges_into_existing_jellyfin_row() {
    let mut fixture = StoreFixture::open();
    fixture.store.upsert(&dune("home_jellyfin", true, 100)).expect("seed jellyfin state");

    let plex_adapter = FakeAdapter::new("home_plex");
    plex_adapter.queue_webhook(dune("home_plex", true, 1_714_640_400));
    let plex_config = BackendConfig { name: "home_plex".to_owned(), ..test_backend_config("home_plex", BackendKind::Plex) };

    let req = WebhookRequest { headers: BTreeMap::new(), content_type: "application/json".to_owned(), body: Vec::new() };
    let outcome =
        ingest::handle_webhook(&plex_config, &plex_adapter, &req, &fixture.store, 1_714_640_400).expect("webhook handled");
    assert_eq!(outcome, watchstate::WebhookOutcome::Accepted);

    let mut mapper = ws_mapper::Mapper::new();
    mapper.seed(fixture.store.iter_since(0).expect("seed mapper from store"));
    ingest::drain_requests(&mut fixture.store, &mut mapper, 1_714_640_400).expect("drain succeeds");

    let stored = fixture.store.iter_since(0).expect("read back store");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].via, "home_plex");
    assert_eq!(stored[0].updated, 1_714_640_400);
    assert!(stored[0].metadata.contains_key("home_jellyfin"));
    assert!(stored[0].metadata.contains_key("home_plex"));
}

/// S4 — import across three backends where one is unreachable: the other
/// two still produce states, the unreachable one is flagged, and nothing
/// in the store attributes to it.
#[tokio::test]
async fn s4_unreachable_backend_does_not_abort_the_others() {
    let mut fixture = StoreFixture::open();
    let healthy_a = FakeAdapter::new("home_jellyfin")
        .with_library(movies_library("1"))
        .with_page(vec![dune("home_jellyfin", true, 100)]);
    let healthy_b = FakeAdapter::new("home_emby")
        .with_library(movies_library("1"))
        .with_page(vec![{
            let mut s = dune("home_emby", true, 100);
            s.guids = BTreeMap::from([("tmdb".to_owned(), "438631".to_owned())]);
            s
        }]);
    let unreachable = FakeAdapter::new("home_plex").unreachable();

    let handles = vec![
        BackendHandle { config: test_backend_config("home_jellyfin", BackendKind::Jellyfin), adapter: Arc::new(healthy_a) },
        BackendHandle { config: test_backend_config("home_emby", BackendKind::Emby), adapter: Arc::new(healthy_b) },
        BackendHandle { config: test_backend_config("home_plex", BackendKind::Plex), adapter: Arc::new(unreachable) },
    ];
    let orchestrator = Orchestrator::new(handles);

    let report = orchestrator
        .import(&mut fixture.store, ImportOptions::default(), CancellationToken::new())
        .await
        .expect("import call itself does not error");

    assert!(report.has_any_errors());
    assert!(report.backends.get("home_plex").map(|t| t.has_errors).unwrap_or(false));
    assert_eq!(report.backends.get("home_jellyfin").map(|t| t.has_errors), Some(false));
    assert_eq!(report.backends.get("home_emby").map(|t| t.has_errors), Some(false));

    let stored = fixture.store.iter_since(0).expect("read back store");
    assert!(stored.iter().all(|s| s.via != "home_plex"));
    assert_eq!(stored.len(), 2);
}

/// S6 — a 2350-item Jellyfin library with SEGMENT_SIZE=1000 is fetched in
/// exactly three segments, and every item across all three is decoded.
#[tokio::test]
async fn s6_paginated_library_fetches_three_segments() {
    let mut fixture = StoreFixture::open();
    let mut adapter = FakeAdapter::new("home_jellyfin").with_library(movies_library("1"));
    for (segment, count) in [(0usize, 1000), (1, 1000), (2, 350)] {
        let page: Vec<State> = (0..count)
            .map(|n| {
                let mut s = dune("home_jellyfin", true, 100);
                s.guids = BTreeMap::from([("tmdb".to_owned(), format!("{segment}-{n}"))]);
                s
            })
            .collect();
        adapter = adapter.with_page(page);
    }

    let config = BackendConfig { segment_size: 1000, ..test_backend_config("home_jellyfin", BackendKind::Jellyfin) };
    let handle = BackendHandle { config, adapter: Arc::new(adapter) };
    let orchestrator = Orchestrator::new(vec![handle]);

    let report = orchestrator
        .import(&mut fixture.store, ImportOptions::default(), CancellationToken::new())
        .await
        .expect("import succeeds");

    let tally = report.backends.get("home_jellyfin").expect("tally present");
    assert_eq!(tally.items, 2350);
    assert!(!tally.has_errors);

    let stored = fixture.store.iter_since(0).expect("read back store");
    assert_eq!(stored.len(), 2350);
}
