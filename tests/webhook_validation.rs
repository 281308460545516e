use std::collections::BTreeMap;

use watchstate::ingest;
use ws_testing::{test_backend_config, FakeAdapter, StoreFixture};
use ws_types::{BackendKind, MediaKind, Metadata, State, WebhookRequest};

fn empty_request() -> WebhookRequest {
    WebhookRequest {
        headers: BTreeMap::new(),
        content_type: "application/json".to_owned(),
        body: Vec::new(),
    }
}

fn movie_state(via: &str) -> State {
    State::new(
        MediaKind::Movie,
        via,
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
            watched: true,
            progress_ms: None,
            extra: serde_json::Value::Null,
        },
        true,
        100,
        None,
        false,
    )
}

#[test]
fn rejects_when_webhook_user_does_not_match() {
    let fixture = StoreFixture::open();
    let adapter = FakeAdapter::new("jellyfin");
    adapter.queue_webhook(movie_state("jellyfin"));
    let config = ws_types::BackendConfig {
        webhook_match_user: true,
        ..test_backend_config("jellyfin", BackendKind::Jellyfin)
    };

    let outcome =
        ingest::handle_webhook(&config, &adapter, &empty_request(), &fixture.store, 0).expect("validation runs");

    assert!(matches!(outcome, watchstate::WebhookOutcome::Invalid(_)));
}

#[test]
fn rejects_when_import_disabled_and_not_metadata_only() {
    let fixture = StoreFixture::open();
    let adapter = FakeAdapter::new("jellyfin");
    adapter.queue_webhook(movie_state("jellyfin"));
    let config = ws_types::BackendConfig {
        import_enabled: false,
        metadata_only: false,
        ..test_backend_config("jellyfin", BackendKind::Jellyfin)
    };

    let outcome =
        ingest::handle_webhook(&config, &adapter, &empty_request(), &fixture.store, 0).expect("validation runs");

    assert_eq!(outcome, watchstate::WebhookOutcome::ImportDisabled);
}

#[test]
fn ignores_episode_without_season_number() {
    let fixture = StoreFixture::open();
    let adapter = FakeAdapter::new("jellyfin");
    let mut state = movie_state("jellyfin");
    state.kind = MediaKind::Episode;
    state.episode = Some(3);
    state.season = None;
    adapter.queue_webhook(state);
    let config = test_backend_config("jellyfin", BackendKind::Jellyfin);

    let outcome =
        ingest::handle_webhook(&config, &adapter, &empty_request(), &fixture.store, 0).expect("validation runs");

    assert_eq!(outcome, watchstate::WebhookOutcome::Ignored);
}

#[test]
fn accepts_a_valid_movie_event_and_queues_it() {
    let mut fixture = StoreFixture::open();
    let adapter = FakeAdapter::new("jellyfin");
    adapter.queue_webhook(movie_state("jellyfin"));
    let config = test_backend_config("jellyfin", BackendKind::Jellyfin);

    let outcome =
        ingest::handle_webhook(&config, &adapter, &empty_request(), &fixture.store, 0).expect("validation runs");
    assert_eq!(outcome, watchstate::WebhookOutcome::Accepted);

    let mut mapper = ws_mapper::Mapper::new();
    let report = ingest::drain_requests(&mut fixture.store, &mut mapper, 0).expect("drain succeeds");
    assert_eq!(report.backends.get("jellyfin").map(|t| t.items), Some(1));
}
