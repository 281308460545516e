//! A `BackendConfig` builder with test-friendly defaults, so callers only
//! override what a given scenario actually cares about.

use ws_types::{BackendConfig, BackendKind};

pub fn test_backend_config(name: impl Into<String>, kind: BackendKind) -> BackendConfig {
    BackendConfig {
        name: name.into(),
        kind,
        base_url: "http://localhost".to_owned(),
        token: "test-token".to_owned(),
        user_id: "user-1".to_owned(),
        backend_uuid: "00000000-0000-0000-0000-000000000000".to_owned(),
        import_enabled: true,
        export_enabled: true,
        metadata_only: false,
        webhook_match_user: false,
        webhook_match_uuid: false,
        segment_size: 1,
        ignored_libraries: Vec::new(),
    }
}
