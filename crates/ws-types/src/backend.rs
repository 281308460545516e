//! Backend-facing shapes shared by every adapter — spec §4.2.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The three supported vendor families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Plex,
    Jellyfin,
    Emby,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Plex => "plex",
            BackendKind::Jellyfin => "jellyfin",
            BackendKind::Emby => "emby",
        }
    }
}

/// What kind of library a backend reports — only `Movies`/`TvShows` (or
/// their vendor-equivalent names) are admitted by the importer (spec §4.3
/// step 2); everything else is skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibraryKind {
    Movies,
    TvShows,
    Other(String),
}

#[derive(Debug, Clone)]
pub struct Library {
    pub id: String,
    pub title: String,
    pub kind: LibraryKind,
}

/// One paginated fetch request for a library segment.
#[derive(Debug, Clone)]
pub struct PageRequest {
    pub library_id: String,
    pub offset: u32,
    pub limit: u32,
}

/// A raw (not-yet-decoded-per-item) page response. `body` is the full page
/// payload handed to the streaming parser (spec §4.3 step 6); `total` is
/// filled when the page response carries a total-count header/field
/// (size-0 "count" requests, spec §4.3 step 3).
#[derive(Debug, Clone)]
pub struct RawPage {
    pub body: Vec<u8>,
    pub total: Option<u32>,
}

/// A single decoded library item, still in vendor shape. Adapters convert
/// this to `State` via their own `toState`.
#[derive(Debug, Clone)]
pub struct RawItem {
    pub value: serde_json::Value,
}

impl RawItem {
    pub fn new(value: serde_json::Value) -> Self {
        RawItem { value }
    }
}

/// An inbound webhook delivery, already separated from its transport
/// framing by the (out-of-scope) HTTP route — the core only ever sees
/// headers + a decoded content-type + raw body.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    pub headers: BTreeMap<String, String>,
    pub content_type: String,
    pub body: Vec<u8>,
}

/// Attributes extracted from a webhook request by `inspect_request` —
/// spec §4.8 step 2.
#[derive(Debug, Clone, Default)]
pub struct RequestAttributes {
    pub user_id: Option<String>,
    pub backend_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BackendUser {
    pub id: String,
    pub name: String,
}

/// Per-backend configuration the orchestrator was handed by the
/// (out-of-scope) config loader — already validated.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub name: String,
    pub kind: BackendKind,
    pub base_url: String,
    pub token: String,
    pub user_id: String,
    /// Backend instance UUID, used by webhook UUID matching.
    pub backend_uuid: String,
    pub import_enabled: bool,
    pub export_enabled: bool,
    pub metadata_only: bool,
    pub webhook_match_user: bool,
    pub webhook_match_uuid: bool,
    pub segment_size: u32,
    pub ignored_libraries: Vec<String>,
}
