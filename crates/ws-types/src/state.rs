//! The canonical `State` entity — spec §3.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed media-type alphabet. `Show` participates in identity/merge but is
/// never a push/export target — only its episodes carry a watched flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Movie,
    Episode,
    Show,
}

/// Per-backend snapshot of one item, keyed by backend name in `State::metadata`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub library_id: String,
    pub remote_id: String,
    pub path: Option<String>,
    pub added_at: Option<DateTime<Utc>>,
    pub played_at: Option<DateTime<Utc>>,
    pub watched: bool,
    pub progress_ms: Option<u64>,
    #[serde(default)]
    pub extra: serde_json::Value,
}

/// Per-backend auxiliary event info, keyed by backend name in `State::extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extra {
    pub event: String,
    pub event_at: DateTime<Utc>,
}

/// The canonical play-state record. See spec §3 for the full field table
/// and invariants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    /// Store-scoped monotonic identity. `None` until the first `Store::upsert`.
    pub id: Option<i64>,
    pub kind: MediaKind,
    /// Name of the backend that last contributed an accepted write.
    pub via: String,
    pub title: Option<String>,
    pub year: Option<i32>,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    /// `source -> external id`, e.g. `"imdb" -> "tt1160419"`.
    #[serde(default)]
    pub guids: BTreeMap<String, String>,
    /// Same shape, identifying the parent show for episodes.
    #[serde(default)]
    pub parent_guids: BTreeMap<String, String>,
    /// Episode position relative to a parent, for episodes without their own guids.
    #[serde(default)]
    pub relative_guids: BTreeMap<String, String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Metadata>,
    #[serde(default)]
    pub extra: BTreeMap<String, Extra>,
    pub watched: bool,
    /// Unix time (seconds) of last accepted write.
    pub updated: i64,
    pub progress: Option<u64>,
    /// Derived from an untrusted (in-progress) transition. See spec §4.8.
    #[serde(default)]
    pub tainted: bool,
}

impl State {
    /// Construct a new `State` from a backend's already-normalized fields.
    ///
    /// This is spec §4.1's `newState(raw, backend)`: the caller (an
    /// adapter's `toState`) has already mapped vendor payload shapes into
    /// these canonical fields; this constructor only fills in the
    /// bookkeeping (`via`, `metadata[backend]`, `updated`) that every
    /// adapter needs identically.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        kind: MediaKind,
        backend: &str,
        title: Option<String>,
        year: Option<i32>,
        season: Option<u32>,
        episode: Option<u32>,
        guids: BTreeMap<String, String>,
        meta: Metadata,
        watched: bool,
        updated: i64,
        progress: Option<u64>,
        tainted: bool,
    ) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert(backend.to_owned(), meta);
        State {
            id: None,
            kind,
            via: backend.to_owned(),
            title,
            year,
            season,
            episode,
            guids,
            parent_guids: BTreeMap::new(),
            relative_guids: BTreeMap::new(),
            metadata,
            extra: BTreeMap::new(),
            watched,
            updated,
            progress,
            tainted,
        }
    }

    /// True when the episode invariant (`season >= 0 && episode >= 1`) is
    /// satisfied. Always true for non-episode kinds.
    pub fn episode_identity_valid(&self) -> bool {
        if self.kind != MediaKind::Episode {
            return true;
        }
        matches!((self.season, self.episode), (Some(_), Some(e)) if e >= 1)
    }

    /// `via ∈ metadata.keys()` — spec §3 invariant.
    pub fn via_in_metadata(&self) -> bool {
        self.metadata.contains_key(&self.via)
    }
}
