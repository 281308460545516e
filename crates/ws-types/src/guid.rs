//! External identity sources and the GUID/pointer grammar.
//!
//! A `State`'s identity is the set of `(source, value)` pairs in its
//! `guids` map, widened with a per-backend virtual GUID
//! (`backend://<name>:<remote_id>`) so that items without any third-party
//! identifier can still be located on return visits. See spec §3/§4.1.

use std::fmt;

/// Fixed alphabet of supported external identifier sources.
///
/// Unknown sources are discarded with a warning at the adapter boundary —
/// they never reach `State::guids`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExternalSource {
    Imdb,
    Tvdb,
    Tmdb,
    Tvmaze,
    Tvrage,
    Anidb,
}

impl ExternalSource {
    pub const ALL: [ExternalSource; 6] = [
        ExternalSource::Imdb,
        ExternalSource::Tvdb,
        ExternalSource::Tmdb,
        ExternalSource::Tvmaze,
        ExternalSource::Tvrage,
        ExternalSource::Anidb,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExternalSource::Imdb => "imdb",
            ExternalSource::Tvdb => "tvdb",
            ExternalSource::Tmdb => "tmdb",
            ExternalSource::Tvmaze => "tvmaze",
            ExternalSource::Tvrage => "tvrage",
            ExternalSource::Anidb => "anidb",
        }
    }

    /// Parse a source tag (case-insensitive). Returns `None` for anything
    /// outside the fixed alphabet — callers must log and drop, never store.
    pub fn parse(tag: &str) -> Option<Self> {
        let lower = tag.to_ascii_lowercase();
        Self::ALL.into_iter().find(|s| s.as_str() == lower)
    }

    /// Validation pattern per source. `imdb` is the one pattern the spec
    /// states explicitly (`^tt\d+$`); the remaining sources use the same
    /// "prefix-free decimal id" shape used by their respective APIs, since
    /// the distilled spec and the (unavailable) original source are both
    /// silent on the exact grammar beyond "validation pattern per source" —
    /// see DESIGN.md's Open Question resolution.
    pub fn validate(&self, value: &str) -> bool {
        match self {
            ExternalSource::Imdb => IMDB_RE.is_match(value),
            ExternalSource::Tvdb
            | ExternalSource::Tmdb
            | ExternalSource::Tvmaze
            | ExternalSource::Tvrage
            | ExternalSource::Anidb => NUMERIC_RE.is_match(value),
        }
    }
}

impl fmt::Display for ExternalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static IMDB_RE: once_lock::Lazy<regex::Regex> =
    once_lock::Lazy::new(|| regex::Regex::new(r"^tt\d+$").unwrap());
static NUMERIC_RE: once_lock::Lazy<regex::Regex> =
    once_lock::Lazy::new(|| regex::Regex::new(r"^\d+$").unwrap());

/// Minimal lazy-static shim so this crate doesn't need an extra dependency
/// purely for two regexes; mirrors the teacher's preference for reaching
/// for the smallest fitting tool (`regex` is already an aligned dependency,
/// a full `once_cell`/`lazy_static` add is not — `std::sync::OnceLock`
/// covers it).
mod once_lock {
    use std::sync::OnceLock;

    pub struct Lazy<T> {
        cell: OnceLock<T>,
        init: fn() -> T,
    }

    impl<T> Lazy<T> {
        pub const fn new(init: fn() -> T) -> Self {
            Lazy {
                cell: OnceLock::new(),
                init,
            }
        }
    }

    impl<T> std::ops::Deref for Lazy<T> {
        type Target = T;
        fn deref(&self) -> &T {
            self.cell.get_or_init(self.init)
        }
    }
}

/// Build the virtual GUID for a backend-local remote id.
///
/// Grammar: `backend://<name>:<remote_id>`, `<name>` matching `[a-z0-9_]+`.
pub fn virtual_guid(backend: &str, remote_id: &str) -> String {
    format!("backend://{backend}:{remote_id}")
}

/// Build a relative GUID pointer for an episode lacking its own external ids.
///
/// Grammar: `relative://<parent_pointer>:S<season>E<episode>`.
pub fn relative_guid(parent_pointer: &str, season: u32, episode: u32) -> String {
    format!("relative://{parent_pointer}:S{season:02}E{episode:02}")
}

/// Build the `source://value` pointer for a validated external GUID.
pub fn source_guid(source: ExternalSource, value: &str) -> String {
    format!("{source}://{value}")
}
