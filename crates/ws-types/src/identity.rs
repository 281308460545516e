//! Identity & merge rules over `State` — spec §4.1.

use std::collections::BTreeSet;

use tracing::warn;

use crate::guid::{relative_guid, source_guid, virtual_guid, ExternalSource};
use crate::state::{MediaKind, State};

/// All pointer strings a stored `State` can be located by: validated
/// external GUIDs, one virtual GUID per contributing backend, and (for
/// episodes lacking their own external ids) relative GUIDs against each
/// known parent pointer.
///
/// Sorted for determinism (used both as the mapper's index key space and
/// in tests asserting exact output).
pub fn pointers(state: &State) -> Vec<String> {
    let mut out = BTreeSet::new();

    for (source, value) in &state.guids {
        if let Some(src) = ExternalSource::parse(source) {
            if src.validate(value) {
                out.insert(source_guid(src, value));
            }
        }
    }

    for backend in state.metadata.keys() {
        if let Some(meta) = state.metadata.get(backend) {
            out.insert(virtual_guid(backend, &meta.remote_id));
        }
    }

    if state.kind == MediaKind::Episode && state.guids.is_empty() {
        if let (Some(season), Some(episode)) = (state.season, state.episode) {
            for (source, value) in &state.parent_guids {
                if let Some(src) = ExternalSource::parse(source) {
                    if src.validate(value) {
                        let parent_ptr = source_guid(src, value);
                        out.insert(relative_guid(&parent_ptr, season, episode));
                    }
                }
            }
            for (backend, remote_id) in &state.relative_guids {
                let parent_ptr = virtual_guid(backend, remote_id);
                out.insert(relative_guid(&parent_ptr, season, episode));
            }
        }
    }

    out.into_iter().collect()
}

/// `matches(a, b)`: true iff their pointer sets intersect, or — for
/// episodes — they share a parent pointer and `(season, episode)`.
pub fn matches(a: &State, b: &State) -> bool {
    let pa: BTreeSet<String> = pointers(a).into_iter().collect();
    let pb: BTreeSet<String> = pointers(b).into_iter().collect();
    if pa.intersection(&pb).next().is_some() {
        return true;
    }

    if a.kind == MediaKind::Episode && b.kind == MediaKind::Episode {
        if a.season.is_some() && a.season == b.season && a.episode == b.episode {
            let parents_a: BTreeSet<&String> = a.parent_guids.values().collect();
            let parents_b: BTreeSet<&String> = b.parent_guids.values().collect();
            if parents_a.intersection(&parents_b).next().is_some() {
                return true;
            }
        }
    }

    false
}

/// `merge(existing, incoming) -> State` per spec §4.1's rules and tie-breaks.
///
/// Tie-break resolution (Open Question, see `DESIGN.md` / `SPEC_FULL.md`
/// §4.4.1): incoming wins on strictly-greater `updated`; on equal
/// `updated`, whichever side has `watched == true` wins (watched state is
/// monotonic by policy); if both sides already agree, existing wins
/// (idempotence — this also makes `merge(s, s) == s`, invariant 4). A
/// tainted incoming state never takes this path regardless of `updated`:
/// it can move `progress` but must not flip `watched`/`via` on its own.
pub fn merge(existing: &State, incoming: &State) -> State {
    let mut out = existing.clone();

    let incoming_wins = incoming.updated > existing.updated;

    let tie_prefers_incoming =
        incoming.updated == existing.updated && incoming.watched && !existing.watched;

    if incoming.tainted {
        // Tainted events may move progress and timestamps but must never
        // flip `watched`/`via` by themselves.
        if incoming_wins {
            out.updated = incoming.updated.max(existing.updated);
            out.tainted = true;
        }
        if incoming.progress.is_some() {
            out.progress = incoming.progress;
        }
    } else if incoming_wins || tie_prefers_incoming {
        out.watched = incoming.watched;
        out.progress = incoming.progress.or(out.progress);
        out.via = incoming.via.clone();
        out.updated = incoming.updated.max(existing.updated);
        out.tainted = false;
    }

    merge_guid_map(&mut out.guids, &incoming.guids, existing, incoming);
    merge_guid_map(&mut out.parent_guids, &incoming.parent_guids, existing, incoming);
    for (k, v) in &incoming.relative_guids {
        out.relative_guids.entry(k.clone()).or_insert_with(|| v.clone());
    }

    for (backend, meta) in &incoming.metadata {
        out.metadata.insert(backend.clone(), meta.clone());
    }
    for (backend, extra) in &incoming.extra {
        out.extra.insert(backend.clone(), extra.clone());
    }

    if out.title.is_none() {
        out.title = incoming.title.clone();
    }
    if out.year.is_none() {
        out.year = incoming.year;
    }
    if out.season.is_none() {
        out.season = incoming.season;
    }
    if out.episode.is_none() {
        out.episode = incoming.episode;
    }

    out
}

fn merge_guid_map(
    out: &mut std::collections::BTreeMap<String, String>,
    incoming: &std::collections::BTreeMap<String, String>,
    existing: &State,
    incoming_state: &State,
) {
    for (source, value) in incoming {
        match out.get(source) {
            None => {
                out.insert(source.clone(), value.clone());
            }
            Some(existing_value) if existing_value != value => {
                warn!(
                    source = %source,
                    existing_value = %existing_value,
                    incoming_value = %value,
                    existing_id = ?existing.id,
                    "guid conflict on merge"
                );
                if incoming_state.updated >= existing.updated {
                    out.insert(source.clone(), value.clone());
                }
            }
            Some(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Metadata;
    use std::collections::BTreeMap;

    fn movie(backend: &str, imdb: &str, watched: bool, updated: i64) -> State {
        let mut guids = BTreeMap::new();
        guids.insert("imdb".to_owned(), imdb.to_owned());
        State::new(
            MediaKind::Movie,
            backend,
            Some("Dune".to_owned()),
            Some(2021),
            None,
            None,
            guids,
            Metadata {
                library_id: "1".into(),
                remote_id: "99".into(),
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

    #[test]
    fn matches_by_shared_guid() {
        let a = movie("home_jellyfin", "tt1160419", true, 100);
        let b = movie("home_plex", "tt1160419", true, 200);
        assert!(matches(&a, &b));
    }

    #[test]
    fn merge_is_idempotent() {
        let a = movie("home_jellyfin", "tt1160419", true, 100);
        let merged = merge(&a, &a);
        assert_eq!(merged.watched, a.watched);
        assert_eq!(merged.updated, a.updated);
        assert_eq!(merged.via, a.via);
    }

    #[test]
    fn newer_updated_wins() {
        let existing = movie("home_jellyfin", "tt1160419", true, 100);
        let incoming = movie("home_plex", "tt1160419", false, 200);
        let merged = merge(&existing, &incoming);
        assert!(!merged.watched);
        assert_eq!(merged.via, "home_plex");
        assert_eq!(merged.updated, 200);
        assert!(merged.metadata.contains_key("home_jellyfin"));
        assert!(merged.metadata.contains_key("home_plex"));
    }

    #[test]
    fn equal_updated_prefers_watched_true() {
        let existing = movie("home_jellyfin", "tt1160419", false, 100);
        let incoming = movie("home_plex", "tt1160419", true, 100);
        let merged = merge(&existing, &incoming);
        assert!(merged.watched);
    }

    #[test]
    fn tainted_incoming_does_not_flip_watched_even_with_later_timestamp() {
        let existing = movie("home_plex", "tt1160419", true, 100);
        let mut incoming = movie("home_plex", "tt1160419", false, 200);
        incoming.tainted = true;
        let merged = merge(&existing, &incoming);
        assert!(merged.watched);
        assert_eq!(merged.via, "home_plex");
    }

    #[test]
    fn tainted_incoming_still_moves_progress() {
        let existing = movie("home_plex", "tt1160419", true, 100);
        let mut incoming = movie("home_plex", "tt1160419", false, 200);
        incoming.tainted = true;
        incoming.progress = Some(42_000);
        let merged = merge(&existing, &incoming);
        assert!(merged.watched);
        assert_eq!(merged.progress, Some(42_000));
        assert_eq!(merged.updated, 200);
    }

    #[test]
    fn equal_updated_equal_watched_prefers_existing() {
        let existing = movie("home_jellyfin", "tt1160419", true, 100);
        let incoming = movie("home_plex", "tt1160419", true, 100);
        let merged = merge(&existing, &incoming);
        assert_eq!(merged.via, existing.via);
    }

    #[test]
    fn pointers_include_virtual_guid() {
        let a = movie("home_plex", "tt1160419", true, 100);
        let ptrs = pointers(&a);
        assert!(ptrs.contains(&"imdb://tt1160419".to_owned()));
        assert!(ptrs.contains(&"backend://home_plex:99".to_owned()));
    }
}
