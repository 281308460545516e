//! The embedded SQL store for canonical `State` records — spec §4.6.
//!
//! Backed by `rusqlite` (bundled SQLite), matching
//! `services/forwarder/src/storage/journal.rs`'s durability posture: WAL
//! mode, `synchronous=FULL`, an integrity check at open. JSON columns use
//! SQLite's `json_extract`/`json_each` for the indexed pointer lookups
//! spec §4.6 calls for, instead of an ORM.

use std::collections::BTreeMap;
use std::path::Path;

use rusqlite::{params, params_from_iter, Connection, Row};
use tracing::warn;
use ws_types::{identity, Extra, MediaKind, Metadata, State};

use crate::error::StoreError;

/// Sort field for `Store::page`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Updated,
    Id,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Filter predicate for `Store::page`. `None` fields are unconstrained.
#[derive(Debug, Clone, Default)]
pub struct PageFilter {
    pub via: Option<String>,
    pub kind: Option<MediaKind>,
    pub since: Option<i64>,
}

pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the store at `path`. Runs `PRAGMA integrity_check`
    /// and refuses to start if it fails (spec §7: store-unopenable is Fatal).
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        apply_pragmas(&conn)?;
        run_integrity_check(&conn)?;
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok(Store { conn })
    }

    /// In-memory store, used by tests and by short-lived webhook draining
    /// runs that don't need cross-process durability.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok(Store { conn })
    }

    pub fn get(&self, id: i64) -> Result<Option<State>, StoreError> {
        let mut stmt = self.conn.prepare(SELECT_COLUMNS_SQL_BY_ID)?;
        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => Ok(Some(map_row(row)?)),
            None => Ok(None),
        }
    }

    /// Find all stored states whose pointer set intersects `pointers`.
    pub fn find_by_pointers(&self, pointers: &[String]) -> Result<Vec<State>, StoreError> {
        if pointers.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = std::iter::repeat("?")
            .take(pointers.len())
            .collect::<Vec<_>>()
            .join(",");
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM state WHERE EXISTS (
                SELECT 1 FROM json_each(state.pointers) WHERE json_each.value IN ({placeholders})
            ) ORDER BY id ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(pointers.iter()), map_row_fn)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r??);
        }
        Ok(out)
    }

    /// Insert or merge-update a `State`. Returns `(id, created)`.
    ///
    /// Identity is resolved via `find_by_pointers(identity::pointers(state))`.
    /// If more than one existing row matches (a violation of invariant 3),
    /// the first (lowest id) is treated as canonical and a warning logged.
    pub fn upsert(&mut self, incoming: &State) -> Result<(i64, bool), StoreError> {
        let ptrs = identity::pointers(incoming);
        if ptrs.is_empty() {
            return Err(StoreError::InvalidData(
                "state has no guids, virtual guids, or relative guids".to_owned(),
            ));
        }

        let candidates = self.find_by_pointers(&ptrs)?;
        if candidates.len() > 1 {
            warn!(
                count = candidates.len(),
                "multiple existing rows matched identity pointers; merging into lowest id"
            );
        }

        match candidates.into_iter().next() {
            None => {
                let id = self.insert_new(incoming)?;
                Ok((id, true))
            }
            Some(existing) => {
                let merged = identity::merge(&existing, incoming);
                self.update_row(existing.id.expect("stored state always has an id"), &merged)?;
                Ok((existing.id.unwrap(), false))
            }
        }
    }

    pub fn delete(&mut self, id: i64) -> Result<(), StoreError> {
        self.conn.execute("DELETE FROM state WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Paginated, filtered, sorted listing plus total matching count.
    pub fn page(
        &self,
        filter: &PageFilter,
        sort: (SortField, SortOrder),
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<State>, u64), StoreError> {
        let (where_sql, args) = build_where(filter);
        let order_col = match sort.0 {
            SortField::Updated => "updated",
            SortField::Id => "id",
        };
        let order_dir = match sort.1 {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };

        let count_sql = format!("SELECT COUNT(*) FROM state {where_sql}");
        let total: i64 = self
            .conn
            .query_row(&count_sql, params_from_iter(args.iter()), |r| r.get(0))?;

        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM state {where_sql} ORDER BY {order_col} {order_dir} LIMIT ?{n1} OFFSET ?{n2}",
            n1 = args.len() + 1,
            n2 = args.len() + 2,
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut all_args: Vec<String> = args;
        all_args.push(limit.to_string());
        all_args.push(offset.to_string());
        let rows = stmt.query_map(params_from_iter(all_args.iter()), map_row_fn)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r??);
        }
        Ok((out, total.max(0) as u64))
    }

    /// States whose `metadata` has fewer than `min_metadata` backend
    /// entries — the parity diagnostic (spec §4.6/§GLOSSARY).
    pub fn parity(&self, min_metadata: usize) -> Result<Vec<State>, StoreError> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM state WHERE (
                SELECT COUNT(*) FROM json_each(json_extract(metadata, '$'))
            ) < ?1"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![min_metadata as i64], map_row_fn)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r??);
        }
        Ok(out)
    }

    /// Borrow the webhook TTL cache bucket named `name` (`"requests"` or
    /// `"progress"`, spec §4.8 step 7).
    pub fn cache_bucket(&self, name: &'static str) -> crate::cache_bucket::CacheBucket<'_> {
        crate::cache_bucket::CacheBucket::new(&self.conn, name)
    }

    /// All states with `updated > since` — backs export's input selection
    /// (spec §4.4).
    pub fn iter_since(&self, since: i64) -> Result<Vec<State>, StoreError> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM state WHERE updated > ?1 ORDER BY id ASC");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![since], map_row_fn)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r??);
        }
        Ok(out)
    }

    fn insert_new(&mut self, state: &State) -> Result<i64, StoreError> {
        let ptrs = identity::pointers(state);
        let ptrs_json = serde_json::to_string(&ptrs)?;
        self.conn.execute(
            "INSERT INTO state
                (type, via, title, year, season, episode, watched, updated, progress, tainted,
                 guids, parent, relative, metadata, extra, pointers)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16)",
            params![
                kind_to_str(state.kind),
                state.via,
                state.title,
                state.year,
                state.season,
                state.episode,
                state.watched as i64,
                state.updated,
                state.progress.map(|p| p as i64),
                state.tainted as i64,
                serde_json::to_string(&state.guids)?,
                serde_json::to_string(&state.parent_guids)?,
                serde_json::to_string(&state.relative_guids)?,
                serde_json::to_string(&state.metadata)?,
                serde_json::to_string(&state.extra)?,
                ptrs_json,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update_row(&mut self, id: i64, state: &State) -> Result<(), StoreError> {
        let ptrs = identity::pointers(state);
        let ptrs_json = serde_json::to_string(&ptrs)?;
        self.conn.execute(
            "UPDATE state SET
                type=?2, via=?3, title=?4, year=?5, season=?6, episode=?7, watched=?8,
                updated=?9, progress=?10, tainted=?11, guids=?12, parent=?13, relative=?14,
                metadata=?15, extra=?16, pointers=?17
             WHERE id=?1",
            params![
                id,
                kind_to_str(state.kind),
                state.via,
                state.title,
                state.year,
                state.season,
                state.episode,
                state.watched as i64,
                state.updated,
                state.progress.map(|p| p as i64),
                state.tainted as i64,
                serde_json::to_string(&state.guids)?,
                serde_json::to_string(&state.parent_guids)?,
                serde_json::to_string(&state.relative_guids)?,
                serde_json::to_string(&state.metadata)?,
                serde_json::to_string(&state.extra)?,
                ptrs_json,
            ],
        )?;
        Ok(())
    }
}

const SELECT_COLUMNS: &str = "id, type, via, title, year, season, episode, watched, updated, \
    progress, tainted, guids, parent, relative, metadata, extra";
const SELECT_COLUMNS_SQL_BY_ID: &str = "SELECT id, type, via, title, year, season, episode, \
    watched, updated, progress, tainted, guids, parent, relative, metadata, extra \
    FROM state WHERE id = ?1";

fn kind_to_str(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Movie => "movie",
        MediaKind::Episode => "episode",
        MediaKind::Show => "show",
    }
}

fn str_to_kind(s: &str) -> Result<MediaKind, StoreError> {
    match s {
        "movie" => Ok(MediaKind::Movie),
        "episode" => Ok(MediaKind::Episode),
        "show" => Ok(MediaKind::Show),
        other => Err(StoreError::InvalidData(format!("unknown state type '{other}'"))),
    }
}

fn map_row_fn(row: &Row<'_>) -> rusqlite::Result<Result<State, StoreError>> {
    Ok(map_row(row))
}

fn map_row(row: &Row<'_>) -> Result<State, StoreError> {
    let kind_str: String = row.get(1)?;
    let guids: String = row.get(11)?;
    let parent: String = row.get(12)?;
    let relative: String = row.get(13)?;
    let metadata: String = row.get(14)?;
    let extra: String = row.get(15)?;

    Ok(State {
        id: Some(row.get(0)?),
        kind: str_to_kind(&kind_str)?,
        via: row.get(2)?,
        title: row.get(3)?,
        year: row.get(4)?,
        season: row.get::<_, Option<i64>>(5)?.map(|v| v as u32),
        episode: row.get::<_, Option<i64>>(6)?.map(|v| v as u32),
        watched: row.get::<_, i64>(7)? != 0,
        updated: row.get(8)?,
        progress: row.get::<_, Option<i64>>(9)?.map(|v| v as u64),
        tainted: row.get::<_, i64>(10)? != 0,
        guids: serde_json::from_str::<BTreeMap<String, String>>(&guids)?,
        parent_guids: serde_json::from_str::<BTreeMap<String, String>>(&parent)?,
        relative_guids: serde_json::from_str::<BTreeMap<String, String>>(&relative)?,
        metadata: serde_json::from_str::<BTreeMap<String, Metadata>>(&metadata)?,
        extra: serde_json::from_str::<BTreeMap<String, Extra>>(&extra)?,
    })
}

fn build_where(filter: &PageFilter) -> (String, Vec<String>) {
    let mut clauses = Vec::new();
    let mut args = Vec::new();

    if let Some(via) = &filter.via {
        clauses.push(format!("via = ?{}", args.len() + 1));
        args.push(via.clone());
    }
    if let Some(kind) = filter.kind {
        clauses.push(format!("type = ?{}", args.len() + 1));
        args.push(kind_to_str(kind).to_owned());
    }
    if let Some(since) = filter.since {
        clauses.push(format!("updated > ?{}", args.len() + 1));
        args.push(since.to_string());
    }

    if clauses.is_empty() {
        (String::new(), args)
    } else {
        (format!("WHERE {}", clauses.join(" AND ")), args)
    }
}

fn apply_pragmas(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA synchronous=FULL;
         PRAGMA foreign_keys=ON;",
    )?;
    Ok(())
}

fn run_integrity_check(conn: &Connection) -> Result<(), StoreError> {
    let result: String = conn.pragma_query_value(None, "integrity_check", |row| row.get(0))?;
    if result != "ok" {
        return Err(StoreError::IntegrityCheckFailed(result));
    }
    Ok(())
}
