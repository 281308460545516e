//! Pipeline orchestrator: import, export/progress, and backup — spec §4.3,
//! §4.4, §6.1. Owns its mapper and queue per run (spec §5: "ownership is
//! exclusive"); the store is shared by reference.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use ws_adapters::{BackendAdapter, Context};
use ws_mapper::Mapper;
use ws_queue::{Queue, QueueOptions, QueueOutcome, ReqwestTransport, Transport};
use ws_store::{PageFilter, SortField, SortOrder, Store};
use ws_types::{BackendConfig, Library, LibraryKind, PageRequest, State};

use crate::error::Error;
use crate::options::{BackupOptions, ExportOptions, ImportOptions};
use crate::page_handler::{LogCtx, PageError, PageHandler};
use crate::panic_guard;
use crate::run_report::{BackupReport, RunReport};
use crate::streaming;

const DEFAULT_SEGMENT_SIZE: u32 = 1000;

/// One configured backend plus the adapter instance that speaks to it.
pub struct BackendHandle {
    pub config: BackendConfig,
    pub adapter: Arc<dyn BackendAdapter>,
}

pub struct Orchestrator {
    backends: Vec<BackendHandle>,
    queue_options: QueueOptions,
    transport: Arc<dyn Transport>,
}

impl Orchestrator {
    pub fn new(backends: Vec<BackendHandle>) -> Self {
        Orchestrator {
            backends,
            queue_options: QueueOptions::default(),
            transport: Arc::new(ReqwestTransport::default()),
        }
    }

    pub fn with_queue_options(mut self, options: QueueOptions) -> Self {
        self.queue_options = options;
        self
    }

    /// Swap the transport backing the write queue — tests install
    /// `ws_testing::MockTransport` here.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    fn selected(&self, select: &[String], predicate: impl Fn(&BackendConfig) -> bool) -> Vec<&BackendHandle> {
        self.backends
            .iter()
            .filter(|h| predicate(&h.config))
            .filter(|h| select.is_empty() || select.contains(&h.config.name))
            .collect()
    }

    /// Spec §4.3: fan out per backend, bounded by backend count (each
    /// backend's own segment fetches are themselves serialized, so total
    /// in-flight HTTP work stays bounded by `segment_size`/`workers`).
    pub async fn import(&self, store: &mut Store, opts: ImportOptions, cancel: CancellationToken) -> Result<RunReport, Error> {
        let handles = self.selected(&opts.select_backends, |c| c.import_enabled);

        let mut futures = Vec::with_capacity(handles.len());
        for handle in &handles {
            let name = handle.config.name.clone();
            let config = handle.config.clone();
            let adapter = handle.adapter.clone();
            let opts = opts.clone();
            let cancel = cancel.clone();
            let transport = self.transport.clone();
            let queue_options = self.queue_options.clone();
            futures.push(async move {
                let queue = Queue::new(transport, queue_options, cancel.clone());
                let (tally, errors, states) = import_backend(&config, adapter.as_ref(), &opts, &cancel, &queue).await;
                (name, tally, errors, states)
            });
        }
        let results = futures::future::join_all(futures).await;

        let mut mapper = Mapper::new();
        mapper.seed(store.iter_since(0)?);

        let mut report = RunReport::default();
        for (name, tally, errors, states) in results {
            *report.tally_mut(&name) = tally;
            for (backend, message) in errors {
                report.record_error(&backend, message);
            }
            for state in states {
                mapper.add(state);
            }
        }
        mapper.commit(store)?;
        Ok(report)
    }

    /// Spec §4.4: per backend, per eligible `State`, compute the decision
    /// table action and enqueue it. One queue per run, drained once at the
    /// end (spec §4.7: "library not daemon").
    pub async fn export(&self, store: &Store, opts: ExportOptions, cancel: CancellationToken) -> Result<RunReport, Error> {
        let handles = self.selected(&opts.select_backends, |c| c.export_enabled);

        let states = match opts.since {
            Some(since) => store.iter_since(since)?,
            None => store.iter_since(0)?,
        };

        let mut queue = Queue::new(self.transport.clone(), self.queue_options.clone(), cancel.clone());
        let mut report = RunReport::default();

        for handle in &handles {
            if cancel.is_cancelled() {
                break;
            }
            let ctx = context_for(&handle.config);
            let tally = report.tally_mut(&handle.config.name);

            let mut to_push = Vec::new();
            let mut to_progress = Vec::new();

            for state in &states {
                if state.tainted {
                    continue;
                }
                let action = resolve_export_action(handle.adapter.as_ref(), &ctx, state, &handle.config.name).await;
                match action {
                    ExportAction::NoOp => {}
                    ExportAction::Push => to_push.push(state.clone()),
                }
                if opts.progress_mode && state.progress.is_some() {
                    to_progress.push(state.clone());
                }
            }

            tally.queued = (to_push.len() + to_progress.len()) as u32;

            if !to_push.is_empty() {
                if let Err(e) = handle.adapter.push(&ctx, &to_push, &mut queue).await {
                    report.record_error(&handle.config.name, e.message);
                }
            }
            if opts.progress_mode && !to_progress.is_empty() {
                if let Err(e) = handle.adapter.progress(&ctx, &to_progress, &mut queue).await {
                    report.record_error(&handle.config.name, e.message);
                }
            }
        }

        let outcomes = queue.drain().await;
        for outcome in outcomes {
            apply_queue_outcome(&mut report, &outcome);
        }
        Ok(report)
    }

    /// Spec §6.1: a flat, backend-agnostic snapshot of the canonical store,
    /// paginated to bound memory regardless of library size.
    pub fn backup(
        &self,
        store: &Store,
        opts: BackupOptions,
        cancel: &CancellationToken,
        writer: &mut dyn Write,
    ) -> Result<BackupReport, Error> {
        let page_size = opts.page_size_or_default();
        let mut offset = 0u32;
        let mut written = 0u64;
        loop {
            if cancel.is_cancelled() {
                break;
            }
            let (page, total) = store.page(
                &PageFilter::default(),
                (SortField::Id, SortOrder::Asc),
                page_size,
                offset,
            )?;
            if page.is_empty() {
                break;
            }
            for state in &page {
                let line = serde_json::to_string(state).map_err(|e| Error::Fatal(e.to_string()))?;
                writeln!(writer, "{line}").map_err(|e| Error::Fatal(e.to_string()))?;
                written += 1;
            }
            offset += page_size;
            if offset as u64 >= total {
                break;
            }
        }
        Ok(BackupReport { states_written: written })
    }

    /// Drives `Orchestrator::export` with progress mode forced on and no
    /// `since` cutoff — the scheduled companion to the webhook
    /// `progress` cache bucket drain (spec §4.8).
    pub async fn progress(&self, store: &Store, cancel: CancellationToken) -> Result<RunReport, Error> {
        self.export(
            store,
            ExportOptions { select_backends: Vec::new(), since: None, progress_mode: true },
            cancel,
        )
        .await
    }
}

fn context_for(config: &BackendConfig) -> Context {
    Context::new(config.name.clone(), config.base_url.clone(), config.token.clone()).with_context(|c| {
        c.user_id = config.user_id.clone();
        c.backend_uuid = config.backend_uuid.clone();
    })
}

enum ExportAction {
    NoOp,
    Push,
}

/// Spec §4.4 steps 1-3: resolve remote identity (via `searchById` against
/// one of the canonical guids) when `backend` has no entry in
/// `state.metadata` yet, then apply the decision table.
async fn resolve_export_action(adapter: &dyn BackendAdapter, ctx: &Context, state: &State, backend: &str) -> ExportAction {
    if let Some(remote) = state.metadata.get(backend) {
        return decide_export_action(state, Some(remote.watched), remote.played_at.map(|t| t.timestamp()));
    }

    let Some(guid) = state.guids.values().next() else {
        return ExportAction::NoOp;
    };
    match adapter.search_by_id(ctx, guid).await {
        Ok(items) if !items.is_empty() => decide_export_action(state, None, None),
        _ => ExportAction::NoOp,
    }
}

/// Spec §4.4 step 3's decision table (canonical "latest wins"). `remote`
/// being `None` means identity was just resolved and no play state has
/// been recorded on that backend yet — treated as a fresh target.
fn decide_export_action(state: &State, remote_watched: Option<bool>, remote_played_at: Option<i64>) -> ExportAction {
    let remote_newer = remote_played_at.unwrap_or(0) > state.updated;
    if remote_newer {
        return ExportAction::NoOp;
    }
    if state.watched != remote_watched.unwrap_or(false) {
        return ExportAction::Push;
    }
    ExportAction::NoOp
}

fn apply_queue_outcome(report: &mut RunReport, outcome: &QueueOutcome) {
    match outcome {
        QueueOutcome::Success { tag, .. } => {
            report.tally_mut(backend_from_tag(tag)).succeeded += 1;
        }
        QueueOutcome::Failed { tag, error } => {
            let backend = backend_from_tag(tag).to_owned();
            report.record_error(&backend, error.message.clone());
            report.tally_mut(&backend).failed += 1;
        }
        QueueOutcome::Cancelled { tag } => {
            warn!(tag, "queue request cancelled");
        }
    }
}

/// Request tags are `"{backend}.{verb}"` (e.g. `"plex.push"`); the backend
/// name is everything before the first dot.
fn backend_from_tag(tag: &str) -> &str {
    tag.split('.').next().unwrap_or(tag)
}

/// One backend's slice of spec §4.3's 8-step import algorithm, run
/// independently of the others so a slow or failing backend can't stall
/// the rest.
async fn import_backend(
    config: &BackendConfig,
    adapter: &dyn BackendAdapter,
    opts: &ImportOptions,
    cancel: &CancellationToken,
    queue: &Queue,
) -> (crate::run_report::BackendTally, Vec<(String, String)>, Vec<State>) {
    let ctx = context_for(config);
    let mut tally = crate::run_report::BackendTally::default();
    let mut errors = Vec::new();
    let mut states = Vec::new();

    let libraries = match adapter.list_libraries(&ctx).await {
        Ok(libs) => libs,
        Err(e) => {
            tally.has_errors = true;
            errors.push((config.name.clone(), e.message));
            return (tally, errors, states);
        }
    };

    let admitted: Vec<&Library> = libraries
        .iter()
        .filter(|lib| !config.ignored_libraries.contains(&lib.id))
        .filter(|lib| matches!(lib.kind, LibraryKind::Movies | LibraryKind::TvShows))
        .filter(|lib| opts.library_id.as_deref().map_or(true, |id| id == lib.id))
        .collect();
    tally.libraries = admitted.len() as u32;

    let segment_size = if config.segment_size == 0 { DEFAULT_SEGMENT_SIZE } else { config.segment_size };
    let mut parent_guid_cache: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();

    let page_states: RefCell<Vec<State>> = RefCell::new(Vec::new());
    let page_errors: RefCell<Vec<PageError>> = RefCell::new(Vec::new());
    let on_page = |decoded: Vec<State>| page_states.borrow_mut().extend(decoded);
    let on_error = |err: PageError| page_errors.borrow_mut().push(err);
    let handler = PageHandler {
        on_page: &on_page,
        on_error: &on_error,
        log_ctx: LogCtx { backend: config.name.clone(), library_id: String::new() },
    };

    for library in admitted {
        if cancel.is_cancelled() {
            break;
        }

        let count_req = PageRequest { library_id: library.id.clone(), offset: 0, limit: 0 };
        let total = match adapter.get_library_page(&ctx, &count_req, queue).await {
            Ok(page) => page.total.unwrap_or(0),
            Err(e) => {
                (handler.on_error)(PageError {
                    backend: config.name.clone(),
                    library_id: library.id.clone(),
                    message: format!("count request failed: {}", e.message),
                });
                continue;
            }
        };

        let mut offset = 0u32;
        while offset < total {
            if cancel.is_cancelled() {
                break;
            }
            let req = PageRequest { library_id: library.id.clone(), offset, limit: segment_size };
            offset += segment_size;

            let page = match adapter.get_library_page(&ctx, &req, queue).await {
                Ok(p) => p,
                Err(e) => {
                    (handler.on_error)(PageError {
                        backend: config.name.clone(),
                        library_id: library.id.clone(),
                        message: format!("page at offset {}: {}", req.offset, e.message),
                    });
                    continue;
                }
            };

            let items = match streaming::items_in(&page.body, streaming::items_path(config.kind)) {
                Ok(items) => items,
                Err(e) => {
                    (handler.on_error)(PageError {
                        backend: config.name.clone(),
                        library_id: library.id.clone(),
                        message: e.message,
                    });
                    continue;
                }
            };

            let mut decoded_page = Vec::new();
            let mut page_items = 0u32;
            let mut page_dropped = 0u32;

            for item in items {
                let decoded = panic_guard::guard(|| adapter.to_states(&ctx, &item));
                let item_states = match decoded {
                    Ok(Ok(states)) => states,
                    Ok(Err(e)) => {
                        page_dropped += 1;
                        warn!(backend = %config.name, error = %e.message, "dropping malformed library item");
                        continue;
                    }
                    Err(e) => {
                        page_dropped += 1;
                        warn!(backend = %config.name, error = %e, "panic decoding library item");
                        continue;
                    }
                };

                for mut state in item_states {
                    page_items += 1;

                    if let Some(after) = opts.after {
                        if state.updated <= after {
                            page_dropped += 1;
                            continue;
                        }
                    }

                    if state.parent_guids.is_empty() {
                        fill_parent_guids(adapter, &ctx, &mut state, &mut parent_guid_cache).await;
                    }

                    decoded_page.push(state);
                }
            }

            tally.items += page_items;
            tally.dropped += page_dropped;

            // spec §9 Open Question, resolved: `metadata_only` still walks
            // every page (so `fill_parent_guids` above keeps refreshing the
            // parent-GUID cache and item counts stay accurate against
            // `TotalRecordCount`) but the decoded states themselves never
            // reach the mapper/store — only a full import writes play state.
            if !opts.metadata_only {
                (handler.on_page)(decoded_page);
            }
        }
    }

    tally.has_errors = !page_errors.borrow().is_empty();
    for err in page_errors.into_inner() {
        errors.push((err.backend, format!("{}: {}", err.library_id, err.message)));
    }
    states.extend(page_states.into_inner());

    (tally, errors, states)
}

/// Spec §4.3 step 4's parent-GUID cache: episodes carry their series'
/// remote id in `metadata[backend].extra.parent_remote_id`; resolve it to
/// the series' own guids once per series and attach to every episode that
/// doesn't carry its own parent identity.
async fn fill_parent_guids(
    adapter: &dyn BackendAdapter,
    ctx: &Context,
    state: &mut State,
    cache: &mut BTreeMap<String, BTreeMap<String, String>>,
) {
    let Some(parent_id) = state
        .metadata
        .get(&state.via)
        .and_then(|m| m.extra.get("parent_remote_id"))
        .and_then(|v| v.as_str())
        .map(str::to_owned)
    else {
        return;
    };

    if let Some(cached) = cache.get(&parent_id) {
        state.parent_guids = cached.clone();
        return;
    }

    let Ok(raw) = adapter.get_metadata(ctx, &parent_id).await else {
        return;
    };
    let Ok(series_states) = adapter.to_states(ctx, &raw) else {
        return;
    };
    let Some(series_state) = series_states.into_iter().next() else {
        return;
    };

    cache.insert(parent_id, series_state.guids.clone());
    state.parent_guids = series_state.guids;
}

#[cfg(test)]
mod tests {
    use super::*;
    use ws_types::{MediaKind, Metadata};

    fn sample_state(via: &str, watched: bool, updated: i64) -> State {
        State::new(
            MediaKind::Movie,
            via,
            Some("Title".to_owned()),
            Some(2020),
            None,
            None,
            BTreeMap::from([("imdb".to_owned(), "tt123".to_owned())]),
            Metadata {
                library_id: "1".to_owned(),
                remote_id: "1".to_owned(),
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
    fn decision_table_pushes_on_watched_mismatch() {
        let state = sample_state("plex", true, 100);
        assert!(matches!(decide_export_action(&state, Some(false), Some(50)), ExportAction::Push));
    }

    #[test]
    fn decision_table_noop_when_remote_newer() {
        let state = sample_state("plex", true, 100);
        assert!(matches!(decide_export_action(&state, Some(false), Some(200)), ExportAction::NoOp));
    }

    #[test]
    fn decision_table_noop_on_matching_watched_flag() {
        let state = sample_state("plex", true, 100);
        assert!(matches!(decide_export_action(&state, Some(true), Some(50)), ExportAction::NoOp));
    }

    #[test]
    fn decision_table_pushes_fresh_target_when_canonical_watched() {
        let state = sample_state("plex", true, 100);
        assert!(matches!(decide_export_action(&state, None, None), ExportAction::Push));
    }

    #[test]
    fn backend_from_tag_splits_on_dot() {
        assert_eq!(backend_from_tag("plex.push"), "plex");
        assert_eq!(backend_from_tag("noverb"), "noverb");
    }
}
