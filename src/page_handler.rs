//! `PageHandler` — replaces the "closures returning closures" pattern
//! spec §9 flags for import's page-completion handling with a plain value
//! passed by reference into `run_library_import`.

use ws_types::State;

#[derive(Debug, Clone)]
pub struct PageError {
    pub backend: String,
    pub library_id: String,
    pub message: String,
}

/// Context carried alongside a page handler purely for log/report
/// attribution — not behavior.
#[derive(Debug, Clone)]
pub struct LogCtx {
    pub backend: String,
    pub library_id: String,
}

pub struct PageHandler<'a> {
    pub on_page: &'a dyn Fn(Vec<State>),
    pub on_error: &'a dyn Fn(PageError),
    pub log_ctx: LogCtx,
}
