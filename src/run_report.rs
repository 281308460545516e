//! `RunReport` — the value every orchestrator operation returns instead of
//! threading a global "message" counter bus (spec §9's redesign flag).

use std::collections::BTreeMap;

/// One error recorded against a backend during a run; folds into
/// `RunReport::errors` and the CLI's printed `errors[]` (spec §7).
#[derive(Debug, Clone)]
pub struct ReportError {
    pub backend: String,
    pub message: String,
}

/// Per-backend counters accumulated over one orchestrator run — mirrors
/// spec §7's CLI summary shape `{backend, libraries, items, dropped,
/// queued, failed, errors[]}` field-for-field, plus `succeeded`/
/// `auth_failed`/`has_errors` bookkeeping the orchestrator needs to decide
/// the process exit code (spec §6: 0/1/2/3).
#[derive(Debug, Clone, Default)]
pub struct BackendTally {
    pub libraries: u32,
    pub items: u32,
    pub dropped: u32,
    pub queued: u32,
    pub succeeded: u32,
    pub failed: u32,
    pub has_errors: bool,
    pub auth_failed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub backends: BTreeMap<String, BackendTally>,
    pub errors: Vec<ReportError>,
}

impl RunReport {
    pub fn tally_mut(&mut self, backend: &str) -> &mut BackendTally {
        self.backends.entry(backend.to_owned()).or_default()
    }

    pub fn record_error(&mut self, backend: &str, message: impl Into<String>) {
        let message = message.into();
        self.tally_mut(backend).has_errors = true;
        self.errors.push(ReportError { backend: backend.to_owned(), message });
    }

    /// True if any backend in this run recorded an error — the orchestrator
    /// caller maps this to CLI exit code 1 (spec §6).
    pub fn has_any_errors(&self) -> bool {
        self.backends.values().any(|t| t.has_errors)
    }
}

/// Returned by `Orchestrator::backup` — a snapshot write is a count, not a
/// per-backend tally.
#[derive(Debug, Clone, Default)]
pub struct BackupReport {
    pub states_written: u64,
}

/// Outcome of one inbound webhook delivery — maps 1:1 onto the 200/304/400/
/// 404/406 HTTP responses spec §6 lists; the out-of-scope HTTP route
/// translates this into the actual status code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Accepted,
    Ignored,
    Invalid(String),
    UnknownBackend,
    ImportDisabled,
}
