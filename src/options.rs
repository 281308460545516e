//! Plain option structs the (out-of-scope) config loader hands the
//! orchestrator — spec §1.1's "configuration shape" ambient concern.

/// Inputs to `Orchestrator::import` — spec §4.3.
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Only import backends named here; empty means "all enabled backends".
    pub select_backends: Vec<String>,
    /// Drop items whose authoritative timestamp is `<= after`.
    pub after: Option<i64>,
    /// Restrict to a single library id, across every selected backend.
    pub library_id: Option<String>,
    /// Still page through every library (refreshing the parent-GUID
    /// cache), but withhold decoded states from the mapper/store.
    pub metadata_only: bool,
}

/// Inputs to `Orchestrator::export` — spec §4.4.
#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    pub select_backends: Vec<String>,
    /// `None` re-exports every state regardless of `updated`.
    pub since: Option<i64>,
    pub progress_mode: bool,
}

/// Inputs to `Orchestrator::backup` — spec §6.1.
#[derive(Debug, Clone, Default)]
pub struct BackupOptions {
    pub page_size: u32,
}

impl BackupOptions {
    pub fn page_size_or_default(&self) -> u32 {
        if self.page_size == 0 { 1000 } else { self.page_size }
    }
}
