//! Cross-backend media play-state sync engine (Plex / Jellyfin / Emby).
//!
//! This crate is the orchestration layer: it wires adapters
//! ([`ws_adapters`]), the canonical store ([`ws_store`]), the dedup mapper
//! ([`ws_mapper`]), and the write queue ([`ws_queue`]) into the import,
//! export, progress, backup, and webhook operations spec'd in the design
//! doc. CLI/HTTP surfaces are out of scope; this is the library they'd
//! call into.

pub mod error;
pub mod ingest;
pub mod options;
pub mod orchestrator;
pub mod page_handler;
pub mod panic_guard;
pub mod run_report;
pub mod streaming;

pub use error::Error;
pub use options::{BackupOptions, ExportOptions, ImportOptions};
pub use orchestrator::{BackendHandle, Orchestrator};
pub use run_report::{BackendTally, BackupReport, ReportError, RunReport, WebhookOutcome};
