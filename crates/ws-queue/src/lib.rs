//! Bounded concurrent HTTP request scheduler with retry/backoff and
//! cancellation — the substrate shared by import, export, and progress.

pub mod queue;
pub mod transport;

pub use queue::{Queue, QueueOptions, QueueOutcome, Request};
pub use transport::{ReqwestTransport, Transport, TransportError, TransportResponse};
