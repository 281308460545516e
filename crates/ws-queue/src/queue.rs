//! The bounded concurrent request scheduler — spec §4.7/§5.
//!
//! "The queue is a library, not a daemon": the orchestrator constructs
//! one, submits work, awaits drain, and discards it. Concurrency is capped
//! by a semaphore rather than a literal fixed worker-thread pool consuming
//! a channel — the two are behaviorally equivalent (bounded in-flight
//! request count over unbounded submission) and the semaphore form is the
//! idiomatic `tokio` shape for this.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::transport::{Transport, TransportError, TransportResponse};

#[derive(Debug, Clone)]
pub struct Request {
    pub method: reqwest::Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    /// Per-backend label, used for log context and `RunReport` bucketing.
    pub tag: String,
    /// Overrides `QueueOptions::request_timeout` for this one request.
    pub timeout: Option<Duration>,
}

impl Request {
    pub fn new(method: reqwest::Method, url: impl Into<String>, tag: impl Into<String>) -> Self {
        Request {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            tag: tag.into(),
            timeout: None,
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }
}

/// Outcome of one submitted request, after retries are exhausted.
#[derive(Debug, Clone)]
pub enum QueueOutcome {
    Success { tag: String, response: TransportResponse },
    Failed { tag: String, error: TransportError },
    Cancelled { tag: String },
}

impl QueueOutcome {
    pub fn tag(&self) -> &str {
        match self {
            QueueOutcome::Success { tag, .. } => tag,
            QueueOutcome::Failed { tag, .. } => tag,
            QueueOutcome::Cancelled { tag, .. } => tag,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, QueueOutcome::Success { .. })
    }
}

#[derive(Debug, Clone)]
pub struct QueueOptions {
    /// Max concurrent in-flight requests. Overridable per backend.
    pub workers: usize,
    pub request_timeout: Duration,
    pub max_attempts: u32,
    /// Grace period in-flight requests get once cancellation fires.
    pub cancel_grace: Duration,
}

impl Default for QueueOptions {
    fn default() -> Self {
        QueueOptions {
            workers: 10,
            request_timeout: Duration::from_secs(300),
            max_attempts: 3,
            cancel_grace: Duration::from_secs(5),
        }
    }
}

pub struct Queue {
    transport: Arc<dyn Transport>,
    semaphore: Arc<Semaphore>,
    options: QueueOptions,
    cancel: CancellationToken,
    tasks: JoinSet<QueueOutcome>,
}

impl Queue {
    pub fn new(transport: Arc<dyn Transport>, options: QueueOptions, cancel: CancellationToken) -> Self {
        Queue {
            semaphore: Arc::new(Semaphore::new(options.workers)),
            transport,
            options,
            cancel,
            tasks: JoinSet::new(),
        }
    }

    /// Submit a request. Returns immediately; the request runs once a
    /// worker permit is free. Call `drain` to wait for completion.
    pub fn submit(&mut self, request: Request) {
        let transport = self.transport.clone();
        let semaphore = self.semaphore.clone();
        let options = self.options.clone();
        let cancel = self.cancel.clone();

        self.tasks.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(p) => p,
                Err(_) => {
                    return QueueOutcome::Cancelled { tag: request.tag.clone() };
                }
            };

            if cancel.is_cancelled() {
                return QueueOutcome::Cancelled { tag: request.tag.clone() };
            }

            run_with_retry(&*transport, &request, &options, &cancel).await
        });
    }

    /// Run one request inline under this queue's concurrency cap and
    /// retry/backoff policy, returning its outcome directly instead of
    /// going through `submit`/`drain`. Used by reads that need the
    /// response body in hand before deciding what to fetch next (e.g. a
    /// page count before the segment loop it bounds), where fire-and-forget
    /// submission doesn't fit.
    pub async fn execute(&self, request: Request) -> QueueOutcome {
        let permit = match self.semaphore.clone().acquire_owned().await {
            Ok(p) => p,
            Err(_) => return QueueOutcome::Cancelled { tag: request.tag.clone() },
        };
        if self.cancel.is_cancelled() {
            return QueueOutcome::Cancelled { tag: request.tag.clone() };
        }
        let outcome = run_with_retry(&*self.transport, &request, &self.options, &self.cancel).await;
        drop(permit);
        outcome
    }

    /// Await completion of every submitted request. Consumes the queue —
    /// per spec §4.7, a queue is constructed, used once, and discarded.
    pub async fn drain(mut self) -> Vec<QueueOutcome> {
        let mut out = Vec::new();
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(outcome) => out.push(outcome),
                Err(e) => warn!(error = %e, "queue worker task panicked"),
            }
        }
        out
    }
}

async fn run_with_retry(
    transport: &dyn Transport,
    request: &Request,
    options: &QueueOptions,
    cancel: &CancellationToken,
) -> QueueOutcome {
    let deadline = if cancel.is_cancelled() {
        options.cancel_grace
    } else {
        request.timeout.unwrap_or(options.request_timeout)
    };

    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let call = tokio::time::timeout(deadline, transport.execute(request));
        let outcome = tokio::select! {
            result = call => result,
            _ = cancel.cancelled() => {
                return QueueOutcome::Cancelled { tag: request.tag.clone() };
            }
        };

        let retry_or_result = match outcome {
            Ok(Ok(response)) if response.is_success() => {
                return QueueOutcome::Success { tag: request.tag.clone(), response };
            }
            Ok(Ok(response)) if response.is_transient_failure() => {
                Err(TransportError { transient: true, message: format!("http {}", response.status) })
            }
            Ok(Ok(response)) => {
                return QueueOutcome::Success { tag: request.tag.clone(), response };
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(TransportError::network("request deadline exceeded")),
        };

        match retry_or_result {
            Err(err) if err.transient && attempt < options.max_attempts => {
                let backoff = backoff_with_jitter(attempt);
                debug!(tag = %request.tag, attempt, backoff_ms = backoff.as_millis() as u64, "retrying transient failure");
                tokio::time::sleep(backoff).await;
                continue;
            }
            Err(err) => {
                return QueueOutcome::Failed { tag: request.tag.clone(), error: err };
            }
        }
    }
}

/// Exponential backoff (base 200ms) with full jitter, capped at 3 attempts
/// per spec §4.7.
fn backoff_with_jitter(attempt: u32) -> Duration {
    let base_ms = 200u64 * 2u64.saturating_pow(attempt.saturating_sub(1));
    let capped = base_ms.min(5_000);
    let jitter = rand::thread_rng().gen_range(0..=capped / 2);
    Duration::from_millis(capped / 2 + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyTransport {
        fail_first_n: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Transport for FlakyTransport {
        async fn execute(&self, _request: &Request) -> Result<TransportResponse, TransportError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first_n {
                Ok(TransportResponse { status: 503, body: Vec::new() })
            } else {
                Ok(TransportResponse { status: 200, body: b"ok".to_vec() })
            }
        }
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let transport = Arc::new(FlakyTransport { fail_first_n: 2, calls: AtomicUsize::new(0) });
        let mut queue = Queue::new(transport, QueueOptions::default(), CancellationToken::new());
        queue.submit(Request::new(reqwest::Method::GET, "http://example.invalid", "home_plex"));
        let outcomes = queue.drain().await;
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].is_success());
    }

    #[tokio::test]
    async fn execute_retries_transient_without_draining_the_queue() {
        let transport = Arc::new(FlakyTransport { fail_first_n: 2, calls: AtomicUsize::new(0) });
        let queue = Queue::new(transport, QueueOptions::default(), CancellationToken::new());
        let outcome = queue.execute(Request::new(reqwest::Method::GET, "http://example.invalid", "jellyfin.page")).await;
        assert!(outcome.is_success());
    }

    struct AlwaysFailTransport;

    #[async_trait]
    impl Transport for AlwaysFailTransport {
        async fn execute(&self, _request: &Request) -> Result<TransportResponse, TransportError> {
            Ok(TransportResponse { status: 500, body: Vec::new() })
        }
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let transport = Arc::new(AlwaysFailTransport);
        let mut opts = QueueOptions::default();
        opts.max_attempts = 2;
        let mut queue = Queue::new(transport, opts, CancellationToken::new());
        queue.submit(Request::new(reqwest::Method::GET, "http://example.invalid", "home_jellyfin"));
        let outcomes = queue.drain().await;
        assert_eq!(outcomes.len(), 1);
        assert!(!outcomes[0].is_success());
        assert!(matches!(outcomes[0], QueueOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn bounded_concurrency_limits_in_flight() {
        let transport = Arc::new(AlwaysFailTransport);
        let mut opts = QueueOptions::default();
        opts.workers = 2;
        opts.max_attempts = 1;
        let mut queue = Queue::new(transport, opts, CancellationToken::new());
        for i in 0..5 {
            queue.submit(Request::new(reqwest::Method::GET, "http://example.invalid", format!("tag-{i}")));
        }
        let outcomes = queue.drain().await;
        assert_eq!(outcomes.len(), 5);
    }
}
