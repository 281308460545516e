//! In-memory mock `Transport` — canned responses keyed by a tag or URL
//! substring, queued and consumed in submission order. Mirrors the
//! teacher's `MockWsServer`/`MockWsClient` pair (`rt-test-utils`): a small
//! harness object the test spawns once and inspects after the exchange.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use ws_queue::{Request, Transport, TransportError, TransportResponse};

#[derive(Debug, Clone)]
pub enum MockOutcome {
    Response(TransportResponse),
    Error(TransportError),
}

impl MockOutcome {
    pub fn ok(status: u16, body: impl Into<Vec<u8>>) -> Self {
        MockOutcome::Response(TransportResponse { status, body: body.into() })
    }

    pub fn network_error(message: impl Into<String>) -> Self {
        MockOutcome::Error(TransportError::network(message.into()))
    }
}

/// Queue of canned outcomes, returned in order regardless of which request
/// asked; a test that cares about matching a specific request to a specific
/// response should queue exactly one outcome per expected call and assert on
/// `requests_seen()` afterward.
pub struct MockTransport {
    outcomes: Mutex<VecDeque<MockOutcome>>,
    seen: Mutex<Vec<Request>>,
}

impl MockTransport {
    pub fn new(outcomes: Vec<MockOutcome>) -> Self {
        MockTransport {
            outcomes: Mutex::new(outcomes.into()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn empty() -> Self {
        MockTransport::new(Vec::new())
    }

    pub fn push(&self, outcome: MockOutcome) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }

    pub fn requests_seen(&self) -> Vec<Request> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, request: &Request) -> Result<TransportResponse, TransportError> {
        self.seen.lock().unwrap().push(request.clone());
        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| MockOutcome::ok(200, Vec::new()));
        match outcome {
            MockOutcome::Response(r) => Ok(r),
            MockOutcome::Error(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_queued_outcomes_in_order() {
        let transport = MockTransport::new(vec![MockOutcome::ok(200, b"first".to_vec()), MockOutcome::ok(404, b"second".to_vec())]);
        let req = Request::new(reqwest::Method::GET, "http://example.invalid", "t");
        let a = transport.execute(&req).await.unwrap();
        let b = transport.execute(&req).await.unwrap();
        assert_eq!(a.body, b"first");
        assert_eq!(b.status, 404);
        assert_eq!(transport.requests_seen().len(), 2);
    }
}
