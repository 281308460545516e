//! The transport seam between the queue and the network — swapped for a
//! mock in tests (`ws-testing`), real `reqwest` in production.

use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 5xx and 429 are retried by the queue; everything else that failed is terminal.
    pub fn is_transient_failure(&self) -> bool {
        self.status == 429 || (500..600).contains(&self.status)
    }
}

#[derive(Debug, Clone)]
pub struct TransportError {
    pub transient: bool,
    pub message: String,
}

impl TransportError {
    pub fn network(message: impl Into<String>) -> Self {
        TransportError {
            transient: true,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for TransportError {}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: &super::Request) -> Result<TransportResponse, TransportError>;
}

/// Production transport backed by a shared `reqwest::Client` connection
/// pool (spec §5: "HTTP client connection pool: shared, per-host
/// concurrency cap" — `reqwest` already manages that pool internally).
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        ReqwestTransport { client }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        ReqwestTransport::new(reqwest::Client::new())
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: &super::Request) -> Result<TransportResponse, TransportError> {
        let method = request.method.clone();
        let mut builder = self.client.request(method, &request.url);
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::network(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::network(e.to_string()))?
            .to_vec();
        Ok(TransportResponse { status, body })
    }
}

