//! The adapter-boundary error envelope — spec §7.
//!
//! Every adapter operation returns `Response<T>` instead of throwing;
//! the orchestrator inspects `Ok`/`Err` and either consumes the value or
//! folds the error into the per-run `RunReport`. Nothing panics across a
//! component boundary — see `watchstate::panic_guard`.

use std::collections::BTreeMap;
use std::fmt;

/// Severity of an `AdapterError`, used by the orchestrator to decide
/// whether a failure aborts the whole backend (`Auth`, `Fatal`) or is
/// merely recorded and skipped (`Info`/`Notice`/`Warning`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorLevel {
    Info,
    Notice,
    Warning,
    Error,
    Fatal,
}

#[derive(Debug, Clone)]
pub struct HttpErrorDetail {
    pub http_code: u16,
    pub message: String,
}

/// `Response{ok, value, error{level, message, context, previous}, extra{http_code, message}}`
/// from spec §7, minus the redundant `ok`/`value` (modeled by `Result` itself).
#[derive(Debug, Clone)]
pub struct AdapterError {
    pub level: ErrorLevel,
    pub message: String,
    pub context: BTreeMap<String, String>,
    pub previous: Option<Box<AdapterError>>,
    pub http: Option<HttpErrorDetail>,
}

impl AdapterError {
    pub fn new(level: ErrorLevel, message: impl Into<String>) -> Self {
        AdapterError {
            level,
            message: message.into(),
            context: BTreeMap::new(),
            previous: None,
            http: None,
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_http(mut self, http_code: u16, message: impl Into<String>) -> Self {
        self.http = Some(HttpErrorDetail {
            http_code,
            message: message.into(),
        });
        self
    }

    pub fn caused_by(mut self, previous: AdapterError) -> Self {
        self.previous = Some(Box::new(previous));
        self
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorLevel::Warning, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorLevel::Notice, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorLevel::Error, message).with_http(401, "authentication failed")
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ErrorLevel::Fatal, message)
    }
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.level, self.message)
    }
}

impl std::error::Error for AdapterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.previous.as_deref().map(|e| e as &dyn std::error::Error)
    }
}

/// Every adapter capability returns this shape.
pub type Response<T> = Result<T, AdapterError>;
