//! Top-level orchestrator error envelope — spec §7.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("transient: {0}")]
    Transient(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("auth failed for backend {backend}")]
    Auth { backend: String },
    #[error("feature unavailable: {feature} requires backend version >= {required}")]
    Version { feature: String, required: String },
    #[error("config error: {0}")]
    Config(String),
    #[error("fatal: {0}")]
    Fatal(String),
}

impl From<ws_store::StoreError> for Error {
    fn from(e: ws_store::StoreError) -> Self {
        Error::Fatal(e.to_string())
    }
}

impl From<ws_types::AdapterError> for Error {
    fn from(e: ws_types::AdapterError) -> Self {
        use ws_types::ErrorLevel;
        match e.level {
            ErrorLevel::Fatal => Error::Fatal(e.message),
            ErrorLevel::Error => Error::Auth { backend: e.message },
            ErrorLevel::Warning => Error::Transient(e.message),
            ErrorLevel::Notice | ErrorLevel::Info => Error::Validation(e.message),
        }
    }
}
