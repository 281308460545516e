//! Adapter execution context — spec §4.2.1.
//!
//! `Context` is immutable by convention; `with_context` returns a modified
//! clone rather than mutating in place, so adapters hold a `Context` by
//! value and never form a cyclic adapter<->context reference (spec §9).

use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct Context {
    pub backend: String,
    pub base_url: String,
    pub token: String,
    pub user_id: String,
    pub backend_uuid: String,
    pub options: BTreeMap<String, String>,
}

impl Context {
    pub fn new(backend: impl Into<String>, base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Context {
            backend: backend.into(),
            base_url: base_url.into(),
            token: token.into(),
            user_id: String::new(),
            backend_uuid: String::new(),
            options: BTreeMap::new(),
        }
    }

    /// Return a modified clone. Never mutates `self`.
    pub fn with_context(&self, f: impl FnOnce(&mut Context)) -> Context {
        let mut clone = self.clone();
        f(&mut clone);
        clone
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }
}
