//! Canonical play-state entity, identity graph, and adapter error envelope
//! shared by every WatchState crate.

pub mod backend;
pub mod error;
pub mod guid;
pub mod identity;
pub mod logctx;
pub mod state;

pub use backend::{
    BackendConfig, BackendKind, BackendUser, Library, LibraryKind, PageRequest, RawItem, RawPage,
    RequestAttributes, WebhookRequest,
};
pub use error::{AdapterError, ErrorLevel, HttpErrorDetail, Response};
pub use guid::ExternalSource;
pub use identity::{matches, merge, pointers};
pub use state::{Extra, MediaKind, Metadata, State};
