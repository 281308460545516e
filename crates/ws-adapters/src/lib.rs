//! `BackendAdapter` trait and the Plex, Jellyfin, and Emby implementations.

pub mod adapter;
pub mod adapters;
pub mod context;
pub mod guid_extract;
pub mod json_path;

pub use adapter::BackendAdapter;
pub use adapters::{EmbyAdapter, JellyfinAdapter, PlexAdapter};
pub use context::Context;
