//! Embedded SQLite store for `State` persistence and webhook cache buckets.

pub mod cache_bucket;
pub mod error;
pub mod store;

pub use cache_bucket::CacheBucket;
pub use error::StoreError;
pub use store::{PageFilter, SortField, SortOrder, Store};
