//! In-memory dedup/merge index (`Mapper`) and the webhook-path `DirectMapper`.

pub mod mapper;

pub use mapper::{DirectMapper, Mapper, MapperMetrics};
