//! Shared test doubles used across the workspace's `#[cfg(test)]` modules
//! and `tests/` integration suites: a mock HTTP transport, a fake backend
//! adapter, and SQLite-backed store fixtures.

pub mod backend_config;
pub mod fake_adapter;
pub mod mock_transport;
pub mod store_fixture;

pub use backend_config::test_backend_config;
pub use fake_adapter::FakeAdapter;
pub use mock_transport::{MockOutcome, MockTransport};
pub use store_fixture::StoreFixture;
