//! Helpers for tests in this crate and in downstream crates (enable the `test_utils` feature).
mod fake_gateway;
#[cfg(feature = "sqlite")]
pub mod prepare_env;

pub use fake_gateway::FakeGateway;
