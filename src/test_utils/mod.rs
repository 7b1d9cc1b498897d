//! Test-only helpers shared across unit and integration tests.
//!
//! Compiled for the crate's own tests and, through the `test-util` feature,
//! for the integration tests under `tests/`.

mod mock_transport;

pub use mock_transport::MockTransport;
