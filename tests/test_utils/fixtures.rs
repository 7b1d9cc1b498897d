//! Test fixtures that provide `(MockTransport, FemtoShipHandler)` pairs for
//! integration and property tests. The mock records every batch so handlers
//! can be exercised without a collector.

#![allow(dead_code)]

use std::sync::Arc;

use femtoship::{
    FemtoShipHandler, HandlerBuilderTrait, ShipHandlerBuilder, test_utils::MockTransport,
};
use rstest::fixture;

/// Build a handler on top of `transport` with the given builder tweaks.
pub fn handler_with(
    transport: &MockTransport,
    configure: impl FnOnce(ShipHandlerBuilder) -> ShipHandlerBuilder,
) -> FemtoShipHandler {
    configure(ShipHandlerBuilder::new().with_transport(Arc::new(transport.clone())))
        .build_inner()
        .expect("build handler")
}

/// Return a handler backed by a fresh mock transport.
#[fixture]
pub fn mock_handler() -> (MockTransport, FemtoShipHandler) {
    let transport = MockTransport::new();
    let handler = handler_with(&transport, |builder| builder.with_log_activity(true));
    (transport, handler)
}

/// Return a handler that merges `token` into every entry.
#[fixture]
pub fn token_handler(
    #[default("secret-token")] token: &str,
) -> (MockTransport, FemtoShipHandler) {
    let transport = MockTransport::new();
    let handler = handler_with(&transport, |builder| builder.with_token(token));
    (transport, handler)
}
