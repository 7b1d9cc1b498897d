//! Send/Sync guarantees for core types.

use femtoship::{
    BatchWriter, FemtoShipHandler, FlushError, HandlerError, LogBuffer, ShipHandlerBuilder,
    ShipLogAdapter, TcpTransport, TransportError,
};
use rstest::rstest;
use static_assertions::assert_impl_all;

#[rstest]
fn builders_are_send_sync() {
    assert_impl_all!(ShipHandlerBuilder: Send, Sync);
}

#[rstest]
fn components_are_send_sync() {
    assert_impl_all!(FemtoShipHandler: Send, Sync);
    assert_impl_all!(LogBuffer: Send, Sync);
    assert_impl_all!(BatchWriter: Send, Sync);
    assert_impl_all!(TcpTransport: Send, Sync);
    assert_impl_all!(ShipLogAdapter: Send, Sync);
}

#[rstest]
fn errors_cross_threads() {
    assert_impl_all!(TransportError: Send, Sync, Clone);
    assert_impl_all!(FlushError: Send, Sync, Clone);
    assert_impl_all!(HandlerError: Send, Sync);
}
