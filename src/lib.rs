//! Batching, retrying log shipper for line-delimited JSON collectors.
//!
//! Records logged through [`FemtoShipHandler`] (directly, or via the `log`
//! bridge in [`log_compat`]) are parsed into flat field sets, buffered in
//! memory and shipped in batches over a persistent TCP or TLS stream when a
//! flush is requested. Entries whose write fails are kept for the next flush.

pub mod fields;
pub mod handler;
pub mod handlers;
pub mod level;
pub mod log_compat;
pub mod log_record;
pub mod rate_limited_warner;
pub mod ship_handler;

#[cfg(any(test, feature = "test-util"))]
pub mod test_utils;

pub use handler::FemtoHandlerTrait;
pub use handlers::{HandlerBuildError, HandlerBuilderTrait, ShipHandlerBuilder};
pub use level::ShipLevel;
pub use log_compat::{ShipLogAdapter, install_global_logger};
pub use log_record::{RecordMetadata, ShipLogRecord};
pub use ship_handler::{
    BatchWriter, Entry, FemtoShipHandler, FlushError, FlushHandle, HandlerError, LogBuffer,
    LogTransport, OverflowPolicy, ShipHandlerConfig, Tag, TcpEndpoint, TcpTransport,
    TransportError,
};
