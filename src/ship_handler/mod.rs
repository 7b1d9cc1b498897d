//! Batching log shipper.
//!
//! This module defines `FemtoShipHandler`, a handler that buffers structured
//! log entries in memory and ships them in batches to a remote collector as
//! newline-delimited JSON over a persistent, optionally TLS-secured, TCP
//! stream. A flush cycle drains the whole buffer, writes each entry in tag
//! order and puts back only the entries whose write failed, so transient
//! network failures never lose records. Retries are unlimited; cancellation
//! is the only way buffered entries are discarded.

mod buffer;
mod config;
mod error;
mod handler;
mod serialise;
mod transport;
mod worker;
mod writer;

#[cfg(test)]
mod tests;

pub use buffer::{Batch, Entry, FailureMap, LogBuffer, Tag};
pub use config::{
    DEFAULT_CHANNEL_CAPACITY, DEFAULT_CONNECT_TIMEOUT, DEFAULT_WRITE_TIMEOUT, OverflowPolicy,
    ShipHandlerConfig, TOKEN_FIELD,
};
pub use error::{FlushError, HandlerError, TransportError};
pub use handler::FemtoShipHandler;
pub use serialise::serialise_entry;
pub use transport::{LogTransport, Serialiser, TcpEndpoint, TcpTransport, TlsOptions};
pub use worker::FlushHandle;
pub use writer::BatchWriter;
