//! Error types produced while shipping batches.

use std::{io, sync::Arc};

use thiserror::Error;

/// Failure of a single entry within one send attempt.
///
/// Connection-level failures are cloned onto every entry that was in flight
/// when they happened, hence the shared `io::Error`.
#[derive(Clone, Debug, Error)]
pub enum TransportError {
    /// The TCP connection could not be established.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: Arc<io::Error>,
    },
    /// The TLS handshake was cancelled because the server could not be trusted.
    #[error("tls handshake with {host} failed: {message}")]
    Tls { host: String, message: String },
    /// Writing the serialised entry to the socket failed.
    #[error("write failed: {0}")]
    Write(#[source] Arc<io::Error>),
    /// The entry could not be serialised.
    #[error("failed to serialise entry: {0}")]
    Serialise(String),
}

impl TransportError {
    pub(crate) fn write(err: io::Error) -> Self {
        Self::Write(Arc::new(err))
    }
}

/// Error reported by a flush cycle in which at least one entry failed.
///
/// Only the failure of the earliest failed entry is carried; the failed
/// entries themselves are back in the buffer awaiting the next flush.
#[derive(Clone, Debug, Error)]
#[error("{failed} of {attempted} log entries failed to ship: {source}")]
pub struct FlushError {
    pub failed: usize,
    pub attempted: usize,
    #[source]
    pub source: TransportError,
}

/// Errors surfaced by the handler's control operations.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The handler has been closed or its worker has exited.
    #[error("handler is closed")]
    Closed,
    /// The command queue stayed full for the whole send timeout.
    #[error("handler queue is full")]
    QueueFull,
    /// The flush did not complete within the requested time.
    #[error("timed out waiting for flush to complete")]
    Timeout,
    /// The flush ran and reported a failure.
    #[error(transparent)]
    Flush(#[from] FlushError),
}
