//! Public handler type exported by the crate.

use std::{sync::Arc, thread, time::Duration};

use parking_lot::Mutex;

use crate::{
    handler::FemtoHandlerTrait,
    level::ShipLevel,
    log_record::{RecordMetadata, ShipLogRecord},
    rate_limited_warner::RateLimitedWarner,
};

use super::{
    buffer::LogBuffer,
    config::{OverflowPolicy, ShipHandlerConfig},
    error::HandlerError,
    transport::{LogTransport, TcpEndpoint, TcpTransport},
    worker::{FlushHandle, ShipCommand, WorkerContext, enqueue_record, request_flush, spawn_worker},
    writer::BatchWriter,
};

/// Handler shipping records to a collector as newline-delimited JSON.
///
/// Records are buffered until [`force_flush`](Self::force_flush) runs a flush
/// cycle. Entries that fail to send stay buffered and are retried by the next
/// flush; [`cancel_sending`](Self::cancel_sending) is the only way to give up
/// on them.
pub struct FemtoShipHandler {
    tx: Option<crossbeam_channel::Sender<ShipCommand>>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
    buffer: Arc<LogBuffer>,
    transport: Arc<dyn LogTransport>,
    warner: RateLimitedWarner,
    overflow_policy: OverflowPolicy,
    flush_timeout: Duration,
}

impl FemtoShipHandler {
    /// Construct a handler targeting `endpoint` with default configuration.
    pub fn new(endpoint: TcpEndpoint) -> Self {
        Self::with_config(ShipHandlerConfig::default().with_endpoint(endpoint))
    }

    /// Construct the handler from a configuration object.
    pub fn with_config(config: ShipHandlerConfig) -> Self {
        let transport = Arc::new(TcpTransport::from_config(&config));
        Self::with_transport(config, transport)
    }

    /// Construct the handler around an existing transport.
    pub fn with_transport(config: ShipHandlerConfig, transport: Arc<dyn LogTransport>) -> Self {
        let buffer = Arc::new(LogBuffer::new());
        let writer = BatchWriter::new(Arc::clone(&buffer), Arc::clone(&transport))
            .with_log_activity(config.log_activity);
        let context = WorkerContext {
            buffer: Arc::clone(&buffer),
            writer: Arc::new(writer),
            token: config.token.clone(),
            log_activity: config.log_activity,
        };
        let (tx, handle) = spawn_worker(config.capacity, context);
        Self {
            tx: Some(tx),
            handle: Mutex::new(Some(handle)),
            buffer,
            transport,
            warner: RateLimitedWarner::new(config.warn_interval),
            overflow_policy: config.overflow_policy,
            flush_timeout: config.shutdown_timeout(),
        }
    }

    /// Queue a log event. Never fails; messages that are not JSON objects are
    /// dropped by the worker.
    ///
    /// With the default [`OverflowPolicy::Block`] a full intake queue makes
    /// the caller wait for the worker to catch up, which never involves a
    /// network send.
    pub fn record(&self, level: ShipLevel, message: &str, metadata: RecordMetadata) {
        self.dispatch(ShipLogRecord::with_metadata(level, message, metadata));
    }

    /// Schedule a flush cycle.
    ///
    /// Ignore the returned handle for fire-and-forget behaviour, or wait on it
    /// to receive the flush error.
    pub fn force_flush(&self) -> FlushHandle {
        match &self.tx {
            Some(tx) => request_flush(tx, self.flush_timeout),
            None => FlushHandle::rejected(HandlerError::Closed),
        }
    }

    /// Drop every buffered entry and abort in-flight writes.
    ///
    /// Records logged before this call but not yet buffered are discarded as
    /// well; records logged afterwards go into a fresh buffer.
    pub fn cancel_sending(&self) {
        self.buffer.reset_with(|| self.transport.cancel());
    }

    /// Number of entries waiting for the next flush.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Flush what is buffered, then stop the worker threads.
    pub fn close(&mut self) {
        self.request_shutdown();
        self.join_worker();
    }

    fn dispatch(&self, record: ShipLogRecord) {
        let Some(tx) = self.tx.as_ref() else {
            self.warner.record_drop();
            self.warner.warn_if_due(|count| {
                log::warn!("FemtoShipHandler dropped {count} records after shutdown");
            });
            return;
        };
        enqueue_record(
            tx,
            record,
            self.buffer.epoch(),
            self.overflow_policy,
            &self.warner,
        );
    }

    fn request_shutdown(&mut self) {
        let Some(tx) = self.tx.take() else {
            return;
        };
        let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);
        if tx
            .send_timeout(ShipCommand::Shutdown(ack_tx), self.flush_timeout)
            .is_err()
        {
            self.transport.cancel();
            return;
        }
        if ack_rx.recv_timeout(self.flush_timeout).is_err() {
            log::warn!("FemtoShipHandler: final flush timed out; cancelling connection");
            self.transport.cancel();
        }
    }

    fn join_worker(&mut self) {
        let Some(handle) = self.handle.lock().take() else {
            return;
        };
        if handle.join().is_err() {
            log::warn!("FemtoShipHandler: worker thread panicked");
        }
    }
}

impl FemtoHandlerTrait for FemtoShipHandler {
    fn handle(&self, record: ShipLogRecord) {
        self.dispatch(record);
    }

    fn flush(&self) -> bool {
        self.warner.flush(|count| {
            log::warn!("FemtoShipHandler dropped {count} records in the last interval");
        });
        self.force_flush().wait_timeout(self.flush_timeout).is_ok()
    }
}

impl Drop for FemtoShipHandler {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for FemtoShipHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FemtoShipHandler")
            .field("buffer", &self.buffer)
            .field("flush_timeout", &self.flush_timeout)
            .finish()
    }
}
