//! One flush cycle: drain, send, partition, restore.

use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use super::{
    buffer::LogBuffer, error::FlushError, serialise::serialise_entry, transport::LogTransport,
};

/// Drives flush cycles for one buffer/transport pair.
///
/// Cycles are single-flight: a second `flush` waits for the first to finish
/// rather than sharing the connection with it. The buffer lock is only taken
/// to drain and to restore, so producers are never held up by a slow send.
pub struct BatchWriter {
    buffer: Arc<LogBuffer>,
    transport: Arc<dyn LogTransport>,
    in_flight: Mutex<()>,
    log_activity: bool,
}

impl BatchWriter {
    pub fn new(buffer: Arc<LogBuffer>, transport: Arc<dyn LogTransport>) -> Self {
        Self {
            buffer,
            transport,
            in_flight: Mutex::new(()),
            log_activity: false,
        }
    }

    pub fn with_log_activity(mut self, log_activity: bool) -> Self {
        self.log_activity = log_activity;
        self
    }

    /// Ship everything currently buffered.
    ///
    /// Entries that fail are put back for the next flush and the failure of
    /// the earliest of them is returned. There is no retry limit.
    pub fn flush(&self) -> Result<(), FlushError> {
        let _guard = self.in_flight.lock();
        let batch = self.buffer.drain();
        if batch.is_empty() {
            self.activity(|| "FemtoShipHandler flush: nothing to write".to_owned());
            return Ok(());
        }

        let attempted = batch.len();
        let failures = self.transport.send_batch(&batch, &serialise_entry);
        let (sent, failed) = batch.partition(&failures);
        if failed.is_empty() {
            self.activity(|| format!("FemtoShipHandler did write tags: {sent:?}"));
            return Ok(());
        }

        if self.log_activity {
            for (tag, err) in &failures {
                debug!("FemtoShipHandler {tag} did error: {err}");
            }
        }
        let failed_count = failed.len();
        let representative = failures
            .into_iter()
            .find(|(tag, _)| failed.contains(*tag))
            .map(|(_, err)| err);
        let restored = self.buffer.restore(failed);
        self.activity(|| {
            format!("FemtoShipHandler {failed_count} failed entries, {restored} re-queued")
        });
        match representative {
            Some(source) => Err(FlushError {
                failed: failed_count,
                attempted,
                source,
            }),
            None => Ok(()),
        }
    }

    fn activity(&self, message: impl FnOnce() -> String) {
        if self.log_activity {
            debug!("{}", message());
        }
    }
}

impl std::fmt::Debug for BatchWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchWriter")
            .field("buffer", &self.buffer)
            .field("log_activity", &self.log_activity)
            .finish()
    }
}
