//! Worker threads driving record intake and flush cycles.
//!
//! The intake worker owns the command queue: it parses records and adds them
//! to the buffer in arrival order, and forwards flush requests to a second
//! thread that runs the [`BatchWriter`]. A slow send therefore never stalls
//! intake, and a flush always sees every record queued before it.

use std::{sync::Arc, thread, time::Duration};

use crossbeam_channel::{
    Receiver, RecvTimeoutError, SendTimeoutError, Sender, TryRecvError, TrySendError, bounded,
    unbounded,
};
use log::{debug, warn};

use crate::{
    fields::parse_fields, log_record::ShipLogRecord, rate_limited_warner::RateLimitedWarner,
};

use super::{
    buffer::{Entry, LogBuffer},
    config::{OverflowPolicy, TOKEN_FIELD},
    error::{FlushError, HandlerError},
    writer::BatchWriter,
};

type FlushAck = Sender<Result<(), FlushError>>;

/// Commands processed by the intake worker.
#[derive(Debug)]
pub enum ShipCommand {
    /// A record stamped with the buffer epoch current when it was logged.
    Record { record: ShipLogRecord, epoch: u64 },
    Flush(FlushAck),
    Shutdown(Sender<()>),
}

/// Everything the intake worker needs besides its queue.
pub struct WorkerContext {
    pub buffer: Arc<LogBuffer>,
    pub writer: Arc<BatchWriter>,
    pub token: Option<String>,
    pub log_activity: bool,
}

pub fn spawn_worker(
    capacity: usize,
    context: WorkerContext,
) -> (Sender<ShipCommand>, thread::JoinHandle<()>) {
    let (tx, rx) = bounded(capacity);
    let handle = thread::spawn(move || context.run(rx));
    (tx, handle)
}

impl WorkerContext {
    fn run(self, rx: Receiver<ShipCommand>) {
        let (flush_tx, flush_rx) = unbounded::<FlushAck>();
        let writer = Arc::clone(&self.writer);
        let log_activity = self.log_activity;
        let flusher = thread::spawn(move || flusher_loop(&writer, &flush_rx, log_activity));

        let mut shutdown_ack = None;
        while let Ok(cmd) = rx.recv() {
            match cmd {
                ShipCommand::Record { record, epoch } => self.handle_record(record, epoch),
                ShipCommand::Flush(ack) => {
                    let _ = flush_tx.send(ack);
                }
                ShipCommand::Shutdown(ack) => {
                    self.drain_pending(&rx, &flush_tx);
                    shutdown_ack = Some(ack);
                    break;
                }
            }
        }

        // Final flush so records logged right before close still ship.
        let (final_tx, _final_rx) = bounded(1);
        let _ = flush_tx.send(final_tx);
        drop(flush_tx);
        if flusher.join().is_err() {
            warn!("FemtoShipHandler: flusher thread panicked");
        }
        if let Some(ack) = shutdown_ack {
            let _ = ack.send(());
        }
    }

    fn handle_record(&self, record: ShipLogRecord, epoch: u64) {
        let fields = match parse_fields(&record.message) {
            Ok(fields) => fields,
            Err(err) => {
                if self.log_activity {
                    debug!("FemtoShipHandler dropped {} record: {err}", record.level);
                }
                return;
            }
        };
        let mut entry = Entry::new(fields);
        if let Some(token) = &self.token {
            entry = entry.with_field(TOKEN_FIELD, token.clone());
        }
        if self.buffer.add_in_epoch(epoch, entry).is_none() && self.log_activity {
            debug!("FemtoShipHandler discarded a record logged before cancellation");
        }
    }

    fn drain_pending(&self, rx: &Receiver<ShipCommand>, flush_tx: &Sender<FlushAck>) {
        loop {
            match rx.try_recv() {
                Ok(ShipCommand::Record { record, epoch }) => self.handle_record(record, epoch),
                Ok(ShipCommand::Flush(ack)) => {
                    let _ = flush_tx.send(ack);
                }
                Ok(ShipCommand::Shutdown(ack)) => {
                    let _ = ack.send(());
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
    }
}

fn flusher_loop(writer: &BatchWriter, rx: &Receiver<FlushAck>, log_activity: bool) {
    while let Ok(ack) = rx.recv() {
        let result = writer.flush();
        if let (Err(err), true) = (&result, log_activity) {
            debug!("FemtoShipHandler flush failed: {err}");
        }
        // Fire-and-forget callers have dropped their end already.
        let _ = ack.send(result);
    }
}

/// Queue a record according to `policy`; returns whether it was accepted.
pub fn enqueue_record(
    tx: &Sender<ShipCommand>,
    record: ShipLogRecord,
    epoch: u64,
    policy: OverflowPolicy,
    warner: &RateLimitedWarner,
) -> bool {
    let cmd = ShipCommand::Record { record, epoch };
    let rejected = match policy {
        OverflowPolicy::Block => tx.send(cmd).err().map(|_| "disconnected"),
        OverflowPolicy::Drop => match tx.try_send(cmd) {
            Ok(()) => None,
            Err(TrySendError::Full(_)) => Some("queue full"),
            Err(TrySendError::Disconnected(_)) => Some("disconnected"),
        },
        OverflowPolicy::Timeout(dur) => match tx.send_timeout(cmd, dur) {
            Ok(()) => None,
            Err(SendTimeoutError::Timeout(_)) => Some("timed out waiting for queue"),
            Err(SendTimeoutError::Disconnected(_)) => Some("disconnected"),
        },
    };
    let Some(reason) = rejected else {
        return true;
    };
    warner.record_drop();
    warner.warn_if_due(|count| {
        warn!("FemtoShipHandler {reason}; dropped {count} records");
    });
    false
}

/// Queue a flush cycle and return a handle to its outcome.
pub fn request_flush(tx: &Sender<ShipCommand>, timeout: Duration) -> FlushHandle {
    let (ack_tx, ack_rx) = bounded(1);
    match tx.send_timeout(ShipCommand::Flush(ack_tx), timeout) {
        Ok(()) => FlushHandle::pending(ack_rx),
        Err(SendTimeoutError::Timeout(_)) => FlushHandle::rejected(HandlerError::QueueFull),
        Err(SendTimeoutError::Disconnected(_)) => FlushHandle::rejected(HandlerError::Closed),
    }
}

enum FlushState {
    Pending(Receiver<Result<(), FlushError>>),
    Rejected(HandlerError),
    Taken,
}

/// Outcome of a scheduled flush cycle.
///
/// Dropping the handle leaves the flush running; its result is then only
/// visible through activity diagnostics.
pub struct FlushHandle {
    state: FlushState,
}

impl FlushHandle {
    fn pending(rx: Receiver<Result<(), FlushError>>) -> Self {
        Self {
            state: FlushState::Pending(rx),
        }
    }

    pub(crate) fn rejected(err: HandlerError) -> Self {
        Self {
            state: FlushState::Rejected(err),
        }
    }

    /// Block until the flush cycle finishes.
    pub fn wait(self) -> Result<(), HandlerError> {
        match self.state {
            FlushState::Pending(rx) => match rx.recv() {
                Ok(result) => result.map_err(HandlerError::from),
                Err(_) => Err(HandlerError::Closed),
            },
            FlushState::Rejected(err) => Err(err),
            FlushState::Taken => Err(HandlerError::Closed),
        }
    }

    /// Block for at most `timeout`.
    pub fn wait_timeout(self, timeout: Duration) -> Result<(), HandlerError> {
        match self.state {
            FlushState::Pending(rx) => match rx.recv_timeout(timeout) {
                Ok(result) => result.map_err(HandlerError::from),
                Err(RecvTimeoutError::Timeout) => Err(HandlerError::Timeout),
                Err(RecvTimeoutError::Disconnected) => Err(HandlerError::Closed),
            },
            FlushState::Rejected(err) => Err(err),
            FlushState::Taken => Err(HandlerError::Closed),
        }
    }

    /// Non-blocking check; `None` while the flush is still running.
    ///
    /// Once a result has been returned, further polls report
    /// [`HandlerError::Closed`].
    pub fn poll(&mut self) -> Option<Result<(), HandlerError>> {
        match std::mem::replace(&mut self.state, FlushState::Taken) {
            FlushState::Pending(rx) => match rx.try_recv() {
                Ok(result) => Some(result.map_err(HandlerError::from)),
                Err(TryRecvError::Empty) => {
                    self.state = FlushState::Pending(rx);
                    None
                }
                Err(TryRecvError::Disconnected) => Some(Err(HandlerError::Closed)),
            },
            FlushState::Rejected(err) => Some(Err(err)),
            FlushState::Taken => Some(Err(HandlerError::Closed)),
        }
    }
}

impl std::fmt::Debug for FlushHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            FlushState::Pending(_) => "pending",
            FlushState::Rejected(_) => "rejected",
            FlushState::Taken => "taken",
        };
        f.debug_struct("FlushHandle").field("state", &state).finish()
    }
}
