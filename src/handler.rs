use crate::log_record::ShipLogRecord;

/// Trait implemented by log handlers.
///
/// Handlers are shared between threads. `handle` forwards the record to the
/// handler's own worker without blocking the caller.
pub trait FemtoHandlerTrait: Send + Sync {
    /// Dispatch a log record for handling.
    fn handle(&self, record: ShipLogRecord);

    /// Flush pending records, returning `true` on success.
    fn flush(&self) -> bool {
        true
    }
}
