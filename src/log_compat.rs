//! Compatibility bridge for the Rust `log` crate.
//!
//! `ShipLogAdapter` implements `log::Log` so an application using the `log`
//! macros can route its records straight into a shipping handler. Each
//! record's formatted arguments become the message; records whose message is
//! not a JSON object are dropped by the handler as usual.
//!
//! Records emitted by this crate itself are never forwarded, otherwise the
//! handler's own activity diagnostics would feed back into its buffer.

use std::sync::{Arc, OnceLock};

use log::{LevelFilter, Metadata, Record};

use crate::handler::FemtoHandlerTrait;
use crate::level::ShipLevel;
use crate::log_record::{RecordMetadata, ShipLogRecord};

fn map_log_level(level: log::Level) -> ShipLevel {
    match level {
        log::Level::Trace => ShipLevel::Verbose,
        log::Level::Debug => ShipLevel::Debug,
        log::Level::Info => ShipLevel::Info,
        log::Level::Warn => ShipLevel::Warning,
        log::Level::Error => ShipLevel::Error,
    }
}

impl From<log::Level> for ShipLevel {
    fn from(level: log::Level) -> Self {
        map_log_level(level)
    }
}

fn is_own_target(target: &str) -> bool {
    target == env!("CARGO_CRATE_NAME")
        || target
            .strip_prefix(env!("CARGO_CRATE_NAME"))
            .is_some_and(|rest| rest.starts_with("::"))
}

/// Adapter implementing the Rust `log::Log` trait.
pub struct ShipLogAdapter {
    handler: Arc<dyn FemtoHandlerTrait>,
    max_level: LevelFilter,
}

impl ShipLogAdapter {
    pub fn new(handler: Arc<dyn FemtoHandlerTrait>, max_level: LevelFilter) -> Self {
        Self { handler, max_level }
    }
}

impl log::Log for ShipLogAdapter {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.max_level && !is_own_target(metadata.target())
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let metadata = RecordMetadata {
            module_path: record.module_path().unwrap_or_default().to_string(),
            filename: record.file().unwrap_or_default().to_string(),
            line_number: record.line().unwrap_or(0),
            ..Default::default()
        };
        self.handler.handle(ShipLogRecord::with_metadata(
            ShipLevel::from(record.level()),
            record.args().to_string(),
            metadata,
        ));
    }

    fn flush(&self) {
        let _ = self.handler.flush();
    }
}

static INSTALL_RESULT: OnceLock<bool> = OnceLock::new();

/// Install `handler` as the global Rust logger.
///
/// Returns `true` on success. When a different global logger is already set,
/// installation fails and `false` is returned. Subsequent calls return the
/// cached outcome.
pub fn install_global_logger(handler: Arc<dyn FemtoHandlerTrait>, max_level: LevelFilter) -> bool {
    *INSTALL_RESULT.get_or_init(|| {
        let adapter = ShipLogAdapter::new(handler, max_level);
        if log::set_boxed_logger(Box::new(adapter)).is_err() {
            return false;
        }
        log::set_max_level(max_level);
        true
    })
}
