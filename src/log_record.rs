//! Log record representation handed to the shipping handler.
//!
//! A `ShipLogRecord` is what the host logging framework produces: an
//! already-leveled, already-formatted message plus the context captured at
//! the call site. The message itself is expected to carry a JSON object; the
//! handler parses and flattens it before it is buffered.

use crate::level::ShipLevel;
use std::time::SystemTime;

/// Additional context associated with a log record.
#[derive(Clone, Debug)]
pub struct RecordMetadata {
    /// Rust module path where the log call originated.
    pub module_path: String,
    /// Source file name for the log call.
    pub filename: String,
    /// Line number in the source file.
    pub line_number: u32,
    /// Time the record was created.
    pub timestamp: SystemTime,
    /// Name of the thread that created the record (if any).
    pub thread_name: Option<String>,
}

impl Default for RecordMetadata {
    fn default() -> Self {
        Self {
            module_path: String::new(),
            filename: String::new(),
            line_number: 0,
            timestamp: SystemTime::now(),
            thread_name: std::thread::current().name().map(ToString::to_string),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ShipLogRecord {
    pub level: ShipLevel,
    /// Formatted message; a JSON object for records that should ship.
    pub message: String,
    pub metadata: RecordMetadata,
}

impl ShipLogRecord {
    /// Construct a new record from `level` and `message`.
    pub fn new(level: ShipLevel, message: impl Into<String>) -> Self {
        Self::with_metadata(level, message, RecordMetadata::default())
    }

    pub fn with_metadata(
        level: ShipLevel,
        message: impl Into<String>,
        metadata: RecordMetadata,
    ) -> Self {
        Self {
            level,
            message: message.into(),
            metadata,
        }
    }
}
