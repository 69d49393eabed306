//! Rotating file logging
//!
//! Provides the rotating writer, its rollover policies, retention management
//! and the diagnostic `tracing` setup used to report the writer's own failures.

mod diagnostics;
mod level;
mod policy;
mod retention;
mod rollover;
mod writer;

pub use diagnostics::{init_diagnostics, DEFAULT_DIAGNOSTIC_FILTER};
pub use level::{LogEntry, LogLevel};
pub use policy::{is_log_file_name, Clock, LogFileNames, LogPolicy, RolloverScheme, SystemClock};
pub use retention::{delete_log_files, list_log_files, list_log_files_sorted, LogFileInfo};
pub use writer::{RotatingLogWriter, DEFAULT_QUEUE_CAPACITY};
