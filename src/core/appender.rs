//! Appender trait for log output destinations

use super::{error::Result, log_level::LogLevel};

/// Capability shared by every sink variant: accept one rendered record.
///
/// `line` carries no trailing newline; the appender terminates it.
pub trait Appender: Send {
    fn append(&mut self, level: LogLevel, line: &str) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
    fn name(&self) -> &str;
}
