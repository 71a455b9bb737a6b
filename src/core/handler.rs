//! Handlers: a severity threshold, a formatter and one sink

use super::{
    appender::Appender, error::Result, formatter::Formatter, log_level::LogLevel,
    log_record::LogRecord,
};
use crate::appenders::{ConsoleAppender, RotatingFileAppender};
use parking_lot::Mutex;
use std::sync::Arc;

/// Output destination of a handler
pub enum Sink {
    Console(ConsoleAppender),
    RotatingFile(RotatingFileAppender),
}

impl Sink {
    fn appender(&mut self) -> &mut dyn Appender {
        match self {
            Sink::Console(appender) => appender,
            Sink::RotatingFile(appender) => appender,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Sink::Console(_) => "console",
            Sink::RotatingFile(_) => "rotating_file",
        }
    }
}

impl From<ConsoleAppender> for Sink {
    fn from(appender: ConsoleAppender) -> Self {
        Sink::Console(appender)
    }
}

impl From<RotatingFileAppender> for Sink {
    fn from(appender: RotatingFileAppender) -> Self {
        Sink::RotatingFile(appender)
    }
}

/// A named sink bound to exactly one formatter
///
/// The sink sits behind its own mutex: a write and any rollover it triggers
/// happen atomically with respect to other threads emitting through the
/// same handler.
pub struct Handler {
    name: String,
    level: LogLevel,
    formatter: Arc<Formatter>,
    sink: Mutex<Sink>,
}

impl Handler {
    pub fn new(
        name: impl Into<String>,
        level: LogLevel,
        formatter: Arc<Formatter>,
        sink: impl Into<Sink>,
    ) -> Self {
        Self {
            name: name.into(),
            level,
            formatter,
            sink: Mutex::new(sink.into()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn formatter(&self) -> &Arc<Formatter> {
        &self.formatter
    }

    pub fn kind(&self) -> &'static str {
        self.sink.lock().kind()
    }

    #[inline]
    pub fn is_enabled_for(&self, level: LogLevel) -> bool {
        level >= self.level
    }

    /// Render the record and write it, flushing so the line is visible at once
    pub fn emit(&self, record: &LogRecord) -> Result<()> {
        let line = self.formatter.format(record);
        let mut sink = self.sink.lock();
        let appender = sink.appender();
        appender.append(record.level, &line)?;
        appender.flush()
    }

    pub fn flush(&self) -> Result<()> {
        self.sink.lock().appender().flush()
    }

    /// Rollovers performed by a rotating file sink (always 0 for console sinks)
    pub fn rotation_count(&self) -> u64 {
        match &*self.sink.lock() {
            Sink::RotatingFile(appender) => appender.rotation_count(),
            Sink::Console(_) => 0,
        }
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler")
            .field("name", &self.name)
            .field("level", &self.level)
            .field("formatter", &self.formatter.name())
            .field("kind", &self.kind())
            .finish()
    }
}
