//! Logger handles and record emission
//!
//! A [`Logger`] is a cheap, cloneable handle to an immutable node of the
//! logger tree. Parents are held by reference, resolved when the registry is
//! built, so emission never looks names up.

use super::{
    error::{LoggerError, Result},
    handler::Handler,
    log_level::LogLevel,
    log_record::{Callsite, LogRecord},
    metrics::LoggerMetrics,
};
use std::panic::Location;
use std::sync::Arc;

/// What happens when a handler fails to write a record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Attempt every handler, then return the first failure to the caller
    #[default]
    Surface,
    /// Report failures on stderr, count them and return `Ok(())`
    Ignore,
}

/// State shared by every logger of one registry
#[derive(Debug, Default)]
pub(crate) struct EmitContext {
    pub(crate) metrics: LoggerMetrics,
    pub(crate) error_policy: ErrorPolicy,
}

impl EmitContext {
    pub(crate) fn new(error_policy: ErrorPolicy) -> Self {
        Self {
            metrics: LoggerMetrics::new(),
            error_policy,
        }
    }
}

struct LoggerNode {
    name: String,
    level: Option<LogLevel>,
    effective_level: LogLevel,
    handlers: Vec<Arc<Handler>>,
    propagate: bool,
    parent: Option<Logger>,
    context: Arc<EmitContext>,
}

/// Named entry point for emitting records
#[derive(Clone)]
pub struct Logger {
    inner: Arc<LoggerNode>,
}

impl Logger {
    /// Create a logger node
    ///
    /// A logger without its own level inherits the effective level of its
    /// parent; a parentless logger without a level defaults to WARNING.
    pub(crate) fn new(
        name: impl Into<String>,
        level: Option<LogLevel>,
        handlers: Vec<Arc<Handler>>,
        propagate: bool,
        parent: Option<Logger>,
        context: Arc<EmitContext>,
    ) -> Self {
        let effective_level = level
            .or_else(|| parent.as_ref().map(Logger::effective_level))
            .unwrap_or(LogLevel::Warning);
        Self {
            inner: Arc::new(LoggerNode {
                name: name.into(),
                level,
                effective_level,
                handlers,
                propagate,
                parent,
                context,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Level set on this logger, if any
    pub fn level(&self) -> Option<LogLevel> {
        self.inner.level
    }

    /// Threshold actually applied: own level or nearest ancestor's
    pub fn effective_level(&self) -> LogLevel {
        self.inner.effective_level
    }

    pub fn propagate(&self) -> bool {
        self.inner.propagate
    }

    pub fn parent(&self) -> Option<&Logger> {
        self.inner.parent.as_ref()
    }

    pub fn handlers(&self) -> &[Arc<Handler>] {
        &self.inner.handlers
    }

    /// Ancestors from the parent up to the root
    pub fn ancestors(&self) -> impl Iterator<Item = &Logger> {
        std::iter::successors(self.parent(), |logger| logger.parent())
    }

    /// True if both handles refer to the same logger
    pub fn ptr_eq(&self, other: &Logger) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    #[inline]
    pub fn is_enabled_for(&self, level: LogLevel) -> bool {
        level >= self.inner.effective_level
    }

    /// Emit a record, capturing the caller's file and line
    ///
    /// The enclosing function is not known here, so `%(funcName)s` renders
    /// as `<unknown>`. Use the [`debug!`](crate::debug)..[`critical!`](crate::critical)
    /// macros to record it.
    ///
    /// # Errors
    ///
    /// With [`ErrorPolicy::Surface`], returns the first handler failure after
    /// every eligible handler has been attempted.
    #[track_caller]
    pub fn log(&self, level: LogLevel, message: impl AsRef<str>) -> Result<()> {
        self.log_at(level, message.as_ref(), Callsite::from(Location::caller()))
    }

    /// Emit a record with an explicit call site (used by the logging macros)
    pub fn log_at(&self, level: LogLevel, message: &str, callsite: Callsite) -> Result<()> {
        if !self.is_enabled_for(level) {
            self.inner.context.metrics.record_filtered();
            return Ok(());
        }
        let record = LogRecord::new(self.name(), level, message, callsite);
        self.handle(&record)
    }

    /// Route a prepared record through this logger and its ancestors
    ///
    /// At each logger the record is dropped if it is below that logger's
    /// threshold; otherwise every handler whose own threshold admits it
    /// writes it. The walk continues to the parent while `propagate` is set.
    /// A record counts as filtered only if no handler was reached before an
    /// ancestor dropped it.
    pub fn handle(&self, record: &LogRecord) -> Result<()> {
        let context = &self.inner.context;
        let mut first_failure = None;
        let mut reached_handler = false;
        let mut current = Some(self);

        while let Some(logger) = current {
            if !logger.is_enabled_for(record.level) {
                if !reached_handler {
                    context.metrics.record_filtered();
                }
                break;
            }

            for handler in logger.handlers() {
                if !handler.is_enabled_for(record.level) {
                    continue;
                }
                reached_handler = true;
                match handler.emit(record) {
                    Ok(()) => context.metrics.record_written(),
                    Err(e) => {
                        context.metrics.record_failure();
                        match context.error_policy {
                            ErrorPolicy::Surface => {
                                if first_failure.is_none() {
                                    first_failure =
                                        Some(LoggerError::handler_failed(handler.name(), e));
                                }
                            }
                            ErrorPolicy::Ignore => {
                                eprintln!(
                                    "[LOGGER ERROR] Handler '{}' failed for logger '{}': {}",
                                    handler.name(),
                                    record.logger,
                                    e
                                );
                            }
                        }
                    }
                }
            }

            if !logger.propagate() {
                break;
            }
            current = logger.parent();
        }

        first_failure.map_or(Ok(()), Err)
    }

    /// Flush this logger's own handlers
    pub fn flush(&self) -> Result<()> {
        for handler in self.handlers() {
            handler.flush()?;
        }
        Ok(())
    }

    #[inline]
    #[track_caller]
    pub fn debug(&self, message: impl AsRef<str>) -> Result<()> {
        self.log(LogLevel::Debug, message)
    }

    #[inline]
    #[track_caller]
    pub fn info(&self, message: impl AsRef<str>) -> Result<()> {
        self.log(LogLevel::Info, message)
    }

    #[inline]
    #[track_caller]
    pub fn warning(&self, message: impl AsRef<str>) -> Result<()> {
        self.log(LogLevel::Warning, message)
    }

    #[inline]
    #[track_caller]
    pub fn error(&self, message: impl AsRef<str>) -> Result<()> {
        self.log(LogLevel::Error, message)
    }

    #[inline]
    #[track_caller]
    pub fn critical(&self, message: impl AsRef<str>) -> Result<()> {
        self.log(LogLevel::Critical, message)
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.inner.name)
            .field("level", &self.inner.level)
            .field("effective_level", &self.inner.effective_level)
            .field(
                "handlers",
                &self.inner.handlers.iter().map(|h| h.name()).collect::<Vec<_>>(),
            )
            .field("propagate", &self.inner.propagate)
            .field("parent", &self.parent().map(Logger::name))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appenders::{ConsoleAppender, ConsoleStream, SharedBuffer};
    use crate::core::appender::Appender;
    use crate::core::formatter::{Formatter, TimeZoneMode};

    fn capture(name: &str, level: LogLevel) -> (Arc<Handler>, SharedBuffer) {
        let buffer = SharedBuffer::new();
        let formatter = Arc::new(
            Formatter::new(
                "brief",
                Some("%(name)s:%(levelname)s:%(message)s"),
                None,
                TimeZoneMode::Utc,
            )
            .unwrap(),
        );
        let appender =
            ConsoleAppender::with_writer(ConsoleStream::Stderr, Box::new(buffer.clone()));
        (Arc::new(Handler::new(name, level, formatter, appender)), buffer)
    }

    fn tree(context: Arc<EmitContext>) -> (Logger, Logger, SharedBuffer, SharedBuffer) {
        let (console, console_out) = capture("console", LogLevel::Warning);
        let (file, file_out) = capture("file", LogLevel::Debug);
        let root = Logger::new(
            "root",
            Some(LogLevel::Warning),
            vec![console],
            false,
            None,
            Arc::clone(&context),
        );
        let child = Logger::new(
            "preprocessing",
            Some(LogLevel::Debug),
            vec![file],
            true,
            Some(root.clone()),
            context,
        );
        (root, child, console_out, file_out)
    }

    #[test]
    fn test_effective_level_inherited() {
        let context = Arc::new(EmitContext::default());
        let root = Logger::new(
            "root",
            Some(LogLevel::Error),
            vec![],
            false,
            None,
            Arc::clone(&context),
        );
        let child = Logger::new(
            "a",
            None,
            vec![],
            true,
            Some(root.clone()),
            Arc::clone(&context),
        );
        let grandchild = Logger::new("a.b", None, vec![], true, Some(child.clone()), context);

        assert_eq!(grandchild.level(), None);
        assert_eq!(grandchild.effective_level(), LogLevel::Error);
        assert_eq!(
            grandchild.ancestors().map(Logger::name).collect::<Vec<_>>(),
            vec!["a", "root"]
        );
    }

    #[test]
    fn test_propagation_respects_thresholds() {
        let context = Arc::new(EmitContext::default());
        let (_root, child, console_out, file_out) = tree(Arc::clone(&context));

        child.debug("loading").unwrap();
        child.warning("slow stage").unwrap();

        assert_eq!(
            file_out.lines(),
            vec!["preprocessing:DEBUG:loading", "preprocessing:WARNING:slow stage"]
        );
        assert_eq!(
            console_out.lines(),
            vec!["preprocessing:WARNING:slow stage"]
        );
        assert_eq!(context.metrics.records_written(), 3);
    }

    #[test]
    fn test_written_record_not_counted_as_filtered() {
        let context = Arc::new(EmitContext::default());
        let (_root, child, console_out, file_out) = tree(Arc::clone(&context));

        // Written by the child's handler, then dropped by the WARNING root
        child.debug("loading").unwrap();

        assert_eq!(file_out.lines().len(), 1);
        assert!(console_out.contents().is_empty());
        assert_eq!(context.metrics.records_written(), 1);
        assert_eq!(context.metrics.records_filtered(), 0);
    }

    #[test]
    fn test_record_dropped_before_any_handler_counted_once() {
        let context = Arc::new(EmitContext::default());
        let root = Logger::new(
            "root",
            Some(LogLevel::Error),
            vec![],
            false,
            None,
            Arc::clone(&context),
        );
        let quiet = Logger::new(
            "quiet",
            Some(LogLevel::Debug),
            vec![],
            true,
            Some(root),
            Arc::clone(&context),
        );

        quiet.info("nowhere to go").unwrap();
        assert_eq!(context.metrics.records_written(), 0);
        assert_eq!(context.metrics.records_filtered(), 1);
    }

    #[test]
    fn test_below_logger_threshold_discarded() {
        let context = Arc::new(EmitContext::default());
        let (root, _child, console_out, _) = tree(Arc::clone(&context));

        root.info("ignored").unwrap();
        assert!(console_out.contents().is_empty());
        assert_eq!(context.metrics.records_filtered(), 1);
    }

    #[test]
    fn test_non_propagating_logger_stops_walk() {
        let context = Arc::new(EmitContext::default());
        let (console, console_out) = capture("console", LogLevel::Debug);
        let (local, local_out) = capture("local", LogLevel::Debug);
        let root = Logger::new(
            "root",
            Some(LogLevel::Debug),
            vec![console],
            false,
            None,
            Arc::clone(&context),
        );
        let isolated = Logger::new("isolated", None, vec![local], false, Some(root), context);

        isolated.error("kept local").unwrap();
        assert_eq!(local_out.lines().len(), 1);
        assert!(console_out.contents().is_empty());
    }

    #[test]
    fn test_log_captures_caller_location() {
        let context = Arc::new(EmitContext::default());
        let buffer = SharedBuffer::new();
        let formatter = Arc::new(
            Formatter::new(
                "loc",
                Some("%(filename)s:%(lineno)d"),
                None,
                TimeZoneMode::Utc,
            )
            .unwrap(),
        );
        let handler = Arc::new(Handler::new(
            "loc",
            LogLevel::Debug,
            formatter,
            ConsoleAppender::with_writer(ConsoleStream::Stderr, Box::new(buffer.clone())),
        ));
        let logger = Logger::new(
            "loc",
            Some(LogLevel::Debug),
            vec![handler],
            false,
            None,
            context,
        );

        let line = line!() + 1;
        logger.info("here").unwrap();
        assert_eq!(buffer.contents(), format!("logger.rs:{}\n", line));
    }

    struct BrokenWriter;

    impl std::io::Write for BrokenWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "closed",
            ))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn broken_tree(policy: ErrorPolicy) -> (Logger, SharedBuffer, Arc<EmitContext>) {
        let context = Arc::new(EmitContext::new(policy));
        let formatter = Arc::new(
            Formatter::new("plain", None, None, TimeZoneMode::Utc).unwrap(),
        );
        let broken = ConsoleAppender::with_writer(ConsoleStream::Stderr, Box::new(BrokenWriter));
        assert_eq!(broken.name(), "console");
        let broken = Arc::new(Handler::new("broken", LogLevel::Debug, formatter, broken));
        let (healthy, healthy_out) = capture("healthy", LogLevel::Debug);
        let logger = Logger::new(
            "app",
            Some(LogLevel::Debug),
            vec![broken, healthy],
            false,
            None,
            Arc::clone(&context),
        );
        (logger, healthy_out, context)
    }

    #[test]
    fn test_surface_policy_returns_failure_after_all_handlers() {
        let (logger, healthy_out, context) = broken_tree(ErrorPolicy::Surface);

        let err = logger.error("disk full").unwrap_err();
        assert!(
            matches!(
                err,
                LoggerError::HandlerFailed { ref handler, .. } if handler == "broken"
            )
        );
        assert_eq!(healthy_out.lines(), vec!["app:ERROR:disk full"]);
        assert_eq!(context.metrics.write_failures(), 1);
    }

    #[test]
    fn test_ignore_policy_swallows_failure() {
        let (logger, healthy_out, context) = broken_tree(ErrorPolicy::Ignore);

        assert!(logger.error("disk full").is_ok());
        assert_eq!(healthy_out.lines().len(), 1);
        assert_eq!(context.metrics.write_failures(), 1);
    }
}
