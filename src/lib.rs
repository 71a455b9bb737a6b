//! # Logging Registry
//!
//! Declarative logging configuration for multi-stage applications: named
//! loggers, handlers and formatters are declared in one document and wired
//! together once at startup.
//!
//! ## Features
//!
//! - **Declarative**: INI or JSON documents, plus a bundled pipeline configuration
//! - **Logger tree**: explicit parents, inherited thresholds and propagation
//! - **Sinks**: console streams and size-rotated files with numbered backups
//! - **Formatting**: `%(field)s` layouts with strftime timestamps
//!
//! ## Example
//!
//! ```
//! use logging_registry::prelude::*;
//!
//! let config = LoggingConfig::from_ini_str(
//!     "
//! [loggers]
//! keys=root
//!
//! [handlers]
//! keys=console
//!
//! [formatters]
//! keys=brief
//!
//! [logger_root]
//! level=INFO
//! handlers=console
//!
//! [handler_console]
//! class=StreamHandler
//! formatter=brief
//! args=(sys.stdout,)
//!
//! [formatter_brief]
//! format=%(levelname)s | %(name)s | %(message)s
//! ",
//! )?;
//!
//! let buffer = SharedBuffer::new();
//! let registry = Registry::builder()
//!     .stream(ConsoleStream::Stdout, buffer.clone())
//!     .build(&config)?;
//!
//! registry.get_logger("partitioning").info("wrote 8 shards")?;
//! assert_eq!(buffer.contents(), "INFO | partitioning | wrote 8 shards\n");
//! # Ok::<(), LoggerError>(())
//! ```

pub mod appenders;
pub mod config;
pub mod core;
pub mod macros;

pub mod prelude {
    pub use crate::appenders::{ConsoleStream, FileMode, RotationPolicy, SharedBuffer};
    pub use crate::config::LoggingConfig;
    pub use crate::core::{
        Callsite, ErrorPolicy, LogLevel, Logger, LoggerError, LoggerMetrics, Registry,
        RegistryBuilder, Result,
    };
}

pub use crate::appenders::{ConsoleAppender, ConsoleStream, RotatingFileAppender};
pub use crate::config::LoggingConfig;
pub use crate::core::{
    Appender, Callsite, ErrorPolicy, Formatter, Handler, LogLevel, LogRecord, Logger, LoggerError,
    LoggerMetrics, Registry, RegistryBuilder, Result, Sink, TimeZoneMode,
};
