//! Core registry types and traits

pub mod appender;
pub mod error;
pub mod formatter;
pub mod handler;
pub mod log_level;
pub mod log_record;
pub mod logger;
pub mod metrics;
pub mod registry;

pub use appender::Appender;
pub use error::{LoggerError, Result};
pub use formatter::{Formatter, TimeZoneMode, DEFAULT_FORMAT};
pub use handler::{Handler, Sink};
pub use log_level::LogLevel;
pub use log_record::{Callsite, LogRecord};
pub use logger::{ErrorPolicy, Logger};
pub use metrics::LoggerMetrics;
pub use registry::{Registry, RegistryBuilder};
