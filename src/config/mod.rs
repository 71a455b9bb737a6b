//! Declarative logging configuration
//!
//! A [`LoggingConfig`] names formatters, handlers and loggers and wires them
//! together by name. It can be read from an INI document, from JSON, or taken
//! from the bundled pipeline configuration, and is turned into live loggers by
//! [`Registry`](crate::Registry).
//!
//! # Examples
//!
//! ```
//! use logging_registry::config::LoggingConfig;
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
//! level=WARNING
//! handlers=console
//!
//! [handler_console]
//! class=StreamHandler
//! level=WARNING
//! formatter=brief
//! args=(sys.stderr,)
//!
//! [formatter_brief]
//! format=%(levelname)s | %(message)s
//! ",
//! )
//! .unwrap();
//!
//! assert_eq!(config.handlers[0].formatter.as_deref(), Some("brief"));
//! ```

mod args;
mod ini;

use crate::appenders::{ConsoleStream, FileMode};
use crate::core::error::{LoggerError, Result};
use crate::core::formatter::TimeZoneMode;
use crate::core::log_level::LogLevel;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Qualified name of the root logger
pub const ROOT_LOGGER: &str = "root";

/// Configuration shipped with the crate: a console on stderr plus one rotating
/// file per pipeline stage.
const BUNDLED_CONFIG: &str = include_str!("../../config/logging.conf");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatterSpec {
    pub name: String,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub datefmt: Option<String>,
    #[serde(default)]
    pub timezone: TimeZoneMode,
}

/// Where a handler writes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "snake_case")]
pub enum SinkSpec {
    Console {
        #[serde(default)]
        stream: ConsoleStream,
    },
    RotatingFile {
        filename: PathBuf,
        #[serde(default)]
        mode: FileMode,
        /// Rollover threshold; 0 disables rollover
        #[serde(default)]
        max_bytes: u64,
        #[serde(default)]
        backup_count: usize,
        /// Open the file on the first write instead of at construction
        #[serde(default)]
        delay: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerSpec {
    pub name: String,
    /// Threshold; `None` accepts every record
    #[serde(default)]
    pub level: Option<LogLevel>,
    /// Formatter name; `None` renders the bare message
    #[serde(default)]
    pub formatter: Option<String>,
    #[serde(flatten)]
    pub sink: SinkSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggerSpec {
    /// Qualified, dot-separated name; `root` for the root logger
    pub name: String,
    /// Own threshold; `None` inherits from the parent
    #[serde(default)]
    pub level: Option<LogLevel>,
    #[serde(default)]
    pub handlers: Vec<String>,
    #[serde(default = "default_propagate")]
    pub propagate: bool,
    /// Explicit parent logger name; by default the nearest configured
    /// dotted-name ancestor, or the root
    #[serde(default)]
    pub parent: Option<String>,
}

fn default_propagate() -> bool {
    true
}

impl LoggerSpec {
    pub fn is_root(&self) -> bool {
        self.name == ROOT_LOGGER
    }
}

/// A complete, typed logging configuration
///
/// The default value declares nothing: the registry built from it has only an
/// implicit root logger at WARNING without handlers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub formatters: Vec<FormatterSpec>,
    #[serde(default)]
    pub handlers: Vec<HandlerSpec>,
    #[serde(default)]
    pub loggers: Vec<LoggerSpec>,
}

impl LoggingConfig {
    /// Parse an INI document with `[loggers]`, `[handlers]` and `[formatters]`
    /// index sections
    pub fn from_ini_str(text: &str) -> Result<Self> {
        let config = ini::to_config(&ini::IniDocument::parse(text)?)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_ini_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            LoggerError::io_operation(
                "reading logging configuration",
                path.display().to_string(),
                e,
            )
        })?;
        Self::from_ini_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            LoggerError::io_operation(
                "reading logging configuration",
                path.display().to_string(),
                e,
            )
        })?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// The pipeline configuration shipped in `config/logging.conf`
    ///
    /// Declares a `console` handler (stderr, WARNING, `brief`) on the root
    /// logger and the `preprocessing` and `partitioning` loggers, each with a
    /// DEBUG rotating file (`'w'`, 10 000 000 bytes, 5 backups, `verbose`).
    pub fn bundled() -> Result<Self> {
        Self::from_ini_str(BUNDLED_CONFIG)
    }

    pub fn formatter(&self, name: &str) -> Option<&FormatterSpec> {
        self.formatters.iter().find(|f| f.name == name)
    }

    pub fn handler(&self, name: &str) -> Option<&HandlerSpec> {
        self.handlers.iter().find(|h| h.name == name)
    }

    pub fn logger(&self, name: &str) -> Option<&LoggerSpec> {
        self.loggers.iter().find(|l| l.name == name)
    }

    /// Check names and cross references
    ///
    /// Parent links are resolved, and checked for cycles, when the registry
    /// is built.
    ///
    /// # Errors
    ///
    /// Returns [`LoggerError::InvalidConfiguration`] for duplicate or empty
    /// names and for handlers or formatters that are referenced but not
    /// declared.
    pub fn validate(&self) -> Result<()> {
        check_unique("formatter", self.formatters.iter().map(|f| f.name.as_str()))?;
        check_unique("handler", self.handlers.iter().map(|h| h.name.as_str()))?;
        check_unique("logger", self.loggers.iter().map(|l| l.name.as_str()))?;

        for handler in &self.handlers {
            if let Some(formatter) = &handler.formatter {
                if self.formatter(formatter).is_none() {
                    return Err(LoggerError::config(
                        format!("handler '{}'", handler.name),
                        format!("references undeclared formatter '{}'", formatter),
                    ));
                }
            }
        }

        for logger in &self.loggers {
            for handler in &logger.handlers {
                if self.handler(handler).is_none() {
                    return Err(LoggerError::config(
                        format!("logger '{}'", logger.name),
                        format!("references undeclared handler '{}'", handler),
                    ));
                }
            }
            if let Some(parent) = &logger.parent {
                if logger.is_root() {
                    return Err(LoggerError::config(
                        "logger 'root'",
                        "the root logger cannot have a parent",
                    ));
                }
                if parent != ROOT_LOGGER && self.logger(parent).is_none() {
                    return Err(LoggerError::config(
                        format!("logger '{}'", logger.name),
                        format!("parent '{}' is not a declared logger", parent),
                    ));
                }
            }
        }

        Ok(())
    }
}

fn check_unique<'a>(kind: &str, names: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if name.trim().is_empty() {
            return Err(LoggerError::config(
                kind,
                format!("{} name must not be empty", kind),
            ));
        }
        if !seen.insert(name) {
            return Err(LoggerError::config(
                format!("{} '{}'", kind, name),
                "declared more than once",
            ));
        }
    }
    Ok(())
}
