//! The logging configuration registry
//!
//! A [`Registry`] is built once from a [`LoggingConfig`]: formatters are
//! compiled, handlers opened and loggers linked to their parents. Subsystems
//! then look loggers up by name.
//!
//! # Examples
//!
//! ```no_run
//! use logging_registry::{LoggingConfig, Registry};
//!
//! let registry = Registry::builder()
//!     .base_dir("logs")
//!     .build(&LoggingConfig::bundled()?)?;
//!
//! let logger = registry.get_logger("preprocessing");
//! logger.debug("parsed row 42")?;
//! # Ok::<(), logging_registry::LoggerError>(())
//! ```

use super::{
    error::{LoggerError, Result},
    formatter::Formatter,
    handler::{Handler, Sink},
    log_level::LogLevel,
    logger::{EmitContext, ErrorPolicy, Logger},
    metrics::LoggerMetrics,
};
use crate::appenders::{ConsoleAppender, ConsoleStream, RotatingFileAppender, RotationPolicy};
use crate::config::{HandlerSpec, LoggerSpec, LoggingConfig, SinkSpec, ROOT_LOGGER};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

type WriterFactory = Arc<dyn Fn() -> Box<dyn Write + Send> + Send + Sync>;

/// Level of the root logger when the configuration does not declare one
const DEFAULT_ROOT_LEVEL: LogLevel = LogLevel::Warning;

/// Builder for [`Registry`] with options that are not part of the
/// declarative configuration
#[derive(Default)]
pub struct RegistryBuilder {
    base_dir: Option<PathBuf>,
    streams: HashMap<ConsoleStream, WriterFactory>,
    error_policy: ErrorPolicy,
    compress_backups: bool,
    #[cfg(feature = "console")]
    colors: bool,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative log file names against `dir` instead of the working
    /// directory
    #[must_use]
    pub fn base_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.base_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Send everything a console handler writes to `stream` into a clone of
    /// `writer` instead
    #[must_use]
    pub fn stream<W>(mut self, stream: ConsoleStream, writer: W) -> Self
    where
        W: Write + Send + Sync + Clone + 'static,
    {
        let factory: WriterFactory = Arc::new(move || Box::new(writer.clone()));
        self.streams.insert(stream, factory);
        self
    }

    #[must_use]
    pub fn error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    /// Gzip rotated backups of every rotating file handler
    #[must_use]
    pub fn compress_backups(mut self, enabled: bool) -> Self {
        self.compress_backups = enabled;
        self
    }

    /// Color console output by level
    #[cfg(feature = "console")]
    #[must_use]
    pub fn colors(mut self, enabled: bool) -> Self {
        self.colors = enabled;
        self
    }

    /// Build the registry
    ///
    /// The whole configuration is checked before any file is opened, so a
    /// configuration error never truncates an existing log.
    ///
    /// # Errors
    ///
    /// Configuration errors (see [`LoggerError::is_configuration_error`]) for
    /// invalid documents; I/O errors if a log file cannot be opened.
    pub fn build(self, config: &LoggingConfig) -> Result<Registry> {
        config.validate()?;

        let mut formatters = HashMap::with_capacity(config.formatters.len());
        for spec in &config.formatters {
            let formatter = Formatter::new(
                spec.name.as_str(),
                spec.format.as_deref(),
                spec.datefmt.as_deref(),
                spec.timezone,
            )?;
            formatters.insert(spec.name.clone(), Arc::new(formatter));
        }

        let parents = resolve_parents(config)?;

        // Nothing above touched the filesystem
        let default_formatter =
            Arc::new(Formatter::new("default", None, None, Default::default())?);
        let mut handlers = Vec::with_capacity(config.handlers.len());
        for spec in &config.handlers {
            let formatter = match &spec.formatter {
                Some(name) => formatters.get(name).cloned().ok_or_else(|| {
                    LoggerError::config(format!("handler '{}'", spec.name), "unknown formatter")
                })?,
                None => Arc::clone(&default_formatter),
            };
            let sink = self.open_sink(spec)?;
            handlers.push(Arc::new(Handler::new(
                spec.name.as_str(),
                spec.level.unwrap_or(LogLevel::Debug),
                formatter,
                sink,
            )));
        }

        let context = Arc::new(EmitContext::new(self.error_policy));
        let mut loggers = HashMap::with_capacity(config.loggers.len() + 1);

        let root = match config.loggers.iter().find(|spec| spec.is_root()) {
            Some(spec) => Logger::new(
                ROOT_LOGGER,
                Some(spec.level.unwrap_or(DEFAULT_ROOT_LEVEL)),
                bind_handlers(spec, &handlers),
                spec.propagate,
                None,
                Arc::clone(&context),
            ),
            None => Logger::new(
                ROOT_LOGGER,
                Some(DEFAULT_ROOT_LEVEL),
                Vec::new(),
                true,
                None,
                Arc::clone(&context),
            ),
        };
        loggers.insert(ROOT_LOGGER.to_string(), root.clone());

        // Parents first: a logger's effective level is fixed when it is created
        for spec in config.loggers.iter().filter(|spec| !spec.is_root()) {
            build_logger(spec, config, &parents, &handlers, &context, &mut loggers);
        }

        Ok(Registry {
            root,
            loggers,
            derived: RwLock::new(HashMap::new()),
            handlers,
            formatters,
            context,
        })
    }

    fn open_sink(&self, spec: &HandlerSpec) -> Result<Sink> {
        match &spec.sink {
            SinkSpec::Console { stream } => {
                let appender = match self.streams.get(stream) {
                    Some(factory) => ConsoleAppender::with_writer(*stream, factory()),
                    None => ConsoleAppender::with_stream(*stream),
                };
                #[cfg(feature = "console")]
                let appender = appender.with_colors(self.colors);
                Ok(appender.into())
            }
            SinkSpec::RotatingFile {
                filename,
                mode,
                max_bytes,
                backup_count,
                delay,
            } => {
                let path = match &self.base_dir {
                    Some(dir) if filename.is_relative() => dir.join(filename),
                    _ => filename.clone(),
                };
                let policy = RotationPolicy::new()
                    .with_max_size(*max_bytes)
                    .with_max_backups(*backup_count)
                    .with_compression(self.compress_backups);
                let appender = RotatingFileAppender::with_options(path, policy, *mode, *delay)?;
                Ok(appender.into())
            }
        }
    }
}

/// Map each configured logger to the name of its parent, rejecting cycles
fn resolve_parents(config: &LoggingConfig) -> Result<HashMap<String, String>> {
    let mut parents = HashMap::new();
    for spec in config.loggers.iter().filter(|spec| !spec.is_root()) {
        let parent = match &spec.parent {
            Some(parent) => parent.clone(),
            None => nearest_configured(&spec.name, |candidate| config.logger(candidate).is_some()),
        };
        parents.insert(spec.name.clone(), parent);
    }

    for start in parents.keys() {
        let mut seen = vec![start.as_str()];
        let mut current = start.as_str();
        while let Some(parent) = parents.get(current) {
            if seen.contains(&parent.as_str()) {
                return Err(LoggerError::config(
                    format!("logger '{}'", start),
                    format!(
                        "parent chain forms a cycle: {} -> {}",
                        seen.join(" -> "),
                        parent
                    ),
                ));
            }
            seen.push(parent);
            current = parent;
        }
    }

    Ok(parents)
}

/// Nearest dotted-name ancestor accepted by `is_configured`, or the root name
fn nearest_configured(name: &str, is_configured: impl Fn(&str) -> bool) -> String {
    let mut prefix = name;
    while let Some((parent, _)) = prefix.rsplit_once('.') {
        if is_configured(parent) {
            return parent.to_string();
        }
        prefix = parent;
    }
    ROOT_LOGGER.to_string()
}

fn bind_handlers(spec: &LoggerSpec, handlers: &[Arc<Handler>]) -> Vec<Arc<Handler>> {
    spec.handlers
        .iter()
        .filter_map(|name| handlers.iter().find(|h| h.name() == name).cloned())
        .collect()
}

fn build_logger(
    spec: &LoggerSpec,
    config: &LoggingConfig,
    parents: &HashMap<String, String>,
    handlers: &[Arc<Handler>],
    context: &Arc<EmitContext>,
    loggers: &mut HashMap<String, Logger>,
) -> Logger {
    if let Some(existing) = loggers.get(&spec.name) {
        return existing.clone();
    }

    let parent_name = parents.get(&spec.name).map_or(ROOT_LOGGER, String::as_str);
    let parent = match config.logger(parent_name) {
        Some(parent_spec) if !parent_spec.is_root() => {
            build_logger(parent_spec, config, parents, handlers, context, loggers)
        }
        _ => loggers[ROOT_LOGGER].clone(),
    };

    let logger = Logger::new(
        spec.name.as_str(),
        spec.level,
        bind_handlers(spec, handlers),
        spec.propagate,
        Some(parent),
        Arc::clone(context),
    );
    loggers.insert(spec.name.clone(), logger.clone());
    logger
}

/// Configured loggers, handlers and formatters of one application
///
/// The registry is an explicit value: build it at startup and hand it (or
/// the loggers taken from it) to each subsystem. Dropping the registry and
/// every logger handle closes the files.
pub struct Registry {
    root: Logger,
    loggers: HashMap<String, Logger>,
    /// Loggers handed out for names the configuration does not declare
    derived: RwLock<HashMap<String, Logger>>,
    handlers: Vec<Arc<Handler>>,
    formatters: HashMap<String, Arc<Formatter>>,
    context: Arc<EmitContext>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Build a registry with default builder options
    pub fn from_config(config: &LoggingConfig) -> Result<Self> {
        RegistryBuilder::new().build(config)
    }

    /// Read an INI configuration file and build a registry from it
    pub fn from_ini_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_config(&LoggingConfig::from_ini_file(path)?)
    }

    /// Logger with the given qualified name
    ///
    /// Never fails: an undeclared name yields a logger without its own level
    /// or handlers, attached to the nearest configured dotted-name ancestor
    /// (`a.b.c` tries `a.b`, then `a`, then the root). Repeated lookups of the
    /// same name return the same logger.
    pub fn get_logger(&self, name: &str) -> Logger {
        if name.is_empty() || name == ROOT_LOGGER {
            return self.root.clone();
        }
        if let Some(logger) = self.loggers.get(name) {
            return logger.clone();
        }
        if let Some(logger) = self.derived.read().get(name) {
            return logger.clone();
        }

        let mut derived = self.derived.write();
        derived
            .entry(name.to_string())
            .or_insert_with(|| {
                let parent_name =
                    nearest_configured(name, |candidate| self.loggers.contains_key(candidate));
                let parent = self
                    .loggers
                    .get(&parent_name)
                    .cloned()
                    .unwrap_or_else(|| self.root.clone());
                Logger::new(
                    name,
                    None,
                    Vec::new(),
                    true,
                    Some(parent),
                    Arc::clone(&self.context),
                )
            })
            .clone()
    }

    pub fn root(&self) -> &Logger {
        &self.root
    }

    /// True if `name` is declared by the configuration (the root always is)
    pub fn is_configured(&self, name: &str) -> bool {
        self.loggers.contains_key(name)
    }

    /// Names of the configured loggers, sorted
    pub fn logger_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.loggers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn handler(&self, name: &str) -> Option<&Arc<Handler>> {
        self.handlers.iter().find(|h| h.name() == name)
    }

    pub fn handlers(&self) -> &[Arc<Handler>] {
        &self.handlers
    }

    pub fn formatter(&self, name: &str) -> Option<&Arc<Formatter>> {
        self.formatters.get(name)
    }

    pub fn metrics(&self) -> &LoggerMetrics {
        &self.context.metrics
    }

    pub fn error_policy(&self) -> ErrorPolicy {
        self.context.error_policy
    }

    /// Rollovers performed by all rotating file handlers
    pub fn rotation_count(&self) -> u64 {
        self.handlers.iter().map(|h| h.rotation_count()).sum()
    }

    /// Flush every handler, returning the first failure
    pub fn flush(&self) -> Result<()> {
        let mut first_failure = None;
        for handler in &self.handlers {
            if let Err(e) = handler.flush() {
                first_failure.get_or_insert(LoggerError::handler_failed(handler.name(), e));
            }
        }
        first_failure.map_or(Ok(()), Err)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("loggers", &self.logger_names())
            .field(
                "handlers",
                &self.handlers.iter().map(|h| h.name()).collect::<Vec<_>>(),
            )
            .field("error_policy", &self.context.error_policy)
            .finish()
    }
}
