//! Error types for the logging registry

pub type Result<T> = std::result::Result<T, LoggerError>;

#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    /// IO error with context
    #[error("IO error while {operation}: {message}")]
    IoOperation {
        operation: String,
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Generic IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON configuration error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Invalid configuration with details
    #[error("Invalid configuration for {component}: {message}")]
    InvalidConfiguration { component: String, message: String },

    /// Malformed configuration document
    #[error("Configuration syntax error at line {line}: {message}")]
    ConfigSyntax { line: usize, message: String },

    /// File sink error with path
    #[error("File appender error for '{path}': {message}")]
    FileAppenderError { path: String, message: String },

    /// File rotation error
    #[error("File rotation failed for '{path}': {message}")]
    FileRotationError { path: String, message: String },

    /// Formatter error with formatter name
    #[error("Formatter error ({formatter}): {message}")]
    FormatterError { formatter: String, message: String },

    /// A handler failed while emitting a record
    #[error("Handler '{handler}' failed: {source}")]
    HandlerFailed {
        handler: String,
        #[source]
        source: Box<LoggerError>,
    },

    /// Writer error (generic)
    #[error("Writer error: {0}")]
    WriterError(String),
}

impl LoggerError {
    /// Create an IO operation error with context
    pub fn io_operation(
        operation: impl Into<String>,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        LoggerError::IoOperation {
            operation: operation.into(),
            message: message.into(),
            source,
        }
    }

    /// Create an invalid configuration error
    pub fn config(component: impl Into<String>, message: impl Into<String>) -> Self {
        LoggerError::InvalidConfiguration {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Create a configuration syntax error
    pub fn syntax(line: usize, message: impl Into<String>) -> Self {
        LoggerError::ConfigSyntax {
            line,
            message: message.into(),
        }
    }

    /// Create a file appender error
    pub fn file_appender(path: impl Into<String>, message: impl Into<String>) -> Self {
        LoggerError::FileAppenderError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a file rotation error
    pub fn file_rotation(path: impl Into<String>, message: impl Into<String>) -> Self {
        LoggerError::FileRotationError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a formatter error
    pub fn formatter(formatter: impl Into<String>, message: impl Into<String>) -> Self {
        LoggerError::FormatterError {
            formatter: formatter.into(),
            message: message.into(),
        }
    }

    /// Wrap an error raised by a named handler
    pub fn handler_failed(handler: impl Into<String>, source: LoggerError) -> Self {
        LoggerError::HandlerFailed {
            handler: handler.into(),
            source: Box::new(source),
        }
    }

    /// Create a writer error (generic)
    pub fn writer<S: Into<String>>(msg: S) -> Self {
        LoggerError::WriterError(msg.into())
    }

    /// True for errors raised while building a registry from configuration
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            LoggerError::InvalidConfiguration { .. }
                | LoggerError::ConfigSyntax { .. }
                | LoggerError::FormatterError { .. }
                | LoggerError::JsonError(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = LoggerError::config("handler_console", "unknown formatter 'plain'");
        assert!(matches!(err, LoggerError::InvalidConfiguration { .. }));
        assert!(err.is_configuration_error());

        let err = LoggerError::file_appender("/var/log/app.log", "Permission denied");
        assert!(matches!(err, LoggerError::FileAppenderError { .. }));
        assert!(!err.is_configuration_error());
    }

    #[test]
    fn test_error_display() {
        let err = LoggerError::syntax(7, "expected '=' or ':'");
        assert_eq!(
            err.to_string(),
            "Configuration syntax error at line 7: expected '=' or ':'"
        );

        let err = LoggerError::file_rotation("/var/log/app.log", "Disk full");
        assert_eq!(
            err.to_string(),
            "File rotation failed for '/var/log/app.log': Disk full"
        );

        let err = LoggerError::formatter("verbose", "unknown field 'lvl'");
        assert_eq!(
            err.to_string(),
            "Formatter error (verbose): unknown field 'lvl'"
        );
    }

    #[test]
    fn test_handler_failed_keeps_source() {
        use std::error::Error;

        let inner = LoggerError::writer("stream closed");
        let err = LoggerError::handler_failed("console", inner);
        assert_eq!(
            err.to_string(),
            "Handler 'console' failed: Writer error: stream closed"
        );
        assert!(err.source().is_some());
    }

    #[test]
    fn test_io_operation_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = LoggerError::io_operation("reading configuration", "cannot open file", io_err);

        assert!(matches!(err, LoggerError::IoOperation { .. }));
        assert!(err.to_string().contains("reading configuration"));
        assert!(err.to_string().contains("cannot open file"));
    }
}
