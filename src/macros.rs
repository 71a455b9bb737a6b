//! Logging macros for ergonomic record emission.
//!
//! Unlike the plain [`Logger`](crate::Logger) methods, the macros also
//! capture the calling function name for `%(funcName)s`. Each macro
//! evaluates to the `Result` returned by [`Logger::log_at`](crate::Logger::log_at).
//!
//! # Examples
//!
//! ```
//! use logging_registry::prelude::*;
//! use logging_registry::info;
//!
//! let registry = Registry::from_config(&LoggingConfig::default()).unwrap();
//! let logger = registry.get_logger("partitioning");
//!
//! let shards = 8;
//! info!(logger, "Writing {} shards", shards).unwrap();
//! ```

/// Name of the enclosing function, without its module path.
#[doc(hidden)]
#[macro_export]
macro_rules! function_name {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            ::std::any::type_name::<T>()
        }
        $crate::core::log_record::short_function_name(type_name_of(f))
    }};
}

/// The current file, line and function as a [`Callsite`](crate::Callsite).
#[macro_export]
macro_rules! callsite {
    () => {
        $crate::Callsite::new(file!(), line!(), Some($crate::function_name!()))
    };
}

/// Log a message at the given level with automatic formatting.
///
/// # Examples
///
/// ```
/// # use logging_registry::prelude::*;
/// # let registry = Registry::from_config(&LoggingConfig::default()).unwrap();
/// # let logger = registry.get_logger("app");
/// use logging_registry::log;
/// log!(logger, LogLevel::Warning, "Simple message").unwrap();
/// log!(logger, LogLevel::Error, "Error code: {}", 500).unwrap();
/// ```
#[macro_export]
macro_rules! log {
    ($logger:expr, $level:expr, $($arg:tt)+) => {
        $logger.log_at($level, &format!($($arg)+), $crate::callsite!())
    };
}

/// Log a debug-level message.
#[macro_export]
macro_rules! debug {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::LogLevel::Debug, $($arg)+)
    };
}

/// Log an info-level message.
#[macro_export]
macro_rules! info {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::LogLevel::Info, $($arg)+)
    };
}

/// Log a warning-level message.
///
/// # Examples
///
/// ```
/// # use logging_registry::prelude::*;
/// # let registry = Registry::from_config(&LoggingConfig::default()).unwrap();
/// # let logger = registry.get_logger("app");
/// use logging_registry::warning;
/// warning!(logger, "Retry attempt {} of {}", 3, 5).unwrap();
/// ```
#[macro_export]
macro_rules! warning {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::LogLevel::Warning, $($arg)+)
    };
}

/// Log an error-level message.
#[macro_export]
macro_rules! error {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::LogLevel::Error, $($arg)+)
    };
}

/// Log a critical-level message.
#[macro_export]
macro_rules! critical {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::LogLevel::Critical, $($arg)+)
    };
}

#[cfg(test)]
mod tests {
    use crate::appenders::{ConsoleStream, SharedBuffer};
    use crate::config::LoggingConfig;
    use crate::core::{LogLevel, Registry};

    const CONFIG: &str = "
[loggers]
keys=root

[handlers]
keys=capture

[formatters]
keys=func

[logger_root]
level=DEBUG
handlers=capture

[handler_capture]
class=StreamHandler
level=DEBUG
formatter=func
args=(sys.stdout,)

[formatter_func]
format=%(levelname)s %(funcName)s %(message)s
";

    fn capture_registry() -> (Registry, SharedBuffer) {
        let buffer = SharedBuffer::new();
        let config = LoggingConfig::from_ini_str(CONFIG).unwrap();
        let registry = Registry::builder()
            .stream(ConsoleStream::Stdout, buffer.clone())
            .build(&config)
            .unwrap();
        (registry, buffer)
    }

    #[test]
    fn test_macros_capture_function_name() {
        let (registry, buffer) = capture_registry();
        let logger = registry.root();

        debug!(logger, "Debug message").unwrap();
        info!(logger, "Items: {}", 100).unwrap();
        warning!(logger, "Retry {} of {}", 1, 3).unwrap();
        error!(logger, "Code: {}", 500).unwrap();
        critical!(logger, "Critical failure: {}", "system").unwrap();
        log!(logger, LogLevel::Info, "Formatted: {}", 42).unwrap();

        assert_eq!(
            buffer.lines(),
            vec![
                "DEBUG test_macros_capture_function_name Debug message",
                "INFO test_macros_capture_function_name Items: 100",
                "WARNING test_macros_capture_function_name Retry 1 of 3",
                "ERROR test_macros_capture_function_name Code: 500",
                "CRITICAL test_macros_capture_function_name Critical failure: system",
                "INFO test_macros_capture_function_name Formatted: 42",
            ]
        );
    }

    #[test]
    fn test_function_name_inside_closure() {
        let (registry, buffer) = capture_registry();
        let logger = registry.root();

        let emit = || info!(logger, "from closure");
        emit().unwrap();

        assert_eq!(
            buffer.lines(),
            vec!["INFO test_function_name_inside_closure from closure"]
        );
    }

    #[test]
    fn test_method_without_macro_has_unknown_function() {
        let (registry, buffer) = capture_registry();
        registry.root().info("plain").unwrap();
        assert_eq!(buffer.lines(), vec!["INFO <unknown> plain"]);
    }
}
