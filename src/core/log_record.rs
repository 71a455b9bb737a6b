//! Log record captured at the emission call site

use super::log_level::LogLevel;
use chrono::{DateTime, Utc};
use std::cell::RefCell;
use std::panic::Location;

// Thread-local caches for thread information to avoid repeated allocations
thread_local! {
    static THREAD_ID_CACHE: RefCell<Option<u64>> = const { RefCell::new(None) };
    static THREAD_NAME_CACHE: RefCell<Option<Option<String>>> = const { RefCell::new(None) };
}

/// Numeric id of the current thread, computed once per thread
///
/// `ThreadId` only exposes its number through `Debug` (`ThreadId(7)`).
fn get_thread_id() -> u64 {
    THREAD_ID_CACHE.with(|cache| {
        *cache.borrow_mut().get_or_insert_with(|| {
            format!("{:?}", std::thread::current().id())
                .chars()
                .filter(char::is_ascii_digit)
                .collect::<String>()
                .parse()
                .unwrap_or(0)
        })
    })
}

/// Get cached thread name, computing and caching it on first access
fn get_thread_name() -> Option<String> {
    THREAD_NAME_CACHE.with(|cache| {
        cache
            .borrow_mut()
            .get_or_insert_with(|| std::thread::current().name().map(String::from))
            .clone()
    })
}

/// Reduce a `type_name` path of a nested item to its enclosing function name
///
/// `app::stages::load_rows::f` becomes `load_rows`; closure frames are skipped.
#[doc(hidden)]
pub fn short_function_name(path: &'static str) -> &'static str {
    let mut path = path.strip_suffix("::f").unwrap_or(path);
    while let Some(outer) = path.strip_suffix("::{{closure}}") {
        path = outer;
    }
    path.rsplit("::").next().unwrap_or(path)
}

/// Source location of an emission call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Callsite {
    pub file: &'static str,
    pub line: u32,
    pub function: Option<&'static str>,
}

impl Callsite {
    pub const fn new(file: &'static str, line: u32, function: Option<&'static str>) -> Self {
        Self {
            file,
            line,
            function,
        }
    }
}

impl From<&'static Location<'static>> for Callsite {
    fn from(location: &'static Location<'static>) -> Self {
        Self::new(location.file(), location.line(), None)
    }
}

#[derive(Debug, Clone)]
pub struct LogRecord {
    pub logger: String,
    pub level: LogLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub pathname: String,
    pub line: u32,
    pub function: Option<String>,
    pub process_id: u32,
    pub thread_id: u64,
    pub thread_name: Option<String>,
}

impl LogRecord {
    /// Escape newlines, carriage returns and tabs so one record stays one line
    /// and cannot forge additional records.
    fn sanitize_message(message: &str) -> String {
        message
            .replace('\n', "\\n")
            .replace('\r', "\\r")
            .replace('\t', "\\t")
    }

    pub fn new(
        logger: impl Into<String>,
        level: LogLevel,
        message: &str,
        callsite: Callsite,
    ) -> Self {
        Self {
            logger: logger.into(),
            level,
            message: Self::sanitize_message(message),
            timestamp: Utc::now(),
            pathname: callsite.file.to_string(),
            line: callsite.line,
            function: callsite.function.map(String::from),
            process_id: std::process::id(),
            thread_id: get_thread_id(),
            thread_name: get_thread_name(),
        }
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Final path component of the source file
    pub fn filename(&self) -> &str {
        self.pathname
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.pathname)
    }

    /// Source file name without extension
    pub fn module(&self) -> &str {
        let filename = self.filename();
        filename
            .rsplit_once('.')
            .map_or(filename, |(stem, _)| stem)
    }

    pub fn function_name(&self) -> &str {
        self.function.as_deref().unwrap_or("<unknown>")
    }

    pub fn thread_label(&self) -> String {
        self.thread_name
            .clone()
            .unwrap_or_else(|| format!("Thread-{}", self.thread_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(message: &str) -> LogRecord {
        LogRecord::new(
            "preprocessing",
            LogLevel::Info,
            message,
            Callsite::new("src/stages/tokenize.rs", 42, Some("tokenize")),
        )
    }

    #[test]
    fn test_message_sanitized() {
        let rec = record("first\nERROR forged\tline\r");
        assert_eq!(rec.message, "first\\nERROR forged\\tline\\r");
    }

    #[test]
    fn test_location_fields() {
        let rec = record("hello");
        assert_eq!(rec.filename(), "tokenize.rs");
        assert_eq!(rec.module(), "tokenize");
        assert_eq!(rec.line, 42);
        assert_eq!(rec.function_name(), "tokenize");
    }

    #[test]
    fn test_windows_path_filename() {
        let rec = LogRecord::new(
            "root",
            LogLevel::Warning,
            "x",
            Callsite::new("src\\bin\\main.rs", 1, None),
        );
        assert_eq!(rec.filename(), "main.rs");
        assert_eq!(rec.function_name(), "<unknown>");
    }

    #[test]
    fn test_thread_id_stable_per_thread() {
        let a = record("a").thread_id;
        let b = record("b").thread_id;
        assert_eq!(a, b);
        assert!(a > 0);

        let other = std::thread::spawn(|| record("c").thread_id).join().unwrap();
        assert_ne!(a, other);
    }

    #[test]
    fn test_short_function_name() {
        assert_eq!(
            short_function_name("app::stages::load_rows::f"),
            "load_rows"
        );
        assert_eq!(
            short_function_name("app::main::{{closure}}::{{closure}}::f"),
            "main"
        );
        assert_eq!(short_function_name("main::f"), "main");
    }

    #[test]
    fn test_process_id() {
        assert_eq!(record("p").process_id, std::process::id());
    }
}
