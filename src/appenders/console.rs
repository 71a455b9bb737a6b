//! Console appender implementation

use crate::core::{Appender, LogLevel, Result};
#[cfg(feature = "console")]
use colored::Colorize;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::Arc;

/// Standard stream a console sink writes to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleStream {
    #[default]
    Stderr,
    Stdout,
}

impl ConsoleStream {
    /// Parse the stream reference used in handler arguments (`sys.stderr`)
    pub fn from_reference(reference: &str) -> Option<Self> {
        match reference.trim() {
            "sys.stderr" | "stderr" => Some(ConsoleStream::Stderr),
            "sys.stdout" | "stdout" => Some(ConsoleStream::Stdout),
            _ => None,
        }
    }

    fn open(self) -> Box<dyn Write + Send> {
        match self {
            ConsoleStream::Stderr => Box::new(std::io::stderr()),
            ConsoleStream::Stdout => Box::new(std::io::stdout()),
        }
    }
}

/// In-memory writer that can stand in for a console stream
///
/// Clones share one buffer, so a clone handed to a registry can be read back
/// by the caller.
///
/// ```
/// use logging_registry::appenders::SharedBuffer;
/// use std::io::Write;
///
/// let buffer = SharedBuffer::new();
/// let mut writer = buffer.clone();
/// writeln!(writer, "captured").unwrap();
/// assert_eq!(buffer.contents(), "captured\n");
/// ```
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.inner.lock()).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(String::from).collect()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

pub struct ConsoleAppender {
    stream: ConsoleStream,
    writer: Box<dyn Write + Send>,
    use_colors: bool,
}

impl ConsoleAppender {
    pub fn new() -> Self {
        Self::with_stream(ConsoleStream::Stderr)
    }

    pub fn with_stream(stream: ConsoleStream) -> Self {
        Self {
            stream,
            writer: stream.open(),
            use_colors: false,
        }
    }

    /// Write to an arbitrary writer in place of the real stream
    pub fn with_writer(stream: ConsoleStream, writer: Box<dyn Write + Send>) -> Self {
        Self {
            stream,
            writer,
            use_colors: false,
        }
    }

    /// Color each line by severity
    #[cfg(feature = "console")]
    #[must_use]
    pub fn with_colors(mut self, use_colors: bool) -> Self {
        self.use_colors = use_colors;
        self
    }

    pub fn stream(&self) -> ConsoleStream {
        self.stream
    }

    #[cfg(feature = "console")]
    fn decorate(&self, level: LogLevel, line: &str) -> String {
        if self.use_colors {
            line.color(level.color_code()).to_string()
        } else {
            line.to_string()
        }
    }

    #[cfg(not(feature = "console"))]
    fn decorate(&self, _level: LogLevel, line: &str) -> String {
        line.to_string()
    }
}

impl Default for ConsoleAppender {
    fn default() -> Self {
        Self::new()
    }
}

impl Appender for ConsoleAppender {
    fn append(&mut self, level: LogLevel, line: &str) -> Result<()> {
        let output = self.decorate(level, line);
        writeln!(self.writer, "{}", output)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    fn name(&self) -> &str {
        "console"
    }
}
