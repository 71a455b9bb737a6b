//! Sink implementations

pub mod console;
pub mod rotating_file;

pub use console::{ConsoleAppender, ConsoleStream, SharedBuffer};
pub use rotating_file::{FileMode, RotatingFileAppender, RotationPolicy};

pub use crate::core::Appender;
