//! Rotating file appender with size-based rollover
//!
//! The active file is `<name>`; rotated backups are `<name>.1` (newest) up to
//! `<name>.N` (oldest), or `<name>.i.gz` when compression is enabled.

use crate::core::appender::Appender;
use crate::core::error::{LoggerError, Result};
use crate::core::log_level::LogLevel;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// How the active file is opened at construction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileMode {
    /// `'w'`: existing contents are destroyed
    #[serde(rename = "w")]
    Truncate,
    /// `'a'`: new records are added after existing contents
    #[default]
    #[serde(rename = "a")]
    Append,
}

impl FileMode {
    /// Parse an open-mode string (`"w"` or `"a"`)
    pub fn from_mode_str(mode: &str) -> Option<Self> {
        match mode {
            "w" => Some(FileMode::Truncate),
            "a" => Some(FileMode::Append),
            _ => None,
        }
    }

    fn open(self, path: &Path) -> std::io::Result<File> {
        let mut options = OpenOptions::new();
        options.create(true);
        match self {
            FileMode::Truncate => options.write(true).truncate(true),
            FileMode::Append => options.append(true),
        };
        options.open(path)
    }
}

/// Rollover configuration for a rotating file appender
///
/// Rollover happens only when both `max_bytes` and `max_backup_files` are
/// non-zero.
///
/// # Examples
///
/// ```
/// use logging_registry::appenders::RotationPolicy;
///
/// let policy = RotationPolicy::new()
///     .with_max_size(10_000_000)
///     .with_max_backups(5);
/// assert!(policy.is_enabled());
///
/// assert!(!RotationPolicy::never().is_enabled());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationPolicy {
    /// Largest size in bytes the active file may reach
    pub max_bytes: u64,
    /// Maximum number of rotated files to keep
    pub max_backup_files: usize,
    /// Whether to gzip rotated files
    pub compress: bool,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            max_backup_files: 5,
            compress: false,
        }
    }
}

impl RotationPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy that never rolls over
    #[must_use]
    pub fn never() -> Self {
        Self {
            max_bytes: 0,
            max_backup_files: 0,
            compress: false,
        }
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_max_size(mut self, size: u64) -> Self {
        self.max_bytes = size;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_max_backups(mut self, count: usize) -> Self {
        self.max_backup_files = count;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compress = enabled;
        self
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.max_bytes > 0 && self.max_backup_files > 0
    }
}

/// Rotating file sink
///
/// # Examples
///
/// ```no_run
/// use logging_registry::appenders::{FileMode, RotatingFileAppender, RotationPolicy};
///
/// let policy = RotationPolicy::new().with_max_size(10_000_000).with_max_backups(5);
/// let appender =
///     RotatingFileAppender::with_options("preprocessing.log", policy, FileMode::Truncate, false)
///         .unwrap();
/// ```
pub struct RotatingFileAppender {
    base_path: PathBuf,
    policy: RotationPolicy,
    mode: FileMode,
    writer: Option<BufWriter<File>>,
    current_size: u64,
    /// Set once the active file has been opened (immediately unless delayed)
    opened: bool,
    /// Counter for consecutive deletion failures (reset on successful deletion)
    deletion_failure_count: usize,
    rotations: u64,
}

impl RotatingFileAppender {
    /// Open `path` in append mode with the default policy
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be created or opened
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::with_policy(path, RotationPolicy::default())
    }

    /// Open `path` in append mode with a custom policy
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be created or opened
    pub fn with_policy<P: AsRef<Path>>(path: P, policy: RotationPolicy) -> Result<Self> {
        Self::with_options(path, policy, FileMode::Append, false)
    }

    /// Create an appender with every option spelled out
    ///
    /// Unless `delay` is set the file is opened (and, in [`FileMode::Truncate`],
    /// emptied) before this returns.
    ///
    /// # Errors
    ///
    /// Returns error if the parent directory or file cannot be created
    pub fn with_options<P: AsRef<Path>>(
        path: P,
        policy: RotationPolicy,
        mode: FileMode,
        delay: bool,
    ) -> Result<Self> {
        let mut appender = Self {
            base_path: path.as_ref().to_path_buf(),
            policy,
            mode,
            writer: None,
            current_size: 0,
            opened: false,
            deletion_failure_count: 0,
            rotations: 0,
        };
        if !delay {
            appender.open_active()?;
        }
        Ok(appender)
    }

    fn open_active(&mut self) -> Result<()> {
        if let Some(parent) = self
            .base_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
        {
            fs::create_dir_all(parent).map_err(|e| {
                LoggerError::io_operation(
                    "create log directory",
                    format!("Failed to create directory '{}'", parent.display()),
                    e,
                )
            })?;
        }

        let file = self.mode.open(&self.base_path).map_err(|e| {
            LoggerError::file_appender(
                self.base_path.display().to_string(),
                format!("Failed to open: {}", e),
            )
        })?;

        let metadata = file.metadata().map_err(|e| {
            LoggerError::file_appender(
                self.base_path.display().to_string(),
                format!("Cannot access file metadata: {}", e),
            )
        })?;

        self.current_size = metadata.len();
        self.writer = Some(BufWriter::new(file));
        self.opened = true;
        Ok(())
    }

    /// True if writing `incoming` more bytes would push a non-empty file past
    /// the size limit
    fn should_rotate(&self, incoming: u64) -> bool {
        self.policy.is_enabled()
            && self.current_size > 0
            && self.current_size + incoming > self.policy.max_bytes
    }

    fn rotate(&mut self) -> Result<()> {
        // Release the file handle before renaming
        if let Some(mut writer) = self.writer.take() {
            writer.flush().map_err(|e| {
                LoggerError::file_rotation(
                    self.base_path.display().to_string(),
                    format!("Failed to flush before rotation: {}", e),
                )
            })?;
        }

        let max_backups = self.policy.max_backup_files;
        const MAX_DELETION_FAILURES: usize = 5;
        let mut deletion_failed = false;

        let oldest = self.backup_path(max_backups);
        for candidate in [gz_path(&oldest), oldest] {
            if candidate.exists() {
                if let Err(e) = fs::remove_file(&candidate) {
                    deletion_failed = true;
                    eprintln!(
                        "[WARN] Failed to remove oldest backup {}: {} (failure #{}/{})",
                        candidate.display(),
                        e,
                        self.deletion_failure_count + 1,
                        MAX_DELETION_FAILURES
                    );
                }
            }
        }

        if deletion_failed {
            self.deletion_failure_count += 1;
            if self.deletion_failure_count >= MAX_DELETION_FAILURES {
                return Err(LoggerError::file_rotation(
                    self.base_path.display().to_string(),
                    format!(
                        "Rotation aborted: failed to delete old backup files {} consecutive times",
                        self.deletion_failure_count
                    ),
                ));
            }
        } else {
            self.deletion_failure_count = 0;
        }

        for i in (1..max_backups).rev() {
            let old_path = self.backup_path(i);
            let new_path = self.backup_path(i + 1);
            for (from, to) in [(gz_path(&old_path), gz_path(&new_path)), (old_path, new_path)] {
                if from.exists() {
                    rename_replacing(&from, &to)?;
                }
            }
        }

        let first_backup = self.backup_path(1);
        if self.base_path.exists() {
            rename_replacing(&self.base_path, &first_backup)?;
            if self.policy.compress {
                compress_file(&first_backup)?;
            }
        }

        let file = FileMode::Truncate.open(&self.base_path).map_err(|e| {
            LoggerError::file_rotation(
                self.base_path.display().to_string(),
                format!("Failed to create new log file: {}", e),
            )
        })?;

        self.writer = Some(BufWriter::new(file));
        self.current_size = 0;
        self.rotations += 1;

        Ok(())
    }

    /// Backup file path for a given index (`app.log` -> `app.log.3`)
    pub fn backup_path(&self, index: usize) -> PathBuf {
        let mut path = self.base_path.clone();
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("app.log")
            .to_string();
        path.set_file_name(format!("{}.{}", filename, index));
        path
    }

    /// Bytes written to the active file, including contents kept in append mode
    #[must_use]
    pub fn current_size(&self) -> u64 {
        self.current_size
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.base_path
    }

    #[must_use]
    pub fn policy(&self) -> &RotationPolicy {
        &self.policy
    }

    #[must_use]
    pub fn mode(&self) -> FileMode {
        self.mode
    }

    /// Number of rollovers performed since construction
    #[must_use]
    pub fn rotation_count(&self) -> u64 {
        self.rotations
    }

    /// Recover after a failed rotation by reopening the active file in append mode
    fn reopen_after_failure(&mut self) -> Result<()> {
        let file = FileMode::Append.open(&self.base_path).map_err(|e| {
            LoggerError::file_appender(
                self.base_path.display().to_string(),
                format!("Failed to reopen after rotation failure: {}", e),
            )
        })?;
        self.writer = Some(BufWriter::new(file));
        Ok(())
    }
}

impl Appender for RotatingFileAppender {
    fn name(&self) -> &str {
        "RotatingFileAppender"
    }

    fn append(&mut self, _level: LogLevel, line: &str) -> Result<()> {
        if !self.opened {
            self.open_active()?;
        }

        let bytes_written = line.len() as u64 + 1;

        if self.should_rotate(bytes_written) {
            if let Err(e) = self.rotate() {
                // Keep the record: continue with the current file
                eprintln!(
                    "[WARN] Log rotation failed: {}. Continuing with current file.",
                    e
                );

                if self.writer.is_none() {
                    if let Err(reopen_err) = self.reopen_after_failure() {
                        eprintln!(
                            "[ERROR] Failed to reopen log file after rotation failure: {}",
                            reopen_err
                        );
                        return Err(e);
                    }
                }

                // Avoid retrying the rotation on every record
                self.current_size = 0;
            }
        }

        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| LoggerError::writer("Writer not initialized"))?;
        writer
            .write_all(line.as_bytes())
            .and_then(|()| writer.write_all(b"\n"))
            .map_err(|e| {
                LoggerError::file_appender(
                    self.base_path.display().to_string(),
                    format!("Failed to write log entry: {}", e),
                )
            })?;
        self.current_size += bytes_written;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(ref mut writer) = self.writer {
            writer.flush().map_err(|e| {
                LoggerError::file_appender(
                    self.base_path.display().to_string(),
                    format!("Failed to flush: {}", e),
                )
            })?;
        }
        Ok(())
    }
}

impl Drop for RotatingFileAppender {
    fn drop(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.flush();
        }
    }
}

fn gz_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".gz");
    PathBuf::from(name)
}

/// Rename, falling back to remove-then-rename on platforms where rename
/// refuses to replace an existing destination
fn rename_replacing(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    if to.exists() {
        let _ = fs::remove_file(to);
    }
    fs::rename(from, to).map_err(|e| {
        LoggerError::file_rotation(
            from.display().to_string(),
            format!("Failed to rename to '{}': {}", to.display(), e),
        )
    })
}

/// Gzip `path` into `path.gz`, removing the original only after the
/// compressed file is complete
fn compress_file(path: &Path) -> Result<()> {
    use std::io::{BufReader, Read};

    let gz = gz_path(path);
    let mut temp_name = gz.as_os_str().to_os_string();
    temp_name.push(".tmp");
    let temp_gz = PathBuf::from(temp_name);

    let io_err = |message: String, e: std::io::Error| {
        LoggerError::io_operation("compress log file", message, e)
    };

    let input = File::open(path).map_err(|e| {
        io_err(
            format!("Failed to open file for compression: {}", path.display()),
            e,
        )
    })?;
    let mut reader = BufReader::with_capacity(64 * 1024, input);

    let output = File::create(&temp_gz).map_err(|e| {
        io_err(
            format!("Failed to create temporary compressed file: {}", temp_gz.display()),
            e,
        )
    })?;
    let mut encoder = flate2::write::GzEncoder::new(
        BufWriter::with_capacity(64 * 1024, output),
        flate2::Compression::default(),
    );

    let mut buffer = vec![0u8; 64 * 1024];
    let streamed = loop {
        match reader.read(&mut buffer) {
            Ok(0) => break encoder.finish().and_then(|mut w| w.flush()),
            Ok(n) => {
                if let Err(e) = encoder.write_all(&buffer[..n]) {
                    break Err(e);
                }
            }
            Err(e) => break Err(e),
        }
    };
    if let Err(e) = streamed {
        let _ = fs::remove_file(&temp_gz);
        return Err(io_err(format!("Failed to compress {}", path.display()), e));
    }

    fs::rename(&temp_gz, &gz).map_err(|e| {
        let _ = fs::remove_file(&temp_gz);
        io_err(
            format!("Failed to rename compressed file to: {}", gz.display()),
            e,
        )
    })?;

    if let Err(e) = fs::remove_file(path) {
        eprintln!(
            "[WARN] Compression succeeded but failed to remove original file {}: {}",
            path.display(),
            e
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::tempdir;

    fn write_lines(appender: &mut RotatingFileAppender, count: usize) {
        for i in 0..count {
            appender
                .append(LogLevel::Info, &format!("record number {:04}", i))
                .unwrap();
        }
        appender.flush().unwrap();
    }

    fn count_files(dir: &Path, prefix: &str) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_str().unwrap().starts_with(prefix))
            .count()
    }

    #[test]
    fn test_policy_builder() {
        let policy = RotationPolicy::new()
            .with_max_size(1024)
            .with_max_backups(3)
            .with_compression(true);

        assert_eq!(policy.max_bytes, 1024);
        assert_eq!(policy.max_backup_files, 3);
        assert!(policy.compress);
        assert!(policy.is_enabled());
        assert!(!RotationPolicy::new().with_max_backups(0).is_enabled());
        assert!(!RotationPolicy::new().with_max_size(0).is_enabled());
    }

    #[test]
    fn test_file_mode_parse() {
        assert_eq!(FileMode::from_mode_str("w"), Some(FileMode::Truncate));
        assert_eq!(FileMode::from_mode_str("a"), Some(FileMode::Append));
        assert_eq!(FileMode::from_mode_str("x"), None);
    }

    #[test]
    fn test_truncate_mode_empties_file_at_construction() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("preprocessing.log");
        fs::write(&log_path, "stale contents\n").unwrap();

        let appender = RotatingFileAppender::with_options(
            &log_path,
            RotationPolicy::never(),
            FileMode::Truncate,
            false,
        )
        .unwrap();

        assert_eq!(appender.current_size(), 0);
        assert_eq!(fs::read_to_string(&log_path).unwrap(), "");
    }

    #[test]
    fn test_append_mode_keeps_contents() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("keep.log");
        fs::write(&log_path, "old\n").unwrap();

        let mut appender = RotatingFileAppender::new(&log_path).unwrap();
        assert_eq!(appender.current_size(), 4);
        appender.append(LogLevel::Info, "new").unwrap();
        appender.flush().unwrap();

        assert_eq!(fs::read_to_string(&log_path).unwrap(), "old\nnew\n");
    }

    #[test]
    fn test_delay_postpones_open() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("nested").join("delayed.log");

        let mut appender = RotatingFileAppender::with_options(
            &log_path,
            RotationPolicy::never(),
            FileMode::Truncate,
            true,
        )
        .unwrap();
        assert!(!log_path.exists());

        appender.append(LogLevel::Debug, "first").unwrap();
        appender.flush().unwrap();
        assert_eq!(fs::read_to_string(&log_path).unwrap(), "first\n");
    }

    #[test]
    fn test_active_file_never_exceeds_limit() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("bounded.log");
        // each line is "record number NNNN\n" = 19 bytes
        let policy = RotationPolicy::new().with_max_size(100).with_max_backups(3);
        let mut appender = RotatingFileAppender::with_policy(&log_path, policy).unwrap();

        write_lines(&mut appender, 20);

        assert!(fs::metadata(&log_path).unwrap().len() <= 100);
        assert!(appender.backup_path(1).exists());
        assert_eq!(fs::metadata(appender.backup_path(1)).unwrap().len(), 95);
    }

    #[test]
    fn test_backups_capped_at_retention_count() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("multi.log");
        let policy = RotationPolicy::new().with_max_size(50).with_max_backups(2);
        let mut appender = RotatingFileAppender::with_policy(&log_path, policy).unwrap();

        write_lines(&mut appender, 100);

        assert_eq!(count_files(dir.path(), "multi.log"), 3);
        assert!(appender.backup_path(2).exists());
        assert!(!appender.backup_path(3).exists());
        assert!(appender.rotation_count() > 2);
    }

    #[test]
    fn test_newest_backup_is_index_one() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("order.log");
        // "record number NNNN\n" fits once per 19-byte file
        let policy = RotationPolicy::new().with_max_size(19).with_max_backups(5);
        let mut appender = RotatingFileAppender::with_policy(&log_path, policy).unwrap();

        write_lines(&mut appender, 4);

        assert_eq!(
            fs::read_to_string(&log_path).unwrap(),
            "record number 0003\n"
        );
        assert_eq!(
            fs::read_to_string(appender.backup_path(1)).unwrap(),
            "record number 0002\n"
        );
        assert_eq!(
            fs::read_to_string(appender.backup_path(3)).unwrap(),
            "record number 0000\n"
        );
        assert_eq!(appender.rotation_count(), 3);
    }

    #[test]
    fn test_oversized_record_on_empty_file_is_written() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("big.log");
        let policy = RotationPolicy::new().with_max_size(8).with_max_backups(2);
        let mut appender = RotatingFileAppender::with_policy(&log_path, policy).unwrap();

        appender
            .append(LogLevel::Info, "this line is longer than eight bytes")
            .unwrap();
        appender.flush().unwrap();

        assert_eq!(appender.rotation_count(), 0);
        assert!(!appender.backup_path(1).exists());
    }

    #[test]
    fn test_no_rotation_when_disabled() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("never.log");
        let policy = RotationPolicy::new().with_max_size(10).with_max_backups(0);
        let mut appender = RotatingFileAppender::with_policy(&log_path, policy).unwrap();

        write_lines(&mut appender, 50);

        assert_eq!(count_files(dir.path(), "never.log"), 1);
        assert_eq!(fs::metadata(&log_path).unwrap().len(), 50 * 19);
    }

    #[test]
    fn test_compressed_backups() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("zipped.log");
        let policy = RotationPolicy::new()
            .with_max_size(40)
            .with_max_backups(2)
            .with_compression(true);
        let mut appender = RotatingFileAppender::with_policy(&log_path, policy).unwrap();

        write_lines(&mut appender, 12);

        let first = gz_path(&appender.backup_path(1));
        assert!(first.exists());
        assert!(!appender.backup_path(1).exists());
        assert!(!gz_path(&appender.backup_path(3)).exists());

        let mut decoded = String::new();
        flate2::read::GzDecoder::new(File::open(&first).unwrap())
            .read_to_string(&mut decoded)
            .unwrap();
        assert!(decoded.starts_with("record number"));
    }

    #[test]
    fn test_gz_path_appends_suffix() {
        assert_eq!(
            gz_path(Path::new("logs/app.log.2")),
            PathBuf::from("logs/app.log.2.gz")
        );
    }
}
