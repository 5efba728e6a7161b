// src/logging/handler.rs

use super::format::{Formatter, LogRecord};
use super::level::LogLevel;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Where a handler writes its formatted lines.
#[derive(Debug)]
pub enum HandlerTarget {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
    /// An open file.
    File {
        /// Where the file was opened.
        path: PathBuf,
        /// The open handle.
        file: Mutex<File>,
    },
    /// Discards everything.
    Null,
}

impl HandlerTarget {
    /// Opens `path` for appending (or truncating when `append` is false).
    pub fn open_file(path: &Path, append: bool) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(path)?;
        Ok(Self::File {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }
}

/// A named output with its own threshold and formatter.
#[derive(Debug)]
pub struct Handler {
    name: String,
    level: LogLevel,
    formatter: Formatter,
    target: HandlerTarget,
}

impl Handler {
    /// Creates a handler named `name` that passes records at or above `level`.
    pub fn new(
        name: impl Into<String>,
        level: LogLevel,
        formatter: Formatter,
        target: HandlerTarget,
    ) -> Self {
        Self {
            name: name.into(),
            level,
            formatter,
            target,
        }
    }

    /// Used when a record finds no configured handler at all.
    pub fn last_resort() -> Self {
        Self::new(
            "lastResort",
            LogLevel::Warning,
            Formatter::default(),
            HandlerTarget::Stderr,
        )
    }

    /// Key the handler was configured under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Threshold of this handler.
    pub fn level(&self) -> LogLevel {
        self.level
    }

    /// Formats and writes `record` if it passes the threshold.
    ///
    /// Write errors are reported on stderr and otherwise ignored.
    pub fn handle(&self, record: &LogRecord<'_>) {
        if record.level < self.level {
            return;
        }
        let line = self.formatter.format(record);
        if let Err(e) = self.emit(&line) {
            // Nowhere left to log this.
            eprintln!("--- Logging error in handler '{}': {}", self.name, e);
        }
    }

    /// Flushes the underlying stream or file.
    pub fn flush(&self) {
        let result = match &self.target {
            HandlerTarget::Stdout => io::stdout().flush(),
            HandlerTarget::Stderr => io::stderr().flush(),
            HandlerTarget::File { file, .. } => file
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .flush(),
            HandlerTarget::Null => Ok(()),
        };
        if let Err(e) = result {
            eprintln!("--- Logging error in handler '{}': {}", self.name, e);
        }
    }

    fn emit(&self, line: &str) -> io::Result<()> {
        match &self.target {
            HandlerTarget::Stdout => writeln!(io::stdout().lock(), "{}", line),
            HandlerTarget::Stderr => writeln!(io::stderr().lock(), "{}", line),
            HandlerTarget::File { file, .. } => {
                let mut file = file.lock().unwrap_or_else(PoisonError::into_inner);
                writeln!(file, "{}", line)?;
                file.flush()
            }
            HandlerTarget::Null => Ok(()),
        }
    }
}
