//! # Logging Configuration
//!
//! Applies `fileConfig`-style INI files to a [`LogRegistry`] and hands out
//! named [`Logger`]s.
//!
//! ## Modules
//!
//! - **`registry`**: the logger hierarchy, level inheritance, handler lookup and
//!   the disable-existing-loggers rule applied on every `configure` call.
//! - **`file_config`**: reads, decodes and validates a configuration file.
//! - **`ini`**: the INI reader underneath `file_config`.
//! - **`format`** / **`handler`**: record rendering and output targets.
//! - **`bridge`**: the process-wide registry and its `log` facade adapter.
//! - **`banner`**: welcome and goodbye sections for script logs.
//!
//! ## Ordering hazard
//!
//! With `disable_existing` set, loggers obtained *before* a `configure` call and
//! not named in the file are disabled for good (until a later configuration
//! names them or runs without the flag). Configure first, or leave the flag off.

/// Separator lines and the welcome and goodbye sections.
pub mod banner;
/// The process-wide registry and the `log` facade adapter.
pub mod bridge;
/// Loading and validation of `fileConfig` INI files.
pub mod file_config;
/// `%(field)s` record formatting.
pub mod format;
/// Stream, file and null outputs.
pub mod handler;
/// A small INI reader.
pub mod ini;
/// Severity levels.
pub mod level;
/// Logger hierarchy and configuration.
pub mod registry;

pub use bridge::{configure, get_logger, global, install_bridge};
pub use level::LogLevel;
pub use registry::{ConfigState, ConfigureOptions, LogRegistry, Logger};

use crate::constants::{EXIT_SOFTWARE, EXIT_USAGE};
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while applying a logging configuration.
#[derive(Error, Debug)]
pub enum LogConfigError {
    /// The file is missing or cannot be read.
    #[error("Logging configuration '{path}' not found or not readable: {source}")]
    ConfigNotFound {
        /// The configuration file.
        path: PathBuf,
        /// The read error.
        #[source]
        source: std::io::Error,
    },
    /// The file was read but its content is not a usable configuration.
    #[error("Invalid logging configuration '{path}': {reason}")]
    ConfigInvalid {
        /// The configuration file.
        path: PathBuf,
        /// First problem found, with section or line where known.
        reason: String,
    },
    /// A caller-supplied option is wrong, e.g. an unknown encoding.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// A file handler could not open its target.
    #[error("Handler '{handler}' could not open '{path}': {source}")]
    Handler {
        /// Key of the handler.
        handler: String,
        /// The file it tried to open.
        path: PathBuf,
        /// The open error.
        #[source]
        source: std::io::Error,
    },
    /// `install_bridge` found another `log` implementation in place.
    #[error("Another logger is already installed for the `log` facade.")]
    LoggerAlreadySet,
}

impl LogConfigError {
    /// The exit code a script should terminate with after this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConfigNotFound { .. } | Self::ConfigInvalid { .. } | Self::InvalidArgument(_) => {
                EXIT_USAGE
            }
            Self::Handler { .. } | Self::LoggerAlreadySet => EXIT_SOFTWARE,
        }
    }
}
