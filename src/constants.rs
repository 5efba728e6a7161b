// src/constants.rs

/// Exit code for a successful run.
pub const EXIT_SUCCESS: i32 = 0;

/// Exit code for incorrect usage of the toolbox (`EX_USAGE` on Unix-like systems).
pub const EXIT_USAGE: i32 = 64;

/// Exit code for internal failures (`EX_SOFTWARE` on Unix-like systems).
pub const EXIT_SOFTWARE: i32 = 70;

/// Offset added to a signal number when a child process was killed by that signal.
pub const SIGNAL_EXIT_OFFSET: i32 = 128;

/// The name of the directory holding the toolbox settings (inside the system config dir).
pub const SETTINGS_DIR: &str = "scripting-toolbox";

/// The name of the optional settings file.
pub const SETTINGS_FILENAME: &str = "toolbox.toml";

/// Encoding used for logging configuration files when none is given.
pub const DEFAULT_CONFIG_ENCODING: &str = "UTF-8";

/// How long the executor sleeps between two polls of a running child.
pub const CHILD_POLL_INTERVAL_MS: u64 = 10;
