//! Helpers for scripts that drive external programs: a subprocess runner with
//! timeouts and output capture, plus a `fileConfig`-style logging setup.

/// Command-line interface of the `toolbox` binary.
pub mod cli;
/// Exit codes, file locations and other fixed values.
pub mod constants;
/// Path and string sanitising.
pub mod core;
pub mod logging;
pub mod settings;
pub mod system;
