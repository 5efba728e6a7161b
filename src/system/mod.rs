//! # System Interaction Layer
//!
//! Abstractions over the operating system used by the scripting utilities.
//!
//! ## Modules
//!
//! - **`executor`**: runs one external process per call, synchronously. It captures
//!   stdout and stderr, enforces an optional timeout by killing the child, and turns
//!   spawn failures and nonzero exits into [`executor::ExecutionError`] values.
//! - **`user`**: user database lookups and details about the current user, used for
//!   running children as another user and for the log banners.

/// Subprocess runner.
pub mod executor;
/// Current user and user database.
pub mod user;
