// src/system/user.rs

use std::io::IsTerminal;
use std::path::PathBuf;

/// The subset of a password database entry needed to run a child as another user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    /// Login name.
    pub name: String,
    /// Numeric user id.
    pub uid: u32,
    /// Numeric id of the primary group.
    pub gid: u32,
    /// Home directory.
    pub home: PathBuf,
}

/// Looks up `username` through the system user database (`getpwnam`), so
/// NSS sources such as LDAP or SSSD are honoured.
///
/// Returns `Ok(None)` if the database has no such user.
#[cfg(unix)]
pub fn lookup_user(username: &str) -> std::io::Result<Option<UserRecord>> {
    let user = nix::unistd::User::from_name(username).map_err(std::io::Error::from)?;
    Ok(user.map(|user| UserRecord {
        name: user.name,
        uid: user.uid.as_raw(),
        gid: user.gid.as_raw(),
        home: user.dir,
    }))
}

/// There is no user database to query on this platform.
#[cfg(not(unix))]
pub fn lookup_user(_username: &str) -> std::io::Result<Option<UserRecord>> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "user lookup is only supported on Unix-like systems",
    ))
}

/// Name of the user running this process, or `"unknown"`.
pub fn current_user_name() -> String {
    let var = if cfg!(windows) { "USERNAME" } else { "USER" };
    std::env::var(var).unwrap_or_else(|_| "unknown".to_string())
}

/// Whether this process runs with an effective uid of 0.
#[cfg(unix)]
pub fn current_user_is_superuser() -> bool {
    nix::unistd::geteuid().is_root()
}

/// Whether this process runs with administrator privileges.
///
/// Only administrators may list `%SystemRoot%\temp`.
#[cfg(windows)]
pub fn current_user_is_superuser() -> bool {
    let root = std::env::var("SystemRoot").unwrap_or_else(|_| r"C:\windows".to_string());
    std::fs::read_dir(PathBuf::from(root).join("temp")).is_ok()
}

/// Privileges cannot be queried on this platform.
#[cfg(not(any(unix, windows)))]
pub fn current_user_is_superuser() -> bool {
    false
}

/// Terminal state of the three standard streams as `(stdin, stdout, stderr)`.
pub fn std_streams_are_terminals() -> (bool, bool, bool) {
    (
        std::io::stdin().is_terminal(),
        std::io::stdout().is_terminal(),
        std::io::stderr().is_terminal(),
    )
}
