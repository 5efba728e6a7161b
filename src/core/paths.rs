// src/core/paths.rs

use crate::constants::EXIT_USAGE;
use lazy_static::lazy_static;
use regex::Regex;
use std::fs::{self, Metadata};
use std::path::{MAIN_SEPARATOR, Path, PathBuf};
use thiserror::Error;

/// Characters allowed in user supplied paths: word characters, `.`, space,
/// `-`, `_`, both directory separators, `~` and `:`.
pub const PATH_WHITELIST: &str = r"\w\. \-_/\\~:";

/// Characters rejected in user supplied paths: command separators, quotes,
/// comment markers, variable markers and newlines.
pub const PATH_BLACKLIST: &str = r##";&'"#!\$%\r\n"##;

lazy_static! {
    static ref PATH_WHITELIST_VIOLATION: Result<Regex, regex::Error> =
        Regex::new(&format!("[^{}]+", PATH_WHITELIST));
    static ref PATH_BLACKLIST_VIOLATION: Result<Regex, regex::Error> =
        Regex::new(&format!("[{}]+", PATH_BLACKLIST));
}

/// A rejected path or string. The message says which rule failed.
#[derive(Error, Debug)]
pub enum PathError {
    /// The input breaks a rule; this is always the caller's mistake.
    #[error("{0}")]
    Usage(String),
}

impl PathError {
    /// Always `EXIT_USAGE`.
    pub fn exit_code(&self) -> i32 {
        EXIT_USAGE
    }
}

/// Returns `basename` without its extension.
///
/// A leading `./` is ignored; any other directory separator is an error.
pub fn strip_file_extension(basename: &str) -> Result<String, PathError> {
    let basename = basename
        .strip_prefix("./")
        .or_else(|| basename.strip_prefix(".\\").filter(|_| cfg!(windows)))
        .unwrap_or(basename);
    if basename.contains('/') || basename.contains(MAIN_SEPARATOR) {
        return Err(PathError::Usage(format!(
            "The file base name '{}' contains path fragments.",
            basename
        )));
    }
    Ok(Path::new(basename)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default())
}

/// Checks `input` against two regex character-class bodies.
///
/// Fails if any character matches `blacklist` or falls outside `whitelist`.
/// An empty class is not checked.
///
/// # Errors
/// Returns `PathError::Usage` naming the offending characters, or when a class
/// is not a valid regex.
pub fn sanitize_input_string(input: &str, whitelist: &str, blacklist: &str) -> Result<(), PathError> {
    if !blacklist.is_empty() {
        check_pattern(input, &compile_class(&format!("[{}]+", blacklist))?)?;
    }
    if !whitelist.is_empty() {
        check_pattern(input, &compile_class(&format!("[^{}]+", whitelist))?)?;
    }
    Ok(())
}

fn compile_class(pattern: &str) -> Result<Regex, PathError> {
    Regex::new(pattern)
        .map_err(|e| PathError::Usage(format!("Invalid character class '{}': {}", pattern, e)))
}

fn check_pattern(input: &str, pattern: &Regex) -> Result<(), PathError> {
    let offending: Vec<&str> = pattern.find_iter(input).map(|m| m.as_str()).collect();
    if offending.is_empty() {
        return Ok(());
    }
    Err(PathError::Usage(format!(
        "Argument '{}' contains invalid characters {:?} (pattern: '{}').",
        input,
        offending,
        pattern.as_str()
    )))
}

/// Whether a path may, must or must not have some property.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Requirement {
    /// The path must not have the property.
    #[default]
    Forbidden,
    /// The property does not matter.
    Allowed,
    /// The path must have the property.
    Required,
}

impl Requirement {
    fn allows(self) -> bool {
        self != Self::Forbidden
    }

    fn requires(self) -> bool {
        self == Self::Required
    }

    /// Checks `present` against the requirement; `what` names the property.
    fn check(self, present: bool, what: &str, path: &Path) -> Result<(), PathError> {
        if self.requires() && !present {
            return Err(PathError::Usage(format!(
                "Path must be {}: '{}'",
                what,
                path.display()
            )));
        }
        if !self.allows() && present {
            return Err(PathError::Usage(format!(
                "Path may NOT be {}: '{}'",
                what,
                path.display()
            )));
        }
        Ok(())
    }
}

/// What [`sanitize_user_input_path`] accepts.
///
/// Everything is forbidden by default, so a default value rejects every path.
/// At least one of `file`, `directory` and `symlink` has to be allowed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PathRequirements {
    /// Regular file, after following links.
    pub file: Requirement,
    /// Directory, after following links.
    pub directory: Requirement,
    /// Symbolic link, checked on the path as given.
    pub symlink: Requirement,
    /// Readable by the current user.
    pub readable: Requirement,
    /// Writable by the current user.
    pub writable: Requirement,
    /// Executable, or searchable for a directory.
    pub executable: Requirement,
}

impl PathRequirements {
    /// Forbids everything; switch properties on with the builder methods.
    pub fn new() -> Self {
        Self::default()
    }

    /// A regular file that may be read, written or executed.
    pub fn any_file() -> Self {
        Self::new()
            .file(Requirement::Required)
            .readable(Requirement::Allowed)
            .writable(Requirement::Allowed)
            .executable(Requirement::Allowed)
    }

    /// A directory with any permissions.
    pub fn any_directory() -> Self {
        Self::new()
            .directory(Requirement::Required)
            .readable(Requirement::Allowed)
            .writable(Requirement::Allowed)
            .executable(Requirement::Allowed)
    }

    /// Sets [`PathRequirements::file`].
    pub fn file(mut self, requirement: Requirement) -> Self {
        self.file = requirement;
        self
    }

    /// Sets [`PathRequirements::directory`].
    pub fn directory(mut self, requirement: Requirement) -> Self {
        self.directory = requirement;
        self
    }

    /// Sets [`PathRequirements::symlink`].
    pub fn symlink(mut self, requirement: Requirement) -> Self {
        self.symlink = requirement;
        self
    }

    /// Sets [`PathRequirements::readable`].
    pub fn readable(mut self, requirement: Requirement) -> Self {
        self.readable = requirement;
        self
    }

    /// Sets [`PathRequirements::writable`].
    pub fn writable(mut self, requirement: Requirement) -> Self {
        self.writable = requirement;
        self
    }

    /// Sets [`PathRequirements::executable`].
    pub fn executable(mut self, requirement: Requirement) -> Self {
        self.executable = requirement;
        self
    }

    fn validate(&self) -> Result<(), PathError> {
        let required_kinds = [self.file, self.directory, self.symlink]
            .iter()
            .filter(|r| r.requires())
            .count();
        if required_kinds > 1 {
            return Err(PathError::Usage(
                "A path can only be required to be one of symlink, directory or file.".to_string(),
            ));
        }
        if !self.file.allows() && !self.directory.allows() && !self.symlink.allows() {
            return Err(PathError::Usage(
                "A path must be allowed to be at least one of symlink, directory or file."
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// Validates a path taken from user input and returns its canonical form.
///
/// # Arguments
/// * `path` - The path as the user typed it.
/// * `requirements` - Which kinds and permissions are acceptable.
///
/// # Returns
/// The canonical absolute path. When a symlink is required the link itself is
/// checked and the path is returned as given.
///
/// # Errors
/// Returns `PathError::Usage` if `requirements` contradict each other, if the
/// path contains characters outside [`PATH_WHITELIST`] or inside
/// [`PATH_BLACKLIST`], if it does not exist, or if it violates a requirement.
pub fn sanitize_user_input_path(
    path: &str,
    requirements: &PathRequirements,
) -> Result<PathBuf, PathError> {
    requirements.validate()?;
    for pattern in [&*PATH_BLACKLIST_VIOLATION, &*PATH_WHITELIST_VIOLATION] {
        let pattern = pattern
            .as_ref()
            .map_err(|e| PathError::Usage(format!("Invalid path character class: {}", e)))?;
        check_pattern(path, pattern)?;
    }

    let not_found = || {
        PathError::Usage(format!(
            "Path doesn't exist or is not accessible: '{}'",
            path
        ))
    };
    let given = PathBuf::from(path);
    fs::metadata(&given).map_err(|_| not_found())?;
    let is_symlink = fs::symlink_metadata(&given)
        .map(|meta| meta.file_type().is_symlink())
        .map_err(|_| not_found())?;

    let checked = if requirements.symlink.requires() {
        given
    } else {
        dunce::canonicalize(&given).map_err(|e| {
            PathError::Usage(format!(
                "Path '{}' could not be resolved: {}",
                given.display(),
                e
            ))
        })?
    };
    let metadata = fs::metadata(&checked).map_err(|_| not_found())?;

    requirements.symlink.check(is_symlink, "a symlink", &checked)?;
    // A required link is not followed, so its target may be of any kind.
    if !requirements.symlink.requires() {
        requirements
            .directory
            .check(metadata.is_dir(), "a directory", &checked)?;
        requirements
            .file
            .check(metadata.is_file(), "a file", &checked)?;
    }

    for (requirement, access, what) in [
        (requirements.readable, Access::Read, "readable"),
        (requirements.writable, Access::Write, "writable"),
        (requirements.executable, Access::Execute, "executable"),
    ] {
        requirement.check(has_access(&checked, &metadata, access), what, &checked)?;
    }

    log::debug!("Accepted user supplied path '{}'", checked.display());
    Ok(checked)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Read,
    Write,
    Execute,
}

/// Asks the kernel (`access(2)`) without opening the path, so FIFOs and
/// devices are never blocked on.
#[cfg(unix)]
fn has_access(path: &Path, _metadata: &Metadata, access: Access) -> bool {
    use nix::unistd::AccessFlags;
    let flags = match access {
        Access::Read => AccessFlags::R_OK,
        Access::Write => AccessFlags::W_OK,
        Access::Execute => AccessFlags::X_OK,
    };
    nix::unistd::access(path, flags).is_ok()
}

/// Only the read-only attribute and the file extension are known here.
#[cfg(not(unix))]
fn has_access(path: &Path, metadata: &Metadata, access: Access) -> bool {
    match access {
        Access::Read => true,
        Access::Write => !metadata.permissions().readonly(),
        Access::Execute if metadata.is_dir() => true,
        Access::Execute => cfg!(windows)
            && path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| {
                    ["exe", "com", "bat", "cmd"]
                        .iter()
                        .any(|known| ext.eq_ignore_ascii_case(known))
                }),
    }
}
