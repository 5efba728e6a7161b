// src/system/executor.rs

use crate::constants::{CHILD_POLL_INTERVAL_MS, EXIT_SOFTWARE, EXIT_USAGE, SIGNAL_EXIT_OFFSET};
use std::borrow::Cow;
use std::collections::HashMap;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command as StdCommand, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Why an [`Invocation`] did not produce a [`RunOutput`].
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// Empty command, unparsable command line, or an unknown user.
    #[error("Invalid invocation: {0}")]
    InvalidArgument(String),
    /// The OS refused to start the process, e.g. missing executable or working directory.
    #[error("Command '{command}' could not be started: {source}")]
    Spawn {
        /// The command as shown by [`Invocation::display_command`].
        command: String,
        /// The error from `spawn`.
        #[source]
        source: io::Error,
    },
    /// The process, or something holding its output pipes, outlived the timeout.
    /// The process was killed and its output dropped.
    #[error("Command '{command}' did not finish within {timeout:?} and was killed.")]
    Timeout {
        /// The command as shown by [`Invocation::display_command`].
        command: String,
        /// The configured limit.
        timeout: Duration,
    },
    /// Raised by [`run_checked`] for a nonzero exit code.
    #[error("Command '{command}' exited with code {exit_code}: {stderr}")]
    ProcessFailed {
        /// The command as shown by [`Invocation::display_command`].
        command: String,
        /// Exit code, or 128 + signal number.
        exit_code: i32,
        /// Captured stderr, decoded lossily.
        stderr: String,
    },
    /// Waiting for the process or reading its output failed.
    #[error("Lost track of command '{command}': {source}")]
    Io {
        /// The command as shown by [`Invocation::display_command`].
        command: String,
        /// The underlying error.
        #[source]
        source: io::Error,
    },
}

impl ExecutionError {
    /// The exit code a script should terminate with after this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidArgument(_) => EXIT_USAGE,
            Self::ProcessFailed { exit_code, .. } if *exit_code != 0 => *exit_code,
            _ => EXIT_SOFTWARE,
        }
    }
}

/// Describes one external process call. Built once, run once.
#[derive(Debug, Clone)]
pub struct Invocation {
    command: Vec<String>,
    working_directory: Option<PathBuf>,
    timeout: Option<Duration>,
    env: HashMap<String, String>,
    run_as_user: Option<String>,
    warn_missing_timeout: bool,
}

impl Invocation {
    /// Creates an invocation from the executable followed by its arguments.
    pub fn new<I, S>(command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            working_directory: None,
            timeout: None,
            env: HashMap::new(),
            run_as_user: None,
            warn_missing_timeout: true,
        }
    }

    /// Splits a shell-like command line (quotes are honoured, no expansion happens).
    pub fn from_command_line(command_line: &str) -> Result<Self, ExecutionError> {
        let parts = shlex::split(command_line.trim()).ok_or_else(|| {
            ExecutionError::InvalidArgument(format!(
                "Command line could not be parsed: {}",
                command_line
            ))
        })?;
        Ok(Self::new(parts))
    }

    /// Runs the child in `dir` instead of the current directory.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    /// Accepts a `Duration` or an `Option<Duration>`; `None` disables the timeout.
    pub fn timeout(mut self, timeout: impl Into<Option<Duration>>) -> Self {
        self.timeout = timeout.into();
        self
    }

    /// Adds an environment variable on top of the inherited environment.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Runs the child as another OS user. Only available on Unix-like systems.
    pub fn run_as_user(mut self, username: impl Into<String>) -> Self {
        self.run_as_user = Some(username.into());
        self
    }

    /// Controls the warning logged when no timeout was set.
    pub fn warn_missing_timeout(mut self, warn: bool) -> Self {
        self.warn_missing_timeout = warn;
        self
    }

    /// Executable and arguments.
    pub fn command(&self) -> &[String] {
        &self.command
    }

    /// The directory set with [`Invocation::current_dir`].
    pub fn working_directory(&self) -> Option<&Path> {
        self.working_directory.as_deref()
    }

    /// The command quoted the way a POSIX shell would accept it, for messages.
    pub fn display_command(&self) -> String {
        shlex::try_join(self.command.iter().map(String::as_str))
            .unwrap_or_else(|_| self.command.join(" "))
    }

    /// See [`run`].
    pub fn run(&self) -> Result<RunOutput, ExecutionError> {
        run(self)
    }

    /// See [`run_checked`].
    pub fn run_checked(&self) -> Result<RunOutput, ExecutionError> {
        run_checked(self)
    }
}

/// What a finished child left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    /// Executable and arguments as run.
    pub command: Vec<String>,
    /// Exit code, or 128 + signal number if the child was killed by a signal.
    pub exit_code: i32,
    /// Everything written to stdout.
    pub stdout: Vec<u8>,
    /// Everything written to stderr.
    pub stderr: Vec<u8>,
}

impl RunOutput {
    /// True for exit code 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout decoded as UTF-8; invalid sequences become U+FFFD.
    pub fn stdout_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    /// Stderr decoded as UTF-8; invalid sequences become U+FFFD.
    pub fn stderr_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }
}

/// Runs `command` with an optional working directory and timeout.
pub fn run_command<S: AsRef<str>>(
    command: &[S],
    working_directory: Option<&Path>,
    timeout: Option<Duration>,
) -> Result<RunOutput, ExecutionError> {
    let mut invocation =
        Invocation::new(command.iter().map(|part| part.as_ref().to_string())).timeout(timeout);
    if let Some(dir) = working_directory {
        invocation = invocation.current_dir(dir);
    }
    run(&invocation)
}

/// Executes the invocation and blocks until the child exits or the timeout elapses.
///
/// A nonzero exit code is not an error here; use [`run_checked`] for that.
/// The timeout also covers draining stdout and stderr, so a background
/// grandchild that keeps the pipes open cannot hold the caller past it.
/// After a timeout the child is killed and whatever it printed so far is
/// dropped. A timeout too large to express as a deadline means no limit.
pub fn run(invocation: &Invocation) -> Result<RunOutput, ExecutionError> {
    let (program, args) = invocation
        .command
        .split_first()
        .ok_or_else(|| ExecutionError::InvalidArgument("No command specified to run.".into()))?;
    if program.trim().is_empty() {
        return Err(ExecutionError::InvalidArgument(
            "The executable name must not be blank.".into(),
        ));
    }

    let display = invocation.display_command();
    warn_about_usage(invocation, &display);

    let mut command = StdCommand::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = &invocation.working_directory {
        command.current_dir(dunce::simplified(dir));
    }
    if let Some(username) = &invocation.run_as_user {
        apply_user(&mut command, username, invocation.working_directory.as_deref())?;
    }
    command.envs(&invocation.env);

    log::debug!("Spawning '{}'", display);
    let mut child = command.spawn().map_err(|e| ExecutionError::Spawn {
        command: display.clone(),
        source: e,
    })?;

    // A timeout too large for `Instant` means no limit.
    let deadline = invocation
        .timeout
        .and_then(|timeout| Instant::now().checked_add(timeout));
    let stdout_reader = spawn_reader(child.stdout.take());
    let stderr_reader = spawn_reader(child.stderr.take());
    let timed_out = || ExecutionError::Timeout {
        command: display.clone(),
        timeout: invocation.timeout.unwrap_or_default(),
    };

    let status = wait_with_deadline(&mut child, deadline)
        .map_err(|e| ExecutionError::Io {
            command: display.clone(),
            source: e,
        })?
        .ok_or_else(timed_out)?;

    // Background grandchildren may keep the pipes open after the child exited;
    // the deadline covers draining them too. Readers that miss it are detached.
    let stdout = collect_reader(&stdout_reader, deadline, &display)?.ok_or_else(timed_out)?;
    let stderr = collect_reader(&stderr_reader, deadline, &display)?.ok_or_else(timed_out)?;
    let exit_code = exit_code_of(status);
    log::debug!("'{}' exited with code {}", display, exit_code);

    Ok(RunOutput {
        command: invocation.command.clone(),
        exit_code,
        stdout,
        stderr,
    })
}

/// Like [`run`], but a nonzero exit code fails with [`ExecutionError::ProcessFailed`].
pub fn run_checked(invocation: &Invocation) -> Result<RunOutput, ExecutionError> {
    let output = run(invocation)?;
    if !output.success() {
        return Err(ExecutionError::ProcessFailed {
            command: invocation.display_command(),
            exit_code: output.exit_code,
            stderr: output.stderr_str().trim_end().to_string(),
        });
    }
    Ok(output)
}

fn warn_about_usage(invocation: &Invocation, display: &str) {
    if invocation.command.iter().any(|arg| arg.trim() == "-") {
        log::warn!(
            "One of the arguments of '{}' is \"-\". Reading from stdin is not supported, the child gets an empty stdin.",
            display
        );
    }
    if invocation.timeout.is_none() && invocation.warn_missing_timeout {
        log::warn!(
            "No timeout given for '{}'. A hanging child process cannot be detected and may run forever.",
            display
        );
    }
}

fn spawn_reader<R>(source: Option<R>) -> Receiver<io::Result<Vec<u8>>>
where
    R: Read + Send + 'static,
{
    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || {
        let mut buffer = Vec::new();
        let result = match source {
            Some(mut source) => source.read_to_end(&mut buffer).map(|_| buffer),
            None => Ok(buffer),
        };
        // The receiver is gone once the run timed out.
        let _ = sender.send(result);
    });
    receiver
}

/// Waits for a reader's output. `Ok(None)` means the deadline passed first.
fn collect_reader(
    reader: &Receiver<io::Result<Vec<u8>>>,
    deadline: Option<Instant>,
    display: &str,
) -> Result<Option<Vec<u8>>, ExecutionError> {
    let received = match deadline {
        None => reader.recv().map_err(|_| RecvTimeoutError::Disconnected),
        Some(deadline) => {
            reader.recv_timeout(deadline.saturating_duration_since(Instant::now()))
        }
    };
    let result = match received {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => return Ok(None),
        Err(RecvTimeoutError::Disconnected) => {
            Err(io::Error::other("output reader thread panicked"))
        }
    };
    result.map(Some).map_err(|e| ExecutionError::Io {
        command: display.to_string(),
        source: e,
    })
}

/// Waits for the child. Returns `Ok(None)` if the deadline passed; the child is
/// killed and reaped in that case. Without a deadline this blocks until exit.
fn wait_with_deadline(child: &mut Child, deadline: Option<Instant>) -> io::Result<Option<ExitStatus>> {
    let Some(deadline) = deadline else {
        return child.wait().map(Some);
    };

    // Non-blocking wait loop so the deadline can be enforced.
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        let now = Instant::now();
        if now >= deadline {
            log::debug!("Timeout reached, killing child process (PID: {})...", child.id());
            if let Err(e) = child.kill() {
                log::warn!("Failed to kill child process {}: {}", child.id(), e);
            }
            child.wait().ok();
            return Ok(None);
        }
        let nap = (deadline - now).min(Duration::from_millis(CHILD_POLL_INTERVAL_MS));
        thread::sleep(nap);
    }
}

#[cfg(unix)]
fn exit_code_of(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|signal| SIGNAL_EXIT_OFFSET + signal))
        .unwrap_or(EXIT_SOFTWARE)
}

#[cfg(not(unix))]
fn exit_code_of(status: ExitStatus) -> i32 {
    let _ = SIGNAL_EXIT_OFFSET;
    status.code().unwrap_or(EXIT_SOFTWARE)
}

#[cfg(unix)]
fn apply_user(
    command: &mut StdCommand,
    username: &str,
    working_directory: Option<&Path>,
) -> Result<(), ExecutionError> {
    use std::os::unix::process::CommandExt;

    let record = super::user::lookup_user(username)
        .map_err(|e| {
            ExecutionError::InvalidArgument(format!("Could not read the user database: {}", e))
        })?
        .ok_or_else(|| ExecutionError::InvalidArgument(format!("Unknown user '{}'.", username)))?;

    let pwd = match working_directory {
        Some(dir) => dir.to_path_buf(),
        None => std::env::current_dir().unwrap_or_default(),
    };
    log::debug!(
        "Running as user '{}' (uid {}, gid {})",
        record.name,
        record.uid,
        record.gid
    );
    command
        .uid(record.uid)
        .gid(record.gid)
        .env("HOME", &record.home)
        .env("LOGNAME", &record.name)
        .env("USER", &record.name)
        .env("PWD", pwd);
    Ok(())
}

#[cfg(not(unix))]
fn apply_user(
    _command: &mut StdCommand,
    username: &str,
    _working_directory: Option<&Path>,
) -> Result<(), ExecutionError> {
    Err(ExecutionError::InvalidArgument(format!(
        "Running as user '{}' is only supported on Unix-like systems.",
        username
    )))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn sh(script: &str) -> Invocation {
        Invocation::new(["sh", "-c", script]).warn_missing_timeout(false)
    }

    #[test]
    fn test_run_true_returns_zero() {
        let output = run_command(&["true"], None, None).unwrap();
        assert_eq!(output.exit_code, 0);
        assert!(output.success());
    }

    #[test]
    fn test_run_false_returns_nonzero_without_error() {
        let output = run_command(&["false"], None, None).unwrap();
        assert_ne!(output.exit_code, 0);
        assert!(!output.success());
    }

    #[test]
    fn test_run_reports_actual_exit_status() {
        let output = sh("exit 42").run().unwrap();
        assert_eq!(output.exit_code, 42);
    }

    #[test]
    fn test_run_empty_command_is_invalid() {
        let empty: [&str; 0] = [];
        let result = run_command(&empty, None, None);
        assert!(matches!(result, Err(ExecutionError::InvalidArgument(_))));

        let blank = Invocation::new(["  "]).run();
        assert!(matches!(blank, Err(ExecutionError::InvalidArgument(_))));
    }

    #[test]
    fn test_run_timeout_kills_child() {
        let started = Instant::now();
        let result = run_command(&["sleep", "5"], None, Some(Duration::from_millis(100)));
        match result {
            Err(ExecutionError::Timeout { command, timeout }) => {
                assert_eq!(command, "sleep 5");
                assert_eq!(timeout, Duration::from_millis(100));
            }
            other => panic!("expected a timeout, got {:?}", other),
        }
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn test_timeout_covers_grandchild_holding_the_pipes() {
        let started = Instant::now();
        let result = sh("sleep 3 & exit 0")
            .timeout(Duration::from_millis(200))
            .run();
        assert!(
            matches!(result, Err(ExecutionError::Timeout { .. })),
            "expected a timeout, got {:?}",
            result
        );
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_huge_timeout_means_no_limit() {
        let output = Invocation::new(["true"]).timeout(Duration::MAX).run().unwrap();
        assert_eq!(output.exit_code, 0);

        let output = sh("printf ok")
            .timeout(Duration::from_secs_f64(1e19))
            .run()
            .unwrap();
        assert_eq!(output.stdout, b"ok");
    }

    #[test]
    fn test_run_nonexistent_binary_is_spawn_error() {
        let result = run_command(&["nonexistent-binary-xyz"], None, None);
        match result {
            Err(ExecutionError::Spawn { source, .. }) => {
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("expected a spawn error, got {:?}", other),
        }
    }

    #[test]
    fn test_run_missing_working_directory_is_spawn_error() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("does-not-exist");
        let result = run_command(&["true"], Some(&missing), None);
        assert!(matches!(result, Err(ExecutionError::Spawn { .. })));
    }

    #[test]
    fn test_run_captures_stdout_and_stderr_separately() {
        let output = sh("echo 'gotcha! echo was successful!'; echo 'on stderr' >&2")
            .run()
            .unwrap();
        assert_eq!(output.stdout_str().trim(), "gotcha! echo was successful!");
        assert_eq!(output.stderr_str().trim(), "on stderr");
        assert_eq!(output.command.first().map(String::as_str), Some("sh"));
    }

    #[test]
    fn test_run_checked_fails_with_stderr() {
        let result = sh("echo oops >&2; exit 3").run_checked();
        match result {
            Err(ExecutionError::ProcessFailed {
                exit_code, stderr, ..
            }) => {
                assert_eq!(exit_code, 3);
                assert_eq!(stderr, "oops");
            }
            other => panic!("expected a process failure, got {:?}", other),
        }
    }

    #[test]
    fn test_run_checked_passes_through_success() {
        let output = sh("printf done").run_checked().unwrap();
        assert_eq!(output.stdout, b"done");
    }

    #[test]
    fn test_run_uses_working_directory() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("marker-file.txt"), "x").unwrap();
        let output = run_command(&["ls"], Some(temp.path()), None).unwrap();
        assert!(output.stdout_str().contains("marker-file.txt"));
    }

    #[test]
    fn test_run_passes_extra_environment() {
        let output = sh("printf %s \"$TOOLBOX_TEST_VAR\"")
            .env("TOOLBOX_TEST_VAR", "hello env")
            .run()
            .unwrap();
        assert_eq!(output.stdout_str(), "hello env");
    }

    #[test]
    fn test_run_reports_signal_as_offset_code() {
        let output = sh("kill -9 $$").run().unwrap();
        assert_eq!(output.exit_code, SIGNAL_EXIT_OFFSET + 9);
    }

    #[test]
    fn test_run_drains_large_output() {
        let output = sh("yes | head -c 200000")
            .timeout(Duration::from_secs(10))
            .run()
            .unwrap();
        assert_eq!(output.stdout.len(), 200_000);
    }

    #[test]
    fn test_run_stdin_is_empty() {
        let output = Invocation::new(["cat", "-"])
            .timeout(Duration::from_secs(5))
            .run()
            .unwrap();
        assert!(output.success());
        assert!(output.stdout.is_empty());
    }

    #[test]
    fn test_run_as_unknown_user_is_invalid() {
        let result = Invocation::new(["true"])
            .run_as_user("no-such-user-for-toolbox-tests")
            .run();
        assert!(matches!(result, Err(ExecutionError::InvalidArgument(_))));
    }

    #[test]
    fn test_from_command_line_honours_quotes() {
        let invocation = Invocation::from_command_line(r#"echo "two words" plain"#).unwrap();
        assert_eq!(invocation.command(), ["echo", "two words", "plain"]);
        assert_eq!(invocation.working_directory(), None);
        let invocation = invocation.current_dir("/tmp");
        assert_eq!(invocation.working_directory(), Some(Path::new("/tmp")));
        assert!(invocation.display_command().contains("two words"));
    }

    #[test]
    fn test_from_command_line_rejects_unbalanced_quotes() {
        let result = Invocation::from_command_line("echo \"unterminated");
        assert!(matches!(result, Err(ExecutionError::InvalidArgument(_))));
    }

    #[test]
    fn test_error_exit_codes() {
        assert_eq!(ExecutionError::InvalidArgument("x".into()).exit_code(), EXIT_USAGE);
        let failed = ExecutionError::ProcessFailed {
            command: "false".into(),
            exit_code: 1,
            stderr: String::new(),
        };
        assert_eq!(failed.exit_code(), 1);
        let timeout = ExecutionError::Timeout {
            command: "sleep 5".into(),
            timeout: Duration::from_millis(1),
        };
        assert_eq!(timeout.exit_code(), EXIT_SOFTWARE);
    }
}
