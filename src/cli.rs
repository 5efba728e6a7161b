// src/cli.rs

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// toolbox: run external commands and check logging configurations.
///
/// Logging goes through `env_logger` (`RUST_LOG=debug`) unless an INI
/// configuration is given with `--log-config` or in the settings file.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(disable_help_subcommand = true)]
pub struct Cli {
    /// Logging configuration in `fileConfig` INI layout.
    #[arg(long, global = true, value_name = "INI")]
    pub log_config: Option<PathBuf>,

    /// Settings file. Defaults to `<config dir>/scripting-toolbox/toolbox.toml`.
    #[arg(long, global = true, value_name = "TOML")]
    pub settings: Option<PathBuf>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// The `toolbox` subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Runs a command, prints what it wrote and exits with its exit code.
    Run(RunArgs),
    /// Applies a logging configuration and writes one test record through it.
    LogCheck(LogCheckArgs),
}

/// Options of `toolbox run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Kill the command after this many seconds.
    #[arg(long, value_name = "SECS", value_parser = parse_timeout)]
    pub timeout: Option<Duration>,

    /// Working directory of the command.
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// Treat a nonzero exit code as an error.
    #[arg(long)]
    pub check: bool,

    /// Run the command as another user (Unix only, needs privileges).
    #[arg(long, value_name = "USER")]
    pub user: Option<String>,

    /// The command and its arguments, e.g. `toolbox run -- ls -l`.
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

/// Options of `toolbox log-check`.
#[derive(Args, Debug)]
pub struct LogCheckArgs {
    /// The INI file to check.
    pub config: PathBuf,

    /// Disable loggers that existed before the configuration was applied.
    #[arg(long)]
    pub disable_existing: bool,

    /// Encoding of the INI file. Defaults to the settings value.
    #[arg(long, value_name = "ENC")]
    pub encoding: Option<String>,

    /// Logger that receives the test record.
    #[arg(long, default_value = "toolbox")]
    pub logger: String,
}

fn parse_timeout(value: &str) -> Result<Duration, String> {
    let secs: f64 = value
        .parse()
        .map_err(|_| format!("'{}' is not a number of seconds", value))?;
    Duration::try_from_secs_f64(secs).map_err(|e| format!("invalid timeout '{}': {}", value, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_keeps_trailing_arguments() {
        let cli = Cli::try_parse_from([
            "toolbox", "run", "--timeout", "1.5", "--check", "--", "ls", "-l", "--all",
        ])
        .unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected the run subcommand");
        };
        assert_eq!(args.timeout, Some(Duration::from_millis(1500)));
        assert!(args.check);
        assert_eq!(args.command, vec!["ls", "-l", "--all"]);
    }

    #[test]
    fn test_run_rejects_bad_timeout_and_missing_command() {
        assert!(Cli::try_parse_from(["toolbox", "run", "--timeout", "-1", "--", "ls"]).is_err());
        assert!(Cli::try_parse_from(["toolbox", "run", "--timeout", "soon", "--", "ls"]).is_err());
        assert!(Cli::try_parse_from(["toolbox", "run"]).is_err());

        // Larger than any deadline; the runner treats it as no limit.
        let cli = Cli::try_parse_from(["toolbox", "run", "--timeout", "1e19", "--", "true"]).unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected the run subcommand");
        };
        assert_eq!(args.timeout, Some(Duration::from_secs_f64(1e19)));
    }

    #[test]
    fn test_log_check_with_global_flags() {
        let cli = Cli::try_parse_from([
            "toolbox",
            "log-check",
            "logging.ini",
            "--disable-existing",
            "--settings",
            "custom.toml",
        ])
        .unwrap();
        assert_eq!(cli.settings, Some(PathBuf::from("custom.toml")));
        let Command::LogCheck(args) = cli.command else {
            panic!("expected the log-check subcommand");
        };
        assert_eq!(args.config, PathBuf::from("logging.ini"));
        assert!(args.disable_existing);
        assert_eq!(args.encoding, None);
        assert_eq!(args.logger, "toolbox");
    }
}
