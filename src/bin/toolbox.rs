// src/bin/toolbox.rs

use anyhow::Result;
use chrono::Local;
use clap::Parser;
use colored::*;
use scripting_toolbox::{
    cli::{Cli, Command, LogCheckArgs, RunArgs},
    constants::{EXIT_SOFTWARE, EXIT_SUCCESS},
    core::paths::{self, PathError, PathRequirements},
    logging::{self, ConfigureOptions, LogConfigError, LogRegistry, banner},
    settings::{SettingsError, ToolboxSettings},
    system::executor::{ExecutionError, Invocation},
};
use std::io::{self, Write};
use std::path::Path;

/// Sets up logging, dispatches the subcommand and maps every error to an exit code.
fn main() {
    let cli = Cli::parse();

    let code = match init_and_run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("\n{}: {:#}", "Error".red().bold(), e);
            exit_code_for(&e)
        }
    };
    logging::global().flush();
    std::process::exit(code);
}

fn init_and_run(cli: Cli) -> Result<i32> {
    let settings = ToolboxSettings::load_or_default(cli.settings.as_deref())?;

    match cli.log_config.as_ref().or(settings.logging.config_file.as_ref()) {
        Some(config) => {
            let options = ConfigureOptions::default()
                .disable_existing(settings.logging.disable_existing)
                .encoding(settings.logging.encoding.clone());
            logging::configure(config, &options)?;
        }
        None => env_logger::init(),
    }
    log::debug!("CLI args parsed: {:?}", cli.command);

    match cli.command {
        Command::Run(args) => handle_run(args, &settings),
        Command::LogCheck(args) => handle_log_check(args, &settings),
    }
}

fn handle_run(args: RunArgs, settings: &ToolboxSettings) -> Result<i32> {
    let logger = logging::get_logger("toolbox");
    let start = Local::now();
    let argv: Vec<String> = std::env::args().collect();
    banner::log_welcome(&logger, &script_name(&argv), start, Some(&argv));

    let mut invocation = Invocation::new(args.command)
        .timeout(args.timeout.or_else(|| settings.runner.default_timeout()))
        .warn_missing_timeout(settings.runner.warn_missing_timeout);
    if let Some(cwd) = args.cwd {
        let cwd = paths::sanitize_user_input_path(
            &cwd.to_string_lossy(),
            &PathRequirements::any_directory(),
        )?;
        invocation = invocation.current_dir(cwd);
    }
    if let Some(user) = args.user {
        invocation = invocation.run_as_user(user);
    }

    log::debug!(
        "Running '{}' in '{}'",
        invocation.display_command(),
        invocation
            .working_directory()
            .map_or_else(|| ".".to_string(), |dir| dir.display().to_string())
    );

    let output = if args.check {
        invocation.run_checked()?
    } else {
        invocation.run()?
    };
    io::stdout().write_all(&output.stdout)?;
    io::stderr().write_all(&output.stderr)?;

    logger.info(format!(
        "'{}' finished with exit code {}",
        invocation.display_command(),
        output.exit_code
    ));
    banner::log_goodbye(&logger, start);
    Ok(output.exit_code)
}

fn handle_log_check(args: LogCheckArgs, settings: &ToolboxSettings) -> Result<i32> {
    // A private registry, so the check does not touch the process-wide loggers.
    let registry = LogRegistry::new();
    let options = ConfigureOptions::default()
        .disable_existing(args.disable_existing)
        .encoding(
            args.encoding
                .unwrap_or_else(|| settings.logging.encoding.clone()),
        );
    registry.configure(&args.config, &options)?;

    let logger = registry.get_logger(&args.logger);
    logger.info(format!(
        "Logging configuration '{}' applied.",
        args.config.display()
    ));
    registry.flush();

    println!(
        "{} '{}' is valid; '{}' logs at {} and above.",
        "OK".green().bold(),
        args.config.display(),
        logger.name(),
        logger.effective_level()
    );
    Ok(EXIT_SUCCESS)
}

/// Program name without directories and extension, for the welcome banner.
fn script_name(argv: &[String]) -> String {
    let base = argv
        .first()
        .and_then(|arg0| Path::new(arg0).file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "toolbox".to_string());
    paths::strip_file_extension(&base).unwrap_or(base)
}

fn exit_code_for(error: &anyhow::Error) -> i32 {
    if let Some(e) = error.downcast_ref::<ExecutionError>() {
        return e.exit_code();
    }
    if let Some(e) = error.downcast_ref::<LogConfigError>() {
        return e.exit_code();
    }
    if let Some(e) = error.downcast_ref::<SettingsError>() {
        return e.exit_code();
    }
    if let Some(e) = error.downcast_ref::<PathError>() {
        return e.exit_code();
    }
    EXIT_SOFTWARE
}
