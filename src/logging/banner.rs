// src/logging/banner.rs

//! Welcome and goodbye sections that frame the log of a script run.

use super::registry::Logger;
use crate::system::user;
use chrono::{DateTime, Local, TimeDelta};

/// Opens the welcome section.
pub const LOGSEPARATOR_HASH: &str = "####################";
/// Separator for callers that need one more level.
pub const LOGSEPARATOR_EQUAL: &str = "====================";
/// Separator for callers that need one more level.
pub const LOGSEPARATOR_ASTERISK: &str =
    " *  *  *  *  *  *  *  *  *  *  *  *  *  *  *  *  *  *  *  * ";
/// Closes the welcome section and opens the goodbye section.
pub const LOGSEPARATOR_UNDERSCORE: &str = "____________________";
/// Separator for callers that need one more level.
pub const LOGSEPARATOR_HYPHEN: &str = "--------------------";
/// Separator for callers that need one more level.
pub const LOGSEPARATOR_DOT: &str = "....................";

/// How the start time of a run is shown.
pub const START_TIME_FORMAT: &str = "%H:%M:%S, %Y-%m-%d %A (%d %B %Y)";

/// Logs who started `script_name`, when, with which arguments and on which terminals.
///
/// `argv` includes the program name as its first element, which is not shown.
pub fn log_welcome(
    logger: &Logger,
    script_name: &str,
    start: DateTime<Local>,
    argv: Option<&[String]>,
) {
    logger.info(LOGSEPARATOR_HASH);
    match argv {
        Some(argv) => logger.info(format!(
            "Starting script \"{}\" with arguments {:?}.",
            script_name,
            argv.get(1..).unwrap_or_default()
        )),
        None => logger.info(format!(
            "Starting script \"{}\" without any CLI-arguments.",
            script_name
        )),
    }
    logger.info(format!(
        "Current user: \"{}\" has administrator/superuser privileges: {}.",
        user::current_user_name(),
        user::current_user_is_superuser()
    ));
    logger.info(format!("Starting at: {}.", start.format(START_TIME_FORMAT)));

    let (stdin, stdout, stderr) = user::std_streams_are_terminals();
    logger.info(format!("stdin is a terminal: {}", stdin));
    logger.info(format!("stdout is a terminal: {}", stdout));
    logger.info(format!("stderr is a terminal: {}", stderr));
    logger.info(LOGSEPARATOR_UNDERSCORE);
}

/// Logs the end of a run that began at `start`, including its total runtime.
pub fn log_goodbye(logger: &Logger, start: DateTime<Local>) {
    logger.info(LOGSEPARATOR_UNDERSCORE);
    logger.info(format!(
        "Finished script which started at: {}.",
        start.format(START_TIME_FORMAT)
    ));
    logger.info(format!(
        "Full script runtime: {}",
        format_runtime(Local::now() - start)
    ));
    logger.info(LOGSEPARATOR_HASH);
}

/// `H:MM:SS` with a microsecond fraction when there is one.
fn format_runtime(elapsed: TimeDelta) -> String {
    let total_micros = elapsed.num_microseconds().unwrap_or(i64::MAX).max(0);
    let micros = total_micros % 1_000_000;
    let seconds = total_micros / 1_000_000;
    let clock = format!(
        "{}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    );
    if micros == 0 {
        clock
    } else {
        format!("{}.{:06}", clock, micros)
    }
}
