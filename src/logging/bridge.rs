// src/logging/bridge.rs

use super::level::LogLevel;
use super::registry::{ConfigureOptions, LogRegistry, Logger, RecordLocation, normalize_name};
use super::LogConfigError;
use lazy_static::lazy_static;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

lazy_static! {
    static ref GLOBAL_REGISTRY: LogRegistry = LogRegistry::new();
}

static BRIDGE: RegistryBridge = RegistryBridge;
static BRIDGE_INSTALLED: AtomicBool = AtomicBool::new(false);

/// The process-wide registry behind the `log` facade.
pub fn global() -> &'static LogRegistry {
    &GLOBAL_REGISTRY
}

/// Returns a logger of the process-wide registry.
pub fn get_logger(name: &str) -> Logger {
    global().get_logger(name)
}

/// Routes `log::info!` and friends into the process-wide registry.
///
/// Calling it again is a no-op. Fails if some other logger (e.g. `env_logger`)
/// was installed first.
pub fn install_bridge() -> Result<(), LogConfigError> {
    if BRIDGE_INSTALLED.load(Ordering::Acquire) {
        return Ok(());
    }
    match log::set_logger(&BRIDGE) {
        Ok(()) => {
            log::set_max_level(log::LevelFilter::Trace);
            BRIDGE_INSTALLED.store(true, Ordering::Release);
            Ok(())
        }
        // Lost a race against another call of this function.
        Err(_) if BRIDGE_INSTALLED.load(Ordering::Acquire) => Ok(()),
        Err(_) => Err(LogConfigError::LoggerAlreadySet),
    }
}

/// Applies `path` to the process-wide registry and installs the `log` bridge.
pub fn configure(path: impl AsRef<Path>, options: &ConfigureOptions) -> Result<(), LogConfigError> {
    global().configure(path, options)?;
    install_bridge()
}

#[derive(Debug)]
struct RegistryBridge;

impl log::Log for RegistryBridge {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        global().is_enabled_for(metadata.target(), LogLevel::from(metadata.level()))
    }

    fn log(&self, record: &log::Record<'_>) {
        let name = normalize_name(record.target());
        let message = record.args().to_string();
        global().emit(
            &name,
            LogLevel::from(record.level()),
            &message,
            RecordLocation {
                module_path: record.module_path(),
                file: record.file(),
                line: record.line(),
            },
        );
    }

    fn flush(&self) {
        global().flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    // The only test in the crate that touches the process-wide registry.
    #[test]
    fn test_configure_routes_log_macros_through_registry() {
        let dir = TempDir::new().unwrap();
        let log_file = dir.path().join("bridge.log");
        let config = dir.path().join("bridge.ini");
        fs::write(
            &config,
            format!(
                "[loggers]\nkeys=root,bridge\n[handlers]\nkeys=f\n[formatters]\nkeys=p\n\
                 [logger_root]\nlevel=CRITICAL\nhandlers=\n\
                 [logger_bridge]\nlevel=INFO\nhandlers=f\nqualname=bridge_test\npropagate=0\n\
                 [handler_f]\nclass=FileHandler\nformatter=p\nargs=({:?}, 'w')\n\
                 [formatter_p]\nformat=%(name)s:%(levelname)s:%(module)s:%(message)s\n",
                log_file.display().to_string()
            ),
        )
        .unwrap();

        configure(&config, &ConfigureOptions::default()).unwrap();
        // A second install is harmless.
        install_bridge().unwrap();

        log::info!(target: "bridge_test", "through the facade");
        log::debug!(target: "bridge_test", "filtered out");
        log::info!(target: "bridge_test::inner", "from a child target");
        get_logger("bridge_test").warning("direct call");

        let content = fs::read_to_string(&log_file).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines,
            vec![
                "bridge_test:INFO:tests:through the facade",
                "bridge_test::inner:INFO:tests:from a child target",
                "bridge_test:WARNING:unknown:direct call",
            ]
        );
    }
}
