// src/logging/registry.rs

use super::LogConfigError;
use super::file_config::{HandlerKind, LoggingConfig, StreamTarget};
use super::format::LogRecord;
use super::handler::{Handler, HandlerTarget};
use super::level::LogLevel;
use crate::constants::DEFAULT_CONFIG_ENCODING;
use chrono::Local;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Name reported for the root logger.
pub const ROOT_LOGGER_NAME: &str = "root";

/// Normalises a logger name: `.` separators become `::`, root becomes `""`.
pub(crate) fn normalize_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed == ROOT_LOGGER_NAME {
        return String::new();
    }
    trimmed.replace('.', "::").trim_matches(':').to_string()
}

fn parent_of(name: &str) -> Option<&str> {
    name.rsplit_once("::").map(|(parent, _)| parent)
}

fn is_descendant(name: &str, ancestor: &str) -> bool {
    name.strip_prefix(ancestor)
        .is_some_and(|rest| rest.starts_with("::"))
}

/// Whether [`LogRegistry::configure`] has succeeded at least once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigState {
    /// Records go to the last-resort stderr handler.
    NotConfigured,
    /// A configuration file has been applied.
    Configured,
}

/// Options for [`LogRegistry::configure`].
#[derive(Debug, Clone)]
pub struct ConfigureOptions {
    /// Disable loggers that exist at configuration time but are not named in the file.
    pub disable_existing: bool,
    /// Text encoding of the configuration file.
    pub encoding: String,
}

impl Default for ConfigureOptions {
    fn default() -> Self {
        Self {
            disable_existing: false,
            encoding: DEFAULT_CONFIG_ENCODING.to_string(),
        }
    }
}

impl ConfigureOptions {
    /// Sets [`ConfigureOptions::disable_existing`].
    pub fn disable_existing(mut self, disable: bool) -> Self {
        self.disable_existing = disable;
        self
    }

    /// Sets [`ConfigureOptions::encoding`].
    pub fn encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = encoding.into();
        self
    }
}

/// Source location attached to records that come through the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct RecordLocation<'a> {
    pub module_path: Option<&'a str>,
    pub file: Option<&'a str>,
    pub line: Option<u32>,
}

#[derive(Debug)]
struct LoggerNode {
    level: LogLevel,
    handlers: Vec<Arc<Handler>>,
    propagate: bool,
    disabled: bool,
}

impl Default for LoggerNode {
    fn default() -> Self {
        Self {
            level: LogLevel::NotSet,
            handlers: Vec::new(),
            propagate: true,
            disabled: false,
        }
    }
}

#[derive(Debug)]
struct RegistryState {
    state: ConfigState,
    root: LoggerNode,
    loggers: BTreeMap<String, LoggerNode>,
    last_resort: Arc<Handler>,
}

impl RegistryState {
    fn node(&self, name: &str) -> Option<&LoggerNode> {
        if name.is_empty() {
            Some(&self.root)
        } else {
            self.loggers.get(name)
        }
    }

    fn node_mut(&mut self, name: &str) -> &mut LoggerNode {
        if name.is_empty() {
            &mut self.root
        } else {
            self.loggers.entry(name.to_string()).or_default()
        }
    }

    /// First level set on the logger or one of its ancestors.
    fn effective_level(&self, name: &str) -> LogLevel {
        let mut current = Some(name).filter(|n| !n.is_empty());
        while let Some(n) = current {
            if let Some(node) = self.loggers.get(n) {
                if node.level != LogLevel::NotSet {
                    return node.level;
                }
            }
            current = parent_of(n);
        }
        self.root.level
    }

    fn is_enabled_for(&self, name: &str, level: LogLevel) -> bool {
        let disabled = self.node(name).is_some_and(|node| node.disabled);
        !disabled && level >= self.effective_level(name)
    }

    /// Handlers of the logger and of its ancestors, up to the first one that
    /// does not propagate.
    fn handlers_for(&self, name: &str) -> Vec<Arc<Handler>> {
        let mut collected = Vec::new();
        let mut current = Some(name).filter(|n| !n.is_empty());
        while let Some(n) = current {
            if let Some(node) = self.loggers.get(n) {
                collected.extend(node.handlers.iter().cloned());
                if !node.propagate {
                    return collected;
                }
            }
            current = parent_of(n);
        }
        collected.extend(self.root.handlers.iter().cloned());
        collected
    }
}

/// A hierarchy of named loggers plus the handlers a configuration attached to them.
///
/// Cloning is cheap and every clone shares the same loggers. Components that
/// need logging receive a registry explicitly; the process-wide one lives in
/// [`super::global`].
#[derive(Debug, Clone)]
pub struct LogRegistry {
    inner: Arc<RwLock<RegistryState>>,
}

impl Default for LogRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LogRegistry {
    /// An unconfigured registry whose root logger is at `WARNING`.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(RegistryState {
                state: ConfigState::NotConfigured,
                root: LoggerNode {
                    level: LogLevel::Warning,
                    ..LoggerNode::default()
                },
                loggers: BTreeMap::new(),
                last_resort: Arc::new(Handler::last_resort()),
            })),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current configuration state.
    pub fn state(&self) -> ConfigState {
        self.read().state
    }

    /// Returns the logger called `name`, creating it if needed.
    ///
    /// `""` and `"root"` name the root logger. `a.b` and `a::b` are the same logger.
    pub fn get_logger(&self, name: &str) -> Logger {
        let name = normalize_name(name);
        if !name.is_empty() {
            self.write().loggers.entry(name.clone()).or_default();
        }
        Logger {
            name,
            registry: self.clone(),
        }
    }

    /// The root logger.
    pub fn root(&self) -> Logger {
        self.get_logger("")
    }

    /// Names of all loggers created so far, root excluded.
    pub fn logger_names(&self) -> Vec<String> {
        self.read().loggers.keys().cloned().collect()
    }

    /// Whether a record of `level` sent to `name` would be handled.
    pub fn is_enabled_for(&self, name: &str, level: LogLevel) -> bool {
        self.read().is_enabled_for(&normalize_name(name), level)
    }

    /// Reads the configuration file at `path` and applies it.
    ///
    /// Nothing is changed when the file cannot be read or is invalid. Calling
    /// this again re-applies the configuration: with `disable_existing` set,
    /// every logger created since the last call that the file does not name
    /// gets disabled.
    pub fn configure(
        &self,
        path: impl AsRef<Path>,
        options: &ConfigureOptions,
    ) -> Result<(), LogConfigError> {
        let path = path.as_ref();
        let config = LoggingConfig::load(path, &options.encoding)?;
        self.apply(&config, options.disable_existing)?;
        log::debug!("Applied logging configuration from '{}'", path.display());
        Ok(())
    }

    /// Applies an already parsed configuration.
    pub fn apply(&self, config: &LoggingConfig, disable_existing: bool) -> Result<(), LogConfigError> {
        let handlers = build_handlers(config)?;
        let pick = |keys: &[String]| -> Vec<Arc<Handler>> {
            keys.iter()
                .filter_map(|key| handlers.get(key).cloned())
                .collect()
        };

        let mut state = self.write();
        let existing: Vec<String> = state.loggers.keys().cloned().collect();

        for node in state.loggers.values_mut() {
            node.handlers.clear();
        }
        state.root.handlers = pick(&config.root.handlers);
        if let Some(level) = config.root.level {
            state.root.level = level;
        }

        let mut configured: HashSet<&str> = HashSet::new();
        for spec in &config.loggers {
            let node = state.node_mut(&spec.qualname);
            if let Some(level) = spec.level {
                node.level = level;
            }
            node.handlers = pick(&spec.handlers);
            node.propagate = spec.propagate;
            node.disabled = false;
            configured.insert(spec.qualname.as_str());
        }

        for name in existing.iter().filter(|n| !configured.contains(n.as_str())) {
            let is_child = configured
                .iter()
                .any(|ancestor| is_descendant(name, ancestor));
            if let Some(node) = state.loggers.get_mut(name) {
                if is_child {
                    node.level = LogLevel::NotSet;
                    node.propagate = true;
                } else {
                    node.disabled = disable_existing;
                }
            }
        }

        state.state = ConfigState::Configured;
        Ok(())
    }

    pub(crate) fn emit(&self, name: &str, level: LogLevel, message: &str, location: RecordLocation<'_>) {
        let (handlers, last_resort) = {
            let state = self.read();
            if !state.is_enabled_for(name, level) {
                return;
            }
            (state.handlers_for(name), Arc::clone(&state.last_resort))
        };

        let record = LogRecord {
            name: if name.is_empty() { ROOT_LOGGER_NAME } else { name },
            level,
            message,
            module_path: location.module_path,
            file: location.file,
            line: location.line,
            created: Local::now(),
        };

        if handlers.is_empty() {
            last_resort.handle(&record);
        } else {
            for handler in &handlers {
                handler.handle(&record);
            }
        }
    }

    /// Flushes every handler attached to any logger.
    pub fn flush(&self) {
        let handlers: Vec<Arc<Handler>> = {
            let state = self.read();
            state
                .loggers
                .values()
                .chain(std::iter::once(&state.root))
                .flat_map(|node| node.handlers.iter().cloned())
                .collect()
        };
        for handler in handlers {
            handler.flush();
        }
    }
}

fn build_handlers(config: &LoggingConfig) -> Result<HashMap<String, Arc<Handler>>, LogConfigError> {
    let mut built = HashMap::with_capacity(config.handlers.len());
    for spec in &config.handlers {
        let formatter = spec
            .formatter
            .as_ref()
            .and_then(|key| config.formatters.get(key))
            .cloned()
            .unwrap_or_default();
        let target = match &spec.kind {
            HandlerKind::Stream(StreamTarget::Stdout) => HandlerTarget::Stdout,
            HandlerKind::Stream(StreamTarget::Stderr) => HandlerTarget::Stderr,
            HandlerKind::File { path, append } => HandlerTarget::open_file(path, *append)
                .map_err(|e| LogConfigError::Handler {
                    handler: spec.key.clone(),
                    path: path.clone(),
                    source: e,
                })?,
            HandlerKind::Null => HandlerTarget::Null,
        };
        built.insert(
            spec.key.clone(),
            Arc::new(Handler::new(spec.key.clone(), spec.level, formatter, target)),
        );
    }
    Ok(built)
}

/// A handle to one named logger of a [`LogRegistry`].
#[derive(Debug, Clone)]
pub struct Logger {
    name: String,
    registry: LogRegistry,
}

impl Logger {
    /// Normalised name, `root` for the root logger.
    pub fn name(&self) -> &str {
        if self.name.is_empty() {
            ROOT_LOGGER_NAME
        } else {
            &self.name
        }
    }

    /// Emits `message` at `level` if the logger is enabled for it.
    ///
    /// The record goes to this logger's handlers and, while `propagate` holds,
    /// to those of its ancestors.
    pub fn log(&self, level: LogLevel, message: impl fmt::Display) {
        if !self.is_enabled_for(level) {
            return;
        }
        let message = message.to_string();
        self.registry
            .emit(&self.name, level, &message, RecordLocation::default());
    }

    /// Logs at [`LogLevel::Trace`].
    pub fn trace(&self, message: impl fmt::Display) {
        self.log(LogLevel::Trace, message);
    }

    /// Logs at [`LogLevel::Debug`].
    pub fn debug(&self, message: impl fmt::Display) {
        self.log(LogLevel::Debug, message);
    }

    /// Logs at [`LogLevel::Info`].
    pub fn info(&self, message: impl fmt::Display) {
        self.log(LogLevel::Info, message);
    }

    /// Logs at [`LogLevel::Warning`].
    pub fn warning(&self, message: impl fmt::Display) {
        self.log(LogLevel::Warning, message);
    }

    /// Logs at [`LogLevel::Error`].
    pub fn error(&self, message: impl fmt::Display) {
        self.log(LogLevel::Error, message);
    }

    /// Logs at [`LogLevel::Critical`].
    pub fn critical(&self, message: impl fmt::Display) {
        self.log(LogLevel::Critical, message);
    }

    /// False if the logger is disabled or `level` is below its effective level.
    pub fn is_enabled_for(&self, level: LogLevel) -> bool {
        self.registry.read().is_enabled_for(&self.name, level)
    }

    /// Set by a `disable_existing` configuration that did not name this logger.
    pub fn is_disabled(&self) -> bool {
        self.registry
            .read()
            .node(&self.name)
            .is_some_and(|node| node.disabled)
    }

    /// The level set on this logger itself, possibly `NotSet`.
    pub fn level(&self) -> LogLevel {
        self.registry
            .read()
            .node(&self.name)
            .map(|node| node.level)
            .unwrap_or_default()
    }

    /// Sets this logger's own level.
    pub fn set_level(&self, level: LogLevel) {
        self.registry.write().node_mut(&self.name).level = level;
    }

    /// The first level other than `NotSet` found walking up towards the root.
    pub fn effective_level(&self) -> LogLevel {
        self.registry.read().effective_level(&self.name)
    }

    /// Attaches a handler in addition to whatever a configuration set up.
    /// The next configuration removes it again.
    pub fn add_handler(&self, handler: Arc<Handler>) {
        self.registry.write().node_mut(&self.name).handlers.push(handler);
    }

    /// Returns the logger `<this logger>::<suffix>`.
    pub fn child(&self, suffix: &str) -> Self {
        let suffix = normalize_name(suffix);
        if self.name.is_empty() {
            return self.registry.get_logger(&suffix);
        }
        if suffix.is_empty() {
            return self.clone();
        }
        self.registry.get_logger(&format!("{}::{}", self.name, suffix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        log_file: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let log_file = dir.path().join("testing_toolbox.log");
            Self { dir, log_file }
        }

        /// Writes a configuration with a root logger plus `extra` loggers given
        /// as `(key, qualname, level, propagate)`, all logging to the fixture file.
        fn write_config(&self, file_name: &str, extra: &[(&str, &str, &str, bool)]) -> PathBuf {
            let mut keys = vec!["root".to_string()];
            keys.extend(extra.iter().map(|(key, ..)| key.to_string()));

            let mut text = format!(
                "[loggers]\nkeys={}\n\n[handlers]\nkeys=file\n\n[formatters]\nkeys=plain\n\n\
                 [logger_root]\nlevel=INFO\nhandlers=file\n\n",
                keys.join(",")
            );
            for (key, qualname, level, propagate) in extra {
                text.push_str(&format!(
                    "[logger_{}]\nlevel={}\nhandlers=\nqualname={}\npropagate={}\n\n",
                    key,
                    level,
                    qualname,
                    if *propagate { 1 } else { 0 }
                ));
            }
            text.push_str(&format!(
                "[handler_file]\nclass=FileHandler\nformatter=plain\nargs=({:?}, 'a', 'UTF-8')\n\n\
                 [formatter_plain]\nformat=%(name)s|%(levelname)s|%(message)s\n",
                self.log_file.display().to_string()
            ));

            let path = self.dir.path().join(file_name);
            fs::write(&path, text).unwrap();
            path
        }

        fn lines(&self) -> Vec<String> {
            fs::read_to_string(&self.log_file)
                .unwrap_or_default()
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    #[test]
    fn test_configure_missing_file_is_config_not_found() {
        let registry = LogRegistry::new();
        let result = registry.configure("missing.ini", &ConfigureOptions::default());
        assert!(matches!(result, Err(LogConfigError::ConfigNotFound { .. })));
        assert_eq!(registry.state(), ConfigState::NotConfigured);
    }

    #[test]
    fn test_configure_directory_is_config_not_found() {
        let fixture = Fixture::new();
        let registry = LogRegistry::new();
        let result = registry.configure(fixture.dir.path(), &ConfigureOptions::default());
        assert!(matches!(result, Err(LogConfigError::ConfigNotFound { .. })));
    }

    #[test]
    fn test_configure_writes_formatted_records() {
        let fixture = Fixture::new();
        let config = fixture.write_config("logging.ini", &[]);
        let registry = LogRegistry::new();

        registry.configure(&config, &ConfigureOptions::default()).unwrap();
        assert_eq!(registry.state(), ConfigState::Configured);

        let logger = registry.get_logger("tests.logging");
        logger.info("gotcha! logging was successful!");
        logger.debug("below the root level");

        assert_eq!(
            fixture.lines(),
            vec!["tests::logging|INFO|gotcha! logging was successful!"]
        );
    }

    #[test]
    fn test_child_logger_propagates_to_root_handlers() {
        let fixture = Fixture::new();
        let config = fixture.write_config("logging.ini", &[]);
        let registry = LogRegistry::new();
        registry.configure(&config, &ConfigureOptions::default()).unwrap();

        let child = registry.get_logger("tests").child("childlogger");
        assert_eq!(child.name(), "tests::childlogger");
        child.warning("gotcha! logging via child logger was successful!");

        assert_eq!(
            fixture.lines().last().map(String::as_str),
            Some("tests::childlogger|WARNING|gotcha! logging via child logger was successful!")
        );
    }

    #[test]
    fn test_reconfigure_without_disable_keeps_interim_loggers_enabled() {
        let fixture = Fixture::new();
        let config = fixture.write_config("logging.ini", &[]);
        let registry = LogRegistry::new();
        let options = ConfigureOptions::default().disable_existing(false);

        registry.configure(&config, &options).unwrap();
        let interim = registry.get_logger("created.between.calls");
        registry.configure(&config, &options).unwrap();

        assert!(!interim.is_disabled());
        interim.info("still here");
        assert_eq!(
            fixture.lines(),
            vec!["created::between::calls|INFO|still here"]
        );
    }

    #[test]
    fn test_disable_existing_disables_unnamed_loggers_only() {
        let fixture = Fixture::new();
        let config = fixture.write_config("logging.ini", &[("app", "app", "DEBUG", true)]);
        let registry = LogRegistry::new();

        let module_level = registry.get_logger("some_module");
        let named = registry.get_logger("app");
        let child_of_named = registry.get_logger("app.db");
        child_of_named.set_level(LogLevel::Error);

        registry
            .configure(&config, &ConfigureOptions::default().disable_existing(true))
            .unwrap();

        assert!(module_level.is_disabled());
        assert!(!named.is_disabled());
        assert!(!child_of_named.is_disabled());
        // Children of configured loggers fall back to inheriting.
        assert_eq!(child_of_named.level(), LogLevel::NotSet);
        assert_eq!(child_of_named.effective_level(), LogLevel::Debug);

        let created_after = registry.get_logger("late_module");
        assert!(!created_after.is_disabled());

        module_level.error("swallowed");
        child_of_named.debug("from child");
        created_after.info("from late module");
        assert_eq!(
            fixture.lines(),
            vec!["app::db|DEBUG|from child", "late_module|INFO|from late module"]
        );
    }

    #[test]
    fn test_reapplying_with_disable_existing_disables_interim_loggers() {
        let fixture = Fixture::new();
        let config = fixture.write_config("logging.ini", &[]);
        let registry = LogRegistry::new();
        let options = ConfigureOptions::default().disable_existing(true);

        registry.configure(&config, &options).unwrap();
        let interim = registry.get_logger("interim");
        assert!(!interim.is_disabled());

        registry.configure(&config, &options).unwrap();
        assert!(interim.is_disabled());

        // A later configuration without the flag re-enables it.
        registry
            .configure(&config, &ConfigureOptions::default())
            .unwrap();
        assert!(!interim.is_disabled());
    }

    #[test]
    fn test_propagate_zero_stops_at_logger() {
        let fixture = Fixture::new();
        let config = fixture.write_config("logging.ini", &[("quiet", "quiet", "INFO", false)]);
        let registry = LogRegistry::new();
        registry.configure(&config, &ConfigureOptions::default()).unwrap();

        registry.get_logger("quiet").warning("goes nowhere");
        registry.get_logger("quiet.sub").warning("also nowhere");
        registry.get_logger("loud").warning("reaches root");

        assert_eq!(fixture.lines(), vec!["loud|WARNING|reaches root"]);
    }

    #[test]
    fn test_effective_level_defaults_and_inheritance() {
        let registry = LogRegistry::new();
        let root = registry.root();
        assert_eq!(root.name(), "root");
        assert_eq!(root.effective_level(), LogLevel::Warning);

        let parent = registry.get_logger("parent");
        let child = registry.get_logger("parent::child");
        assert!(!child.is_enabled_for(LogLevel::Info));

        parent.set_level(LogLevel::Debug);
        assert_eq!(child.effective_level(), LogLevel::Debug);
        assert!(child.is_enabled_for(LogLevel::Info));
        assert!(!child.is_enabled_for(LogLevel::Trace));
    }

    #[test]
    fn test_invalid_configuration_leaves_state_untouched() {
        let fixture = Fixture::new();
        let path = fixture.dir.path().join("broken.ini");
        fs::write(&path, "[loggers]\nkeys=root\n[logger_root]\nlevel=LOUD\n").unwrap();

        let registry = LogRegistry::new();
        let result = registry.configure(&path, &ConfigureOptions::default());
        assert!(matches!(result, Err(LogConfigError::ConfigInvalid { .. })));
        assert_eq!(registry.state(), ConfigState::NotConfigured);
        assert_eq!(registry.root().level(), LogLevel::Warning);
    }

    #[test]
    fn test_unknown_encoding_is_invalid_argument() {
        let fixture = Fixture::new();
        let config = fixture.write_config("logging.ini", &[]);
        let registry = LogRegistry::new();
        let result = registry.configure(&config, &ConfigureOptions::default().encoding("EBCDIC-ish"));
        assert!(matches!(result, Err(LogConfigError::InvalidArgument(_))));
    }

    #[test]
    fn test_unwritable_log_file_is_handler_error() {
        let fixture = Fixture::new();
        let path = fixture.dir.path().join("bad_handler.ini");
        let target = fixture.dir.path().join("no-such-dir").join("x.log");
        fs::write(
            &path,
            format!(
                "[loggers]\nkeys=root\n[handlers]\nkeys=f\n[logger_root]\nhandlers=f\n\
                 [handler_f]\nclass=FileHandler\nargs=({:?},)\n",
                target.display().to_string()
            ),
        )
        .unwrap();

        let registry = LogRegistry::new();
        let result = registry.configure(&path, &ConfigureOptions::default());
        assert!(matches!(result, Err(LogConfigError::Handler { .. })));
    }

    #[test]
    fn test_name_normalization() {
        assert_eq!(normalize_name("root"), "");
        assert_eq!(normalize_name(" a.b.c "), "a::b::c");
        assert_eq!(normalize_name("a::b"), "a::b");
        assert!(is_descendant("a::b::c", "a::b"));
        assert!(!is_descendant("a::bc", "a::b"));

        let registry = LogRegistry::new();
        registry.get_logger("pkg.module");
        assert_eq!(registry.logger_names(), vec!["pkg::module"]);
    }
}
