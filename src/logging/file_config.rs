// src/logging/file_config.rs

//! The `fileConfig` layout: which loggers, handlers and formatters a
//! configuration file declares, validated but not yet applied.

use super::LogConfigError;
use super::format::Formatter;
use super::ini::{self, IniDocument, IniSection};
use super::level::LogLevel;
use super::registry::normalize_name;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Standard stream of a `StreamHandler`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamTarget {
    /// `sys.stdout`
    Stdout,
    /// `sys.stderr`, also the default.
    Stderr,
}

/// Handler classes understood by the loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerKind {
    /// `StreamHandler`
    Stream(StreamTarget),
    /// `FileHandler`; `append` is false for mode `w`.
    File {
        /// Target file, relative paths unchanged.
        path: PathBuf,
        /// Open mode `a` rather than `w`.
        append: bool,
    },
    /// `NullHandler`
    Null,
}

/// One `[handler_<key>]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerSpec {
    /// Key from the `[handlers]` list.
    pub key: String,
    /// What the handler writes to.
    pub kind: HandlerKind,
    /// Records below this level are dropped.
    pub level: LogLevel,
    /// Key of a `[formatter_<key>]` section.
    pub formatter: Option<String>,
}

/// One `[logger_<key>]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggerSpec {
    /// Key from the `[loggers]` list.
    pub key: String,
    /// Normalised logger name; empty for the root logger.
    pub qualname: String,
    /// `None` when the section has no `level`.
    pub level: Option<LogLevel>,
    /// Handler keys, in file order.
    pub handlers: Vec<String>,
    /// Whether records travel on to the parent's handlers.
    pub propagate: bool,
}

/// A parsed and cross-checked configuration file.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Formatters by key.
    pub formatters: HashMap<String, Formatter>,
    /// Handlers in `[handlers]` order.
    pub handlers: Vec<HandlerSpec>,
    /// `[logger_root]`
    pub root: LoggerSpec,
    /// Every other logger.
    pub loggers: Vec<LoggerSpec>,
}

impl LoggingConfig {
    /// Reads and validates the configuration file at `path`.
    pub fn load(path: &Path, encoding: &str) -> Result<Self, LogConfigError> {
        let bytes = fs::read(path).map_err(|e| LogConfigError::ConfigNotFound {
            path: path.to_path_buf(),
            source: e,
        })?;
        let text = decode(&bytes, encoding).map_err(|reason| match reason {
            DecodeError::UnknownEncoding(name) => LogConfigError::InvalidArgument(format!(
                "Unsupported configuration file encoding '{}'.",
                name
            )),
            DecodeError::Malformed(reason) => LogConfigError::ConfigInvalid {
                path: path.to_path_buf(),
                reason,
            },
        })?;
        Self::parse(&text).map_err(|reason| LogConfigError::ConfigInvalid {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Validates configuration text. Errors are plain reasons without a path.
    pub fn parse(text: &str) -> Result<Self, String> {
        let document = ini::parse(text).map_err(|e| e.to_string())?;

        let formatter_keys = list_keys(&document, "formatters", false)?;
        let handler_keys = list_keys(&document, "handlers", false)?;
        let logger_keys = list_keys(&document, "loggers", true)?;

        let mut formatters = HashMap::new();
        for key in &formatter_keys {
            let section = required_section(&document, &format!("formatter_{}", key))?;
            let formatter = Formatter::new(
                section.get("format").unwrap_or(Formatter::DEFAULT_FORMAT),
                section.get("datefmt"),
            )
            .map_err(|e| format!("[{}]: {}", section.name, e))?;
            formatters.insert(key.clone(), formatter);
        }

        let mut handlers = Vec::with_capacity(handler_keys.len());
        for key in &handler_keys {
            let section = required_section(&document, &format!("handler_{}", key))?;
            let formatter = section
                .get("formatter")
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(str::to_string);
            if let Some(formatter) = &formatter {
                if !formatters.contains_key(formatter) {
                    return Err(format!(
                        "handler '{}' uses undeclared formatter '{}'",
                        key, formatter
                    ));
                }
            }
            handlers.push(HandlerSpec {
                key: key.clone(),
                kind: parse_handler_kind(key, section)?,
                level: parse_optional_level(section)?.unwrap_or_default(),
                formatter,
            });
        }

        let mut root = None;
        let mut loggers = Vec::new();
        for key in &logger_keys {
            let section = required_section(&document, &format!("logger_{}", key))?;
            let logger = parse_logger(key, section, &handler_keys)?;
            if key == "root" {
                root = Some(logger);
            } else {
                loggers.push(logger);
            }
        }
        let root = root.ok_or_else(|| "the 'loggers' keys must include 'root'".to_string())?;

        Ok(Self {
            formatters,
            handlers,
            root,
            loggers,
        })
    }
}

enum DecodeError {
    UnknownEncoding(String),
    Malformed(String),
}

fn decode(bytes: &[u8], encoding: &str) -> Result<String, DecodeError> {
    let normalized: String = encoding
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase();
    match normalized.as_str() {
        "utf8" => {
            let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
            String::from_utf8(bytes.to_vec())
                .map_err(|e| DecodeError::Malformed(format!("not valid UTF-8: {}", e)))
        }
        "latin1" | "iso88591" => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
        "ascii" | "usascii" => {
            if let Some(pos) = bytes.iter().position(|b| !b.is_ascii()) {
                return Err(DecodeError::Malformed(format!(
                    "not valid ASCII: byte 0x{:02x} at offset {}",
                    bytes.get(pos).copied().unwrap_or_default(),
                    pos
                )));
            }
            Ok(bytes.iter().map(|&b| char::from(b)).collect())
        }
        _ => Err(DecodeError::UnknownEncoding(encoding.to_string())),
    }
}

fn list_keys(document: &IniDocument, section: &str, required: bool) -> Result<Vec<String>, String> {
    let Some(keys) = document.section(section).and_then(|s| s.get("keys")) else {
        if required {
            return Err(format!("section '[{}]' with a 'keys' entry is missing", section));
        }
        return Ok(Vec::new());
    };
    Ok(split_list(keys))
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn required_section<'a>(document: &'a IniDocument, name: &str) -> Result<&'a IniSection, String> {
    document
        .section(name)
        .ok_or_else(|| format!("section '[{}]' is missing", name))
}

fn parse_optional_level(section: &IniSection) -> Result<Option<LogLevel>, String> {
    match section.get("level").map(str::trim) {
        None | Some("") => Ok(None),
        Some(level) => level
            .parse()
            .map(Some)
            .map_err(|e| format!("[{}]: {}", section.name, e)),
    }
}

fn parse_logger(key: &str, section: &IniSection, handler_keys: &[String]) -> Result<LoggerSpec, String> {
    let qualname = if key == "root" {
        String::new()
    } else {
        let raw = section
            .get("qualname")
            .ok_or_else(|| format!("[{}]: 'qualname' is missing", section.name))?;
        let qualname = normalize_name(raw);
        if qualname.is_empty() {
            return Err(format!(
                "[{}]: 'qualname' must name a logger other than root",
                section.name
            ));
        }
        qualname
    };

    let handlers = section.get("handlers").map(split_list).unwrap_or_default();
    if let Some(unknown) = handlers.iter().find(|h| !handler_keys.contains(h)) {
        return Err(format!(
            "[{}]: uses undeclared handler '{}'",
            section.name, unknown
        ));
    }

    let propagate = match section.get("propagate").map(str::trim) {
        None | Some("1") | Some("") => true,
        Some("0") => false,
        Some(other) => match other.to_lowercase().as_str() {
            "true" | "yes" | "on" => true,
            "false" | "no" | "off" => false,
            _ => {
                return Err(format!(
                    "[{}]: 'propagate' must be 0 or 1, found '{}'",
                    section.name, other
                ));
            }
        },
    };

    Ok(LoggerSpec {
        key: key.to_string(),
        qualname,
        level: parse_optional_level(section)?,
        handlers,
        propagate,
    })
}

fn parse_handler_kind(key: &str, section: &IniSection) -> Result<HandlerKind, String> {
    let class = section
        .get("class")
        .map(str::trim)
        .ok_or_else(|| format!("[{}]: 'class' is missing", section.name))?;
    let class = class.strip_prefix("logging.").unwrap_or(class);
    let args = parse_args(section.get("args").unwrap_or("()"))
        .map_err(|e| format!("[{}]: {}", section.name, e))?;

    match class {
        "StreamHandler" => match args.first().map(String::as_str) {
            None | Some("sys.stderr") => Ok(HandlerKind::Stream(StreamTarget::Stderr)),
            Some("sys.stdout") => Ok(HandlerKind::Stream(StreamTarget::Stdout)),
            Some(other) => Err(format!(
                "[{}]: unsupported stream '{}' (use sys.stdout or sys.stderr)",
                section.name, other
            )),
        },
        "FileHandler" => {
            let filename = args
                .first()
                .ok_or_else(|| format!("[{}]: FileHandler needs a file name in 'args'", section.name))?;
            let append = match args.get(1).map(String::as_str) {
                None | Some("a") => true,
                Some("w") => false,
                Some(other) => {
                    return Err(format!("[{}]: unsupported file mode '{}'", section.name, other));
                }
            };
            if let Some(encoding) = args.get(2) {
                log::debug!(
                    "Handler '{}' asks for encoding '{}'; log files are always written as UTF-8.",
                    key,
                    encoding
                );
            }
            Ok(HandlerKind::File {
                path: PathBuf::from(filename),
                append,
            })
        }
        "NullHandler" => Ok(HandlerKind::Null),
        other => Err(format!("[{}]: unsupported handler class '{}'", section.name, other)),
    }
}

/// Splits a tuple literal such as `('app.log', 'a')` into unquoted values.
fn parse_args(raw: &str) -> Result<Vec<String>, String> {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| format!("'args' must be a parenthesised tuple, found '{}'", trimmed))?;

    let mut values = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut was_quoted = false;
    let mut chars = inner.chars();

    while let Some(c) = chars.next() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) if c == '\\' => match chars.next() {
                Some(escaped) => current.push(escaped),
                None => return Err("dangling escape in 'args'".to_string()),
            },
            Some(_) => current.push(c),
            None if c == '\'' || c == '"' => {
                quote = Some(c);
                was_quoted = true;
            }
            None if c == ',' => {
                push_arg(&mut values, &mut current, &mut was_quoted);
            }
            None if c.is_whitespace() && (was_quoted || current.is_empty()) => {}
            None => current.push(c),
        }
    }
    if quote.is_some() {
        return Err("unterminated string in 'args'".to_string());
    }
    push_arg(&mut values, &mut current, &mut was_quoted);
    Ok(values)
}

fn push_arg(values: &mut Vec<String>, current: &mut String, was_quoted: &mut bool) {
    let value = if *was_quoted {
        std::mem::take(current)
    } else {
        let trimmed = current.trim().to_string();
        current.clear();
        trimmed
    };
    if *was_quoted || !value.is_empty() {
        values.push(value);
    }
    *was_quoted = false;
}
