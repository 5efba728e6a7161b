// src/logging/format.rs

use super::level::LogLevel;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local};
use std::fmt::Write;
use std::path::Path;

/// A single log event as seen by handlers and formatters.
#[derive(Debug, Clone)]
pub struct LogRecord<'a> {
    /// Name of the logger that created the record.
    pub name: &'a str,
    /// Severity.
    pub level: LogLevel,
    /// The rendered message.
    pub message: &'a str,
    /// Rust module path, when the record came through the `log` facade.
    pub module_path: Option<&'a str>,
    /// Source file, when known.
    pub file: Option<&'a str>,
    /// Source line, when known.
    pub line: Option<u32>,
    /// Local creation time.
    pub created: DateTime<Local>,
}

impl<'a> LogRecord<'a> {
    /// A record created now, without source location.
    pub fn new(name: &'a str, level: LogLevel, message: &'a str) -> Self {
        Self {
            name,
            level,
            message,
            module_path: None,
            file: None,
            line: None,
            created: Local::now(),
        }
    }

    /// Last segment of the module path, or the stem of the source file.
    fn module(&self) -> &'a str {
        if let Some(module_path) = self.module_path {
            return module_path.rsplit("::").next().unwrap_or(module_path);
        }
        self.file
            .and_then(|file| Path::new(file).file_stem())
            .and_then(|stem| stem.to_str())
            .unwrap_or("unknown")
    }

    fn file_name(&self) -> &'a str {
        self.file
            .and_then(|file| Path::new(file).file_name())
            .and_then(|name| name.to_str())
            .unwrap_or("unknown")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    AscTime,
    Name,
    LevelName,
    LevelNo,
    Message,
    Module,
    FileName,
    LineNo,
    Process,
    ThreadName,
}

impl Field {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "asctime" => Some(Self::AscTime),
            "name" => Some(Self::Name),
            "levelname" => Some(Self::LevelName),
            "levelno" => Some(Self::LevelNo),
            "message" => Some(Self::Message),
            "module" => Some(Self::Module),
            "filename" => Some(Self::FileName),
            "lineno" => Some(Self::LineNo),
            "process" => Some(Self::Process),
            "threadName" => Some(Self::ThreadName),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Literal(String),
    Field {
        field: Field,
        width: usize,
        left_align: bool,
    },
}

/// Renders records with `%(name)s`-style placeholders.
///
/// Placeholders may carry a width, e.g. `%(levelname)-8s`.
#[derive(Debug, Clone)]
pub struct Formatter {
    pieces: Vec<Piece>,
    datefmt: Option<String>,
}

impl Default for Formatter {
    fn default() -> Self {
        Self {
            pieces: vec![Piece::Field {
                field: Field::Message,
                width: 0,
                left_align: false,
            }],
            datefmt: None,
        }
    }
}

impl Formatter {
    /// Used when a formatter section has no `format` key.
    pub const DEFAULT_FORMAT: &'static str = "%(message)s";

    /// Compiles `format` and checks `datefmt`.
    ///
    /// # Errors
    ///
    /// Returns a description of the first unknown field, malformed
    /// placeholder or invalid strftime directive.
    pub fn new(format: &str, datefmt: Option<&str>) -> Result<Self, String> {
        let datefmt = datefmt.map(str::trim).filter(|f| !f.is_empty());
        if let Some(datefmt) = datefmt {
            if StrftimeItems::new(datefmt).any(|item| matches!(item, Item::Error)) {
                return Err(format!("invalid date format '{}'", datefmt));
            }
        }
        Ok(Self {
            pieces: parse_format(format)?,
            datefmt: datefmt.map(str::to_string),
        })
    }

    /// The strftime pattern for `%(asctime)s`, if one was configured.
    pub fn datefmt(&self) -> Option<&str> {
        self.datefmt.as_deref()
    }

    /// Renders `record` as one line, without a trailing newline.
    pub fn format(&self, record: &LogRecord<'_>) -> String {
        let mut out = String::with_capacity(record.message.len() + 64);
        for piece in &self.pieces {
            match piece {
                Piece::Literal(text) => out.push_str(text),
                Piece::Field {
                    field,
                    width,
                    left_align,
                } => {
                    let value = self.render_field(*field, record);
                    if *left_align {
                        let _ = write!(out, "{:<width$}", value, width = *width);
                    } else {
                        let _ = write!(out, "{:>width$}", value, width = *width);
                    }
                }
            }
        }
        out
    }

    fn render_field(&self, field: Field, record: &LogRecord<'_>) -> String {
        match field {
            Field::AscTime => self.format_time(&record.created),
            Field::Name => record.name.to_string(),
            Field::LevelName => record.level.name().to_string(),
            Field::LevelNo => record.level.value().to_string(),
            Field::Message => record.message.to_string(),
            Field::Module => record.module().to_string(),
            Field::FileName => record.file_name().to_string(),
            Field::LineNo => record.line.unwrap_or(0).to_string(),
            Field::Process => std::process::id().to_string(),
            Field::ThreadName => std::thread::current()
                .name()
                .unwrap_or("unnamed")
                .to_string(),
        }
    }

    fn format_time(&self, created: &DateTime<Local>) -> String {
        let mut out = String::new();
        match &self.datefmt {
            Some(datefmt) => {
                let _ = write!(out, "{}", created.format_with_items(StrftimeItems::new(datefmt)));
            }
            None => {
                let _ = write!(
                    out,
                    "{},{:03}",
                    created.format("%Y-%m-%d %H:%M:%S"),
                    created.timestamp_subsec_millis()
                );
            }
        }
        out
    }
}

fn parse_format(format: &str) -> Result<Vec<Piece>, String> {
    let mut pieces = Vec::new();
    let mut literal = String::new();
    let mut chars = format.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            literal.push(c);
            continue;
        }
        match chars.peek() {
            Some('%') => {
                chars.next();
                literal.push('%');
            }
            Some('(') => {
                chars.next();
                let name: String = chars.by_ref().take_while(|&ch| ch != ')').collect();
                let field = Field::from_name(&name)
                    .ok_or_else(|| format!("unknown placeholder '%({})'", name))?;

                let left_align = chars.next_if_eq(&'-').is_some();
                let mut digits = String::new();
                while let Some(digit) = chars.next_if(|ch| ch.is_ascii_digit()) {
                    digits.push(digit);
                }
                // Precision is accepted but has no effect.
                if chars.next_if_eq(&'.').is_some() {
                    while chars.next_if(|ch| ch.is_ascii_digit()).is_some() {}
                }
                match chars.next() {
                    Some(conv) if "sdirf".contains(conv) => {}
                    other => {
                        return Err(format!(
                            "placeholder '%({})' lacks a conversion character (found {:?})",
                            name, other
                        ));
                    }
                }

                if !literal.is_empty() {
                    pieces.push(Piece::Literal(std::mem::take(&mut literal)));
                }
                pieces.push(Piece::Field {
                    field,
                    width: digits.parse().unwrap_or(0),
                    left_align,
                });
            }
            _ => literal.push('%'),
        }
    }

    if !literal.is_empty() {
        pieces.push(Piece::Literal(literal));
    }
    Ok(pieces)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record<'a>(message: &'a str) -> LogRecord<'a> {
        LogRecord {
            name: "app::db",
            level: LogLevel::Warning,
            message,
            module_path: Some("scripting_toolbox::system::executor"),
            file: Some("src/system/executor.rs"),
            line: Some(42),
            created: Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap(),
        }
    }

    #[test]
    fn test_format_common_fields() {
        let formatter = Formatter::new(
            "%(name)s - %(levelname)s - %(module)s:%(lineno)d - %(message)s",
            None,
        )
        .unwrap();
        assert_eq!(
            formatter.format(&record("hello")),
            "app::db - WARNING - executor:42 - hello"
        );
    }

    #[test]
    fn test_format_with_datefmt_and_width() {
        let formatter =
            Formatter::new("[%(asctime)s] %(levelname)-8s|%(filename)s", Some("%H:%M:%S")).unwrap();
        assert_eq!(
            formatter.format(&record("ignored")),
            "[14:05:07] WARNING |executor.rs"
        );
    }

    #[test]
    fn test_default_asctime_has_millis() {
        let formatter = Formatter::new("%(asctime)s", None).unwrap();
        assert_eq!(formatter.format(&record("x")), "2024-03-09 14:05:07,000");
    }

    #[test]
    fn test_percent_escapes_and_stray_percent() {
        let formatter = Formatter::new("100%% done % %(message)s", Some("")).unwrap();
        assert_eq!(formatter.format(&record("ok")), "100% done % ok");
    }

    #[test]
    fn test_rejects_unknown_placeholder_and_bad_datefmt() {
        assert!(Formatter::new("%(nonsense)s", None).is_err());
        assert!(Formatter::new("%(message)", None).is_err());
        assert!(Formatter::new("%(message)s", Some("%Q")).is_err());
    }

    #[test]
    fn test_default_formatter_prints_message_only() {
        assert_eq!(Formatter::default().format(&record("plain")), "plain");
    }
}
