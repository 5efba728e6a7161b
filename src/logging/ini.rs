// src/logging/ini.rs

//! Minimal INI reader for logging configuration files.
//!
//! Sections are `[name]`, entries are `key = value` or `key: value`. Keys are
//! case-insensitive, section names are not. Lines starting with `#` or `;` are
//! comments. An indented line continues the value of the previous entry.

use thiserror::Error;

/// A syntax error with its 1-based line number.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}: {reason}")]
pub struct IniError {
    /// 1-based line of the offending text.
    pub line: usize,
    /// What is wrong with it.
    pub reason: String,
}

/// One `[name]` block with its entries in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IniSection {
    /// Section name, case preserved.
    pub name: String,
    entries: Vec<(String, String)>,
}

impl IniSection {
    /// Value of `key`, compared case-insensitively.
    pub fn get(&self, key: &str) -> Option<&str> {
        let key = key.to_lowercase();
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// All sections of a parsed file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IniDocument {
    sections: Vec<IniSection>,
}

impl IniDocument {
    /// The section called exactly `name`.
    pub fn section(&self, name: &str) -> Option<&IniSection> {
        self.sections.iter().find(|s| s.name == name)
    }
}

/// Parses `text` into sections.
///
/// # Errors
///
/// Rejects entries before the first section, duplicate sections and lines
/// that are neither section, entry nor comment. A repeated key keeps the
/// last value.
pub fn parse(text: &str) -> Result<IniDocument, IniError> {
    let mut document = IniDocument::default();

    for (index, raw_line) in text.lines().enumerate() {
        let line_no = index + 1;
        let trimmed = raw_line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
            continue;
        }

        // Continuation of the previous value.
        if raw_line.starts_with(char::is_whitespace) {
            if let Some((_, value)) = document
                .sections
                .last_mut()
                .and_then(|section| section.entries.last_mut())
            {
                value.push('\n');
                value.push_str(trimmed);
                continue;
            }
        }

        if let Some(header) = trimmed.strip_prefix('[') {
            let name = header
                .strip_suffix(']')
                .ok_or_else(|| IniError {
                    line: line_no,
                    reason: format!("unterminated section header '{}'", trimmed),
                })?
                .trim();
            if name.is_empty() {
                return Err(IniError {
                    line: line_no,
                    reason: "empty section name".to_string(),
                });
            }
            if document.section(name).is_some() {
                return Err(IniError {
                    line: line_no,
                    reason: format!("section '{}' appears twice", name),
                });
            }
            document.sections.push(IniSection {
                name: name.to_string(),
                entries: Vec::new(),
            });
            continue;
        }

        let separator = trimmed.find(['=', ':']).ok_or_else(|| IniError {
            line: line_no,
            reason: format!("expected 'key = value', found '{}'", trimmed),
        })?;
        let (key, value) = trimmed.split_at(separator);
        let key = key.trim().to_lowercase();
        let value = value.get(1..).unwrap_or_default().trim().to_string();
        if key.is_empty() {
            return Err(IniError {
                line: line_no,
                reason: "entry without a key".to_string(),
            });
        }

        let section = document.sections.last_mut().ok_or_else(|| IniError {
            line: line_no,
            reason: format!("entry '{}' appears before any section header", key),
        })?;
        if let Some(existing) = section.entries.iter_mut().find(|(k, _)| *k == key) {
            existing.1 = value;
        } else {
            section.entries.push((key, value));
        }
    }

    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sections_and_entries() {
        let text = "\
# leading comment
[loggers]
keys=root,app

[formatter_plain]
format = %(asctime)s - %(name)s - %(message)s
datefmt: %H:%M:%S
";
        let doc = parse(text).unwrap();
        assert_eq!(doc.section("loggers").unwrap().get("keys"), Some("root,app"));
        let formatter = doc.section("formatter_plain").unwrap();
        assert_eq!(
            formatter.get("FORMAT"),
            Some("%(asctime)s - %(name)s - %(message)s")
        );
        assert_eq!(formatter.get("datefmt"), Some("%H:%M:%S"));
        assert!(doc.section("handlers").is_none());
    }

    #[test]
    fn test_continuation_lines_are_joined() {
        let doc = parse("[s]\nkey = first\n  second\n").unwrap();
        assert_eq!(doc.section("s").unwrap().get("key"), Some("first\nsecond"));
    }

    #[test]
    fn test_entry_before_section_is_rejected() {
        let err = parse("key=value\n[s]\n").unwrap_err();
        assert_eq!(err.line, 1);
    }

    #[test]
    fn test_malformed_lines_are_rejected() {
        assert_eq!(parse("[s]\njust words\n").unwrap_err().line, 2);
        assert_eq!(parse("[broken\n").unwrap_err().line, 1);
        assert_eq!(parse("[s]\n[s]\n").unwrap_err().line, 2);
        assert_eq!(parse("[s]\n= value\n").unwrap_err().line, 2);
    }
}
