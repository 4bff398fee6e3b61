//! Minimal reader for the daemon's INI dialect.
//!
//! Supports `[section]` headers, `key = value` or `key: value` pairs,
//! `#`/`;` comment lines and indented continuation lines.

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum IniError {
    #[error("line {line}: entry outside of any section")]
    NoSection { line: usize },
    #[error("line {line}: expected `key = value`")]
    Malformed { line: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IniDocument {
    sections: Vec<IniSection>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IniSection {
    pub name: String,
    pub entries: Vec<(String, String)>,
}

impl IniSection {
    /// Last assignment wins, as in the daemon.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

impl IniDocument {
    pub fn parse(text: &str) -> Result<Self, IniError> {
        let mut doc = IniDocument::default();
        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
                continue;
            }

            if raw.starts_with([' ', '\t']) {
                let entry = doc
                    .sections
                    .last_mut()
                    .and_then(|s| s.entries.last_mut())
                    .ok_or(IniError::Malformed { line: line_no })?;
                if !entry.1.is_empty() {
                    entry.1.push('\n');
                }
                entry.1.push_str(trimmed);
                continue;
            }

            if let Some(name) = trimmed.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
                doc.sections.push(IniSection {
                    name: name.trim().to_string(),
                    entries: Vec::new(),
                });
                continue;
            }

            let Some(split) = trimmed.find(['=', ':']) else {
                return Err(IniError::Malformed { line: line_no });
            };
            let key = trimmed[..split].trim();
            if key.is_empty() {
                return Err(IniError::Malformed { line: line_no });
            }
            let value = trimmed[split + 1..].trim();
            let section = doc
                .sections
                .last_mut()
                .ok_or(IniError::NoSection { line: line_no })?;
            section.entries.push((key.to_string(), value.to_string()));
        }
        Ok(doc)
    }

    pub fn section(&self, name: &str) -> Option<&IniSection> {
        self.sections.iter().rev().find(|s| s.name == name)
    }

    pub fn sections(&self) -> &[IniSection] {
        &self.sections
    }
}
