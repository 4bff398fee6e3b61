//! Service configuration model, rendering and synthesis policy.
//!
//! This module provides:
//! - `ServiceConfig` - structured form of the rendered jail configuration
//! - `Policy` - fixed ban policy plus operator carry-forward
//! - `synthesize` - deterministic facts + policy -> config mapping

mod ini;
mod policy;

pub use ini::{IniDocument, IniError, IniSection};
pub use policy::{Policy, synthesize};

use std::fmt::Write as _;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

const HEADER: &str = "# Managed by banguard. bantime, findtime and maxretry edits in [DEFAULT]\n\
                      # are kept on re-run; anything else is regenerated.\n";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceConfig {
    pub default: DefaultSection,
    pub guards: Vec<GuardSection>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DefaultSection {
    /// Seconds; negative means permanent.
    pub bantime: i64,
    pub findtime: u64,
    pub maxretry: u32,
    pub backend: Backend,
    pub dbfile: PathBuf,
    pub ignoreip: Vec<String>,
    pub banaction: String,
    pub loglevel: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Auto,
    Systemd,
}

impl Backend {
    pub fn as_str(self) -> &'static str {
        match self {
            Backend::Auto => "auto",
            Backend::Systemd => "systemd",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "auto" => Some(Backend::Auto),
            "systemd" => Some(Backend::Systemd),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuardSection {
    pub name: String,
    pub enabled: bool,
    pub port: String,
    pub source: LogSource,
    pub maxretry: u32,
}

/// Where a guard reads its events. Exactly one per guard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSource {
    LogPath(PathBuf),
    JournalMatch(String),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigParseError {
    #[error(transparent)]
    Ini(#[from] IniError),
    #[error("missing [DEFAULT] section")]
    NoDefault,
    #[error("[{section}] is missing `{key}`")]
    Missing { section: String, key: String },
    #[error("[{section}] `{key}` has invalid value '{value}'")]
    Invalid {
        section: String,
        key: String,
        value: String,
    },
    #[error("[{section}] must set exactly one of logpath or journalmatch")]
    LogSource { section: String },
}

impl ServiceConfig {
    pub fn render(&self) -> String {
        let d = &self.default;
        let mut out = String::from(HEADER);
        out.push_str("\n[DEFAULT]\n");
        let _ = writeln!(out, "bantime = {}", d.bantime);
        let _ = writeln!(out, "findtime = {}", d.findtime);
        let _ = writeln!(out, "maxretry = {}", d.maxretry);
        let _ = writeln!(out, "backend = {}", d.backend.as_str());
        let _ = writeln!(out, "dbfile = {}", d.dbfile.display());
        let _ = writeln!(out, "ignoreip = {}", d.ignoreip.join(" "));
        let _ = writeln!(out, "banaction = {}", d.banaction);
        let _ = writeln!(out, "loglevel = {}", d.loglevel);

        for guard in &self.guards {
            let _ = writeln!(out, "\n[{}]", guard.name);
            let _ = writeln!(out, "enabled = {}", guard.enabled);
            let _ = writeln!(out, "port = {}", guard.port);
            match &guard.source {
                LogSource::LogPath(path) => {
                    let _ = writeln!(out, "logpath = {}", path.display());
                }
                LogSource::JournalMatch(expr) => {
                    let _ = writeln!(out, "journalmatch = {}", expr);
                }
            }
            let _ = writeln!(out, "maxretry = {}", guard.maxretry);
        }
        out
    }

    /// Parse a rendered configuration back into structure.
    pub fn parse(text: &str) -> Result<Self, ConfigParseError> {
        let doc = IniDocument::parse(text)?;
        let section = doc.section("DEFAULT").ok_or(ConfigParseError::NoDefault)?;
        let default = DefaultSection {
            bantime: field(section, "bantime", |v| v.parse().ok())?,
            findtime: field(section, "findtime", |v| v.parse().ok())?,
            maxretry: field(section, "maxretry", |v| v.parse().ok())?,
            backend: field(section, "backend", Backend::parse)?,
            dbfile: field(section, "dbfile", |v| Some(PathBuf::from(v)))?,
            ignoreip: field(section, "ignoreip", |v| {
                Some(v.split_whitespace().map(str::to_string).collect())
            })?,
            banaction: field(section, "banaction", |v| Some(v.to_string()))?,
            loglevel: field(section, "loglevel", |v| Some(v.to_string()))?,
        };

        let mut guards = Vec::new();
        for section in doc.sections().iter().filter(|s| s.name != "DEFAULT") {
            let source = match (section.get("logpath"), section.get("journalmatch")) {
                (Some(path), None) => LogSource::LogPath(PathBuf::from(path)),
                (None, Some(expr)) => LogSource::JournalMatch(expr.to_string()),
                _ => {
                    return Err(ConfigParseError::LogSource {
                        section: section.name.clone(),
                    });
                }
            };
            guards.push(GuardSection {
                name: section.name.clone(),
                enabled: field(section, "enabled", parse_bool)?,
                port: field(section, "port", |v| Some(v.to_string()))?,
                source,
                maxretry: field(section, "maxretry", |v| v.parse().ok())?,
            });
        }
        Ok(ServiceConfig { default, guards })
    }
}

fn field<T>(
    section: &IniSection,
    key: &str,
    parse: impl FnOnce(&str) -> Option<T>,
) -> Result<T, ConfigParseError> {
    let value = section.get(key).ok_or_else(|| ConfigParseError::Missing {
        section: section.name.clone(),
        key: key.to_string(),
    })?;
    parse(value).ok_or_else(|| ConfigParseError::Invalid {
        section: section.name.clone(),
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}
