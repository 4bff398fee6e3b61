//! Orchestrator settings.
//!
//! Everything here is optional; an absent settings file yields the defaults
//! for a stock fail2ban install guarding sshd. Ban policy numbers and stage
//! budgets are deliberately not configurable.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{ProvisionError, Result};
use crate::layout::{DEFAULT_SETTINGS, Layout};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Prefix under which every host path is resolved.
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default)]
    pub service: ServiceSettings,
    #[serde(default)]
    pub install: InstallSettings,
    #[serde(default)]
    pub ownership: Ownership,
    /// Group that may read the guarded log placeholder.
    #[serde(default = "default_log_group")]
    pub log_group: String,
}

/// Identity of the managed service and its collaborator binaries.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceSettings {
    #[serde(default = "default_unit")]
    pub unit: String,
    #[serde(default = "default_client")]
    pub client: String,
    #[serde(default = "default_server")]
    pub server: String,
    /// Name of the guard section in the rendered config.
    #[serde(default = "default_guard")]
    pub guard: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct InstallSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_package")]
    pub package: String,
}

/// Owner applied to repaired runtime paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Ownership {
    #[serde(default)]
    pub uid: u32,
    #[serde(default)]
    pub gid: u32,
}

fn default_root() -> PathBuf {
    PathBuf::from("/")
}

fn default_log_group() -> String {
    "adm".to_string()
}

fn default_unit() -> String {
    "fail2ban".to_string()
}

fn default_client() -> String {
    "fail2ban-client".to_string()
}

fn default_server() -> String {
    "fail2ban-server".to_string()
}

fn default_guard() -> String {
    "sshd".to_string()
}

fn default_package() -> String {
    "fail2ban".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            root: default_root(),
            service: ServiceSettings::default(),
            install: InstallSettings::default(),
            ownership: Ownership::default(),
            log_group: default_log_group(),
        }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            unit: default_unit(),
            client: default_client(),
            server: default_server(),
            guard: default_guard(),
        }
    }
}

impl Default for InstallSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            package: default_package(),
        }
    }
}

impl Settings {
    /// Parse a settings file. An empty file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| ProvisionError::SettingsRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &contents)
    }

    /// Load `explicit` if given; otherwise the default settings file when it
    /// exists, else built-in defaults.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => {
                let path = Path::new(DEFAULT_SETTINGS);
                if path.is_file() {
                    Self::load(path)
                } else {
                    debug!("No settings file at {}, using defaults", path.display());
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn parse(path: &Path, contents: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        let de = serde_yaml::Deserializer::from_str(contents);
        serde_path_to_error::deserialize(de).map_err(|source| ProvisionError::SettingsParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn layout(&self) -> Layout {
        Layout::rooted_at(&self.root)
    }
}
