//! Writing the synthesized configuration to disk.

use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::backup::backup_file;
use crate::config::{IniDocument, Policy, ServiceConfig, synthesize};
use crate::errors::{ProvisionError, Result};
use crate::facts::HostFacts;

const CONFIG_MODE: u32 = 0o644;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    pub path: PathBuf,
    pub backup: Option<PathBuf>,
    /// False when the file already held exactly this configuration.
    pub changed: bool,
}

pub struct ConfigSynthesizer<'a> {
    path: &'a Path,
    guard: &'a str,
}

impl<'a> ConfigSynthesizer<'a> {
    pub fn new(path: &'a Path, guard: &'a str) -> Self {
        Self { path, guard }
    }

    /// Policy for this host, honouring edits in the currently written file.
    pub fn policy(&self) -> Policy {
        let policy = Policy::for_guard(self.guard);
        match self.existing() {
            Some(doc) => policy.with_overrides_from(&doc),
            None => policy,
        }
    }

    pub fn synthesize(&self, facts: &HostFacts) -> ServiceConfig {
        synthesize(facts, &self.policy())
    }

    fn existing(&self) -> Option<IniDocument> {
        let text = std::fs::read_to_string(self.path).ok()?;
        match IniDocument::parse(&text) {
            Ok(doc) => Some(doc),
            Err(e) => {
                warn!("Ignoring unreadable existing {}: {}", self.path.display(), e);
                None
            }
        }
    }

    /// Back up any prior file, then replace it atomically.
    pub fn write(&self, config: &ServiceConfig, now: DateTime<Utc>) -> Result<WriteOutcome> {
        let rendered = config.render();
        if std::fs::read_to_string(self.path).is_ok_and(|current| current == rendered) {
            info!("{} already up to date", self.path.display());
            return Ok(WriteOutcome {
                path: self.path.to_path_buf(),
                backup: None,
                changed: false,
            });
        }

        let backup = backup_file(self.path, now).map_err(|e| self.write_error(e))?;
        write_atomic(self.path, rendered.as_bytes(), CONFIG_MODE).map_err(|e| self.write_error(e))?;
        info!("Wrote {}", self.path.display());

        Ok(WriteOutcome {
            path: self.path.to_path_buf(),
            backup,
            changed: true,
        })
    }

    fn write_error(&self, source: io::Error) -> ProvisionError {
        ProvisionError::ConfigWrite {
            path: self.path.to_path_buf(),
            source,
        }
    }
}

/// Write through a temp file in the target directory and rename into place.
pub(crate) fn write_atomic(path: &Path, content: &[u8], mode: u32) -> io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"))?;
    std::fs::create_dir_all(parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.as_file().set_permissions(std::fs::Permissions::from_mode(mode))?;
    tmp.write_all(content)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
