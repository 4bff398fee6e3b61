//! Runtime filesystem precondition repair.
//!
//! Brings the daemon's runtime paths into the shape it expects at start-up.
//! Every step checks before it acts, so a second pass over a repaired host
//! records no actions.

use std::fmt;
use std::io;
use std::os::unix::fs::{FileTypeExt, symlink};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use banguard_unix::groups::lookup_gid;
use banguard_unix::ownership::{ensure_mode, ensure_owner};
use banguard_unix::process::pid_is_alive;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::layout::Layout;
use crate::settings::{Ownership, Settings};

const DIR_MODE: u32 = 0o755;
const LOG_MODE_GROUP: u32 = 0o640;
const LOG_MODE_PRIVATE: u32 = 0o600;

#[derive(Error, Debug)]
#[error("runtime state repair failed while {step} {path}: {source}")]
pub struct RepairError {
    pub step: &'static str,
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Something the repairer changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum RepairAction {
    RemovedNonDirectory { path: PathBuf },
    CreatedDirectory { path: PathBuf },
    FixedMode { path: PathBuf, mode: u32 },
    FixedOwner { path: PathBuf },
    LinkedLegacyPath { path: PathBuf, target: PathBuf },
    RemovedStaleSocket { path: PathBuf },
    RemovedStalePidFile { path: PathBuf },
    CreatedLogPlaceholder { path: PathBuf, mode: u32 },
}

impl fmt::Display for RepairAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepairAction::RemovedNonDirectory { path } => {
                write!(f, "removed non-directory {}", path.display())
            }
            RepairAction::CreatedDirectory { path } => write!(f, "created {}", path.display()),
            RepairAction::FixedMode { path, mode } => {
                write!(f, "set mode {:04o} on {}", mode, path.display())
            }
            RepairAction::FixedOwner { path } => write!(f, "fixed owner of {}", path.display()),
            RepairAction::LinkedLegacyPath { path, target } => {
                write!(f, "linked {} -> {}", path.display(), target.display())
            }
            RepairAction::RemovedStaleSocket { path } => {
                write!(f, "removed stale socket {}", path.display())
            }
            RepairAction::RemovedStalePidFile { path } => {
                write!(f, "removed stale pid file {}", path.display())
            }
            RepairAction::CreatedLogPlaceholder { path, mode } => {
                write!(f, "created placeholder {} ({:04o})", path.display(), mode)
            }
        }
    }
}

/// Result of one repair pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RuntimeState {
    pub actions: Vec<RepairAction>,
}

impl RuntimeState {
    pub fn is_noop(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Ownership applied to repaired paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepairPolicy {
    pub owner: Ownership,
    /// Group allowed to read the guarded log, when it exists on this host.
    pub log_gid: Option<u32>,
}

impl RepairPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        let log_gid = lookup_gid(&settings.log_group);
        if log_gid.is_none() {
            debug!("Group {} not found, log placeholder will be private", settings.log_group);
        }
        Self {
            owner: settings.ownership,
            log_gid,
        }
    }
}

/// How [`RuntimeStateRepairer`] treats a symlink where a directory belongs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkPolicy {
    /// The path itself must be a real directory.
    Replace,
    /// A link to a directory is accepted (state kept on another volume).
    Follow,
}

pub struct RuntimeStateRepairer<'a> {
    layout: &'a Layout,
    policy: RepairPolicy,
}

impl<'a> RuntimeStateRepairer<'a> {
    pub fn new(layout: &'a Layout, policy: RepairPolicy) -> Self {
        Self { layout, policy }
    }

    pub fn repair(&self) -> Result<RuntimeState, RepairError> {
        let mut actions = Vec::new();
        let layout = self.layout;

        self.ensure_directory(&layout.runtime_dir, LinkPolicy::Replace, &mut actions)?;
        self.ensure_legacy_alias(&mut actions)?;
        remove_stale_socket(&layout.socket(), &mut actions)?;
        remove_stale_pid(&layout.pid_file(), &mut actions)?;
        self.ensure_log_placeholder(&mut actions)?;
        self.ensure_directory(&layout.state_dir, LinkPolicy::Follow, &mut actions)?;

        if actions.is_empty() {
            debug!("Runtime state already consistent");
        } else {
            for action in &actions {
                info!("Repair: {}", action);
            }
        }
        Ok(RuntimeState { actions })
    }

    /// A directory with the configured owner and mode 0755. With
    /// [`LinkPolicy::Follow`] a symlink to a directory is accepted and the
    /// target is enforced instead.
    fn ensure_directory(
        &self,
        path: &Path,
        links: LinkPolicy,
        actions: &mut Vec<RepairAction>,
    ) -> Result<(), RepairError> {
        let meta = match links {
            LinkPolicy::Replace => path.symlink_metadata(),
            LinkPolicy::Follow => path.metadata(),
        };
        match meta {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                std::fs::remove_file(path).map_err(err("removing", path))?;
                actions.push(RepairAction::RemovedNonDirectory {
                    path: path.to_path_buf(),
                });
                create_dir(path, actions)?;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                // a dangling link when following
                if path.symlink_metadata().is_ok() {
                    std::fs::remove_file(path).map_err(err("removing", path))?;
                    actions.push(RepairAction::RemovedNonDirectory {
                        path: path.to_path_buf(),
                    });
                }
                create_dir(path, actions)?;
            }
            Err(e) => return Err(err("inspecting", path)(e)),
        }

        if ensure_mode(path, DIR_MODE).map_err(err("setting mode on", path))?.changed() {
            actions.push(RepairAction::FixedMode {
                path: path.to_path_buf(),
                mode: DIR_MODE,
            });
        }
        let owner = self.policy.owner;
        if ensure_owner(path, owner.uid, owner.gid)
            .map_err(err("setting owner on", path))?
            .changed()
        {
            actions.push(RepairAction::FixedOwner {
                path: path.to_path_buf(),
            });
        }
        Ok(())
    }

    fn ensure_legacy_alias(&self, actions: &mut Vec<RepairAction>) -> Result<(), RepairError> {
        let legacy = &self.layout.legacy_runtime_dir;
        let canonical = &self.layout.runtime_dir;

        // Covers both an existing link and a parent alias such as /var/run -> /run.
        if let (Ok(a), Ok(b)) = (legacy.canonicalize(), canonical.canonicalize())
            && a == b
        {
            return Ok(());
        }

        match legacy.symlink_metadata() {
            Ok(meta) if meta.is_dir() => {
                warn!("Replacing real directory {} with a link", legacy.display());
                std::fs::remove_dir_all(legacy).map_err(err("removing", legacy))?;
            }
            Ok(_) => std::fs::remove_file(legacy).map_err(err("removing", legacy))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(err("inspecting", legacy)(e)),
        }
        if let Some(parent) = legacy.parent() {
            std::fs::create_dir_all(parent).map_err(err("creating", parent))?;
        }
        symlink(canonical, legacy).map_err(err("linking", legacy))?;
        actions.push(RepairAction::LinkedLegacyPath {
            path: legacy.clone(),
            target: canonical.clone(),
        });
        Ok(())
    }

    fn ensure_log_placeholder(&self, actions: &mut Vec<RepairAction>) -> Result<(), RepairError> {
        let path = &self.layout.guarded_log;
        match path.symlink_metadata() {
            Ok(_) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(err("inspecting", path)(e)),
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(err("creating", parent))?;
        }
        std::fs::File::create(path).map_err(err("creating", path))?;

        let owner = self.policy.owner;
        let (mode, gid) = match self.policy.log_gid {
            Some(gid) => (LOG_MODE_GROUP, gid),
            None => (LOG_MODE_PRIVATE, owner.gid),
        };
        ensure_mode(path, mode).map_err(err("setting mode on", path))?;
        ensure_owner(path, owner.uid, gid).map_err(err("setting owner on", path))?;
        actions.push(RepairAction::CreatedLogPlaceholder {
            path: path.clone(),
            mode,
        });
        Ok(())
    }
}

fn create_dir(path: &Path, actions: &mut Vec<RepairAction>) -> Result<(), RepairError> {
    std::fs::create_dir_all(path).map_err(err("creating", path))?;
    actions.push(RepairAction::CreatedDirectory {
        path: path.to_path_buf(),
    });
    Ok(())
}

/// A socket nobody accepts connections on is left over from a dead daemon.
fn remove_stale_socket(path: &Path, actions: &mut Vec<RepairAction>) -> Result<(), RepairError> {
    let meta = match path.symlink_metadata() {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(err("inspecting", path)(e)),
    };
    if meta.file_type().is_socket() && UnixStream::connect(path).is_ok() {
        debug!("Socket {} is live, keeping it", path.display());
        return Ok(());
    }
    remove_entry(path, meta.is_dir())?;
    actions.push(RepairAction::RemovedStaleSocket {
        path: path.to_path_buf(),
    });
    Ok(())
}

fn remove_stale_pid(path: &Path, actions: &mut Vec<RepairAction>) -> Result<(), RepairError> {
    let is_dir = match path.symlink_metadata() {
        Ok(meta) => meta.is_dir(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(err("inspecting", path)(e)),
    };
    if !is_dir {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::InvalidData => String::new(),
            Err(e) => return Err(err("reading", path)(e)),
        };
        if let Ok(pid) = contents.trim().parse::<i32>()
            && pid_is_alive(pid)
        {
            debug!(pid, "Pid file names a live process, keeping it");
            return Ok(());
        }
    }
    remove_entry(path, is_dir)?;
    actions.push(RepairAction::RemovedStalePidFile {
        path: path.to_path_buf(),
    });
    Ok(())
}

/// Remove a file, link or a directory left where a file belongs.
fn remove_entry(path: &Path, is_dir: bool) -> Result<(), RepairError> {
    let removed = if is_dir {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    removed.map_err(err("removing", path))
}

fn err(step: &'static str, path: &Path) -> impl FnOnce(io::Error) -> RepairError {
    let path = path.to_path_buf();
    move |source| RepairError { step, path, source }
}
