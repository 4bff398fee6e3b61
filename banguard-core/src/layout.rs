//! Well-known host paths.
//!
//! Every path the orchestrator reads or writes is listed here once. A
//! [`Layout`] can be re-rooted under another directory (chroot-style installs
//! and tests); relative structure is preserved.

use std::path::{Path, PathBuf};

use serde::Serialize;

pub const JAIL_CONFIG: &str = "/etc/fail2ban/jail.local";
pub const RUNTIME_DIR: &str = "/run/fail2ban";
pub const LEGACY_RUNTIME_DIR: &str = "/var/run/fail2ban";
pub const SOCKET_NAME: &str = "fail2ban.sock";
pub const PID_NAME: &str = "fail2ban.pid";
pub const GUARDED_LOG: &str = "/var/log/auth.log";
pub const STATE_DIR: &str = "/var/lib/fail2ban";
pub const DB_NAME: &str = "fail2ban.sqlite3";
pub const SSHD_CONFIG: &str = "/etc/ssh/sshd_config";
pub const OS_RELEASE: &str = "/etc/os-release";
pub const SYSTEMD_UNIT_DIR: &str = "/etc/systemd/system";
pub const INSTALL_LOG: &str = "/var/log/banguard/install.log";
pub const DIAGNOSTICS_REPORT: &str = "/var/log/banguard/diagnostics.report";
pub const LOCK_FILE: &str = "/run/banguard.lock";
pub const DEFAULT_SETTINGS: &str = "/etc/banguard/settings.yaml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Layout {
    root: PathBuf,
    pub jail_config: PathBuf,
    pub runtime_dir: PathBuf,
    pub legacy_runtime_dir: PathBuf,
    pub guarded_log: PathBuf,
    pub state_dir: PathBuf,
    pub sshd_config: PathBuf,
    pub os_release: PathBuf,
    pub systemd_unit_dir: PathBuf,
    pub install_log: PathBuf,
    pub diagnostics_report: PathBuf,
    pub lock_file: PathBuf,
}

impl Default for Layout {
    fn default() -> Self {
        Self::rooted_at(Path::new("/"))
    }
}

impl Layout {
    /// Build the layout with every well-known path placed under `root`.
    pub fn rooted_at(root: &Path) -> Self {
        let at = |p: &str| reroot(root, Path::new(p));
        Self {
            root: root.to_path_buf(),
            jail_config: at(JAIL_CONFIG),
            runtime_dir: at(RUNTIME_DIR),
            legacy_runtime_dir: at(LEGACY_RUNTIME_DIR),
            guarded_log: at(GUARDED_LOG),
            state_dir: at(STATE_DIR),
            sshd_config: at(SSHD_CONFIG),
            os_release: at(OS_RELEASE),
            systemd_unit_dir: at(SYSTEMD_UNIT_DIR),
            install_log: at(INSTALL_LOG),
            diagnostics_report: at(DIAGNOSTICS_REPORT),
            lock_file: at(LOCK_FILE),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn socket(&self) -> PathBuf {
        self.runtime_dir.join(SOCKET_NAME)
    }

    pub fn pid_file(&self) -> PathBuf {
        self.runtime_dir.join(PID_NAME)
    }

    pub fn db_file(&self) -> PathBuf {
        self.state_dir.join(DB_NAME)
    }

    /// Directory holding drop-in overrides for `unit`.
    pub fn unit_dropin_dir(&self, unit: &str) -> PathBuf {
        self.systemd_unit_dir.join(format!("{}.service.d", unit))
    }

    /// `sshd_config.d`, resolved next to the main sshd config.
    pub fn sshd_config_dir(&self) -> PathBuf {
        self.sshd_config
            .parent()
            .map(|p| p.join("sshd_config.d"))
            .unwrap_or_else(|| PathBuf::from("sshd_config.d"))
    }

    /// Re-root an absolute host path the way the layout's own paths are.
    pub fn host_path(&self, path: &Path) -> PathBuf {
        reroot(&self.root, path)
    }
}

fn reroot(root: &Path, path: &Path) -> PathBuf {
    match path.strip_prefix("/") {
        Ok(relative) => root.join(relative),
        Err(_) => root.join(path),
    }
}
