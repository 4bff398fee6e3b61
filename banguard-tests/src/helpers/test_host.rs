//! Throwaway host root for provisioning runs

use banguard_core::clock::ManualClock;
use banguard_core::exec::CommandRunner;
use banguard_core::layout::Layout;
use banguard_core::poll::CancelFlag;
use banguard_core::settings::Ownership;
use banguard_core::{Provisioner, Result, RunReport, Settings};
use chrono::{TimeZone, Utc};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A temp directory laid out like a host, owned by the invoking user so
/// repairs never need real root.
pub struct TestHost {
    dir: TempDir,
    pub settings: Settings,
    pub clock: ManualClock,
    pub cancel: CancelFlag,
}

impl TestHost {
    /// Host with an sshd config on port 2222, a populated auth log and an
    /// os-release file.
    pub fn new() -> Self {
        let host = Self::empty();
        host.write("/etc/ssh/sshd_config", "Port 2222\nPermitRootLogin no\n");
        host.write("/var/log/auth.log", "May  1 00:00:01 host sshd[42]: Server listening\n");
        host.write(
            "/etc/os-release",
            "ID=debian\nVERSION_ID=\"12\"\nPRETTY_NAME=\"Debian GNU/Linux 12 (bookworm)\"\n",
        );
        host
    }

    /// Host with nothing on it
    pub fn empty() -> Self {
        let dir = TempDir::new().expect("create temp host root");
        let (uid, gid) = banguard_unix::current_ids();
        let settings = Settings {
            root: dir.path().to_path_buf(),
            ownership: Ownership { uid, gid },
            log_group: gid.to_string(),
            ..Settings::default()
        };
        Self {
            dir,
            settings,
            clock: ManualClock::starting_at(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()),
            cancel: CancelFlag::new(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn layout(&self) -> Layout {
        self.settings.layout()
    }

    /// Path of an absolute host path inside this root
    pub fn path(&self, host_path: &str) -> PathBuf {
        self.layout().host_path(Path::new(host_path))
    }

    pub fn write(&self, host_path: &str, contents: &str) {
        let path = self.path(host_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent");
        }
        std::fs::write(&path, contents).expect("write host file");
    }

    pub fn read(&self, host_path: &str) -> String {
        std::fs::read_to_string(self.path(host_path)).expect("read host file")
    }

    pub fn exists(&self, host_path: &str) -> bool {
        self.path(host_path).symlink_metadata().is_ok()
    }

    /// Entries of a host directory, sorted by name
    pub fn list(&self, host_path: &str) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.path(host_path))
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    pub fn provisioner<'a, R: CommandRunner>(
        &'a self,
        runner: &'a R,
    ) -> Provisioner<'a, R, ManualClock> {
        Provisioner::new(&self.settings, runner, &self.clock)
            .privileged(true)
            .with_cancel(self.cancel.clone())
    }

    /// Full privileged provisioning run
    pub async fn run<R: CommandRunner>(&self, runner: &R) -> Result<RunReport> {
        self.provisioner(runner).run().await
    }
}

impl Default for TestHost {
    fn default() -> Self {
        Self::new()
    }
}
