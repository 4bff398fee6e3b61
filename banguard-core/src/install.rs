//! Ensures the daemon package is present.

use std::time::Duration;

use tracing::{info, warn};

use crate::errors::{ProvisionError, Result};
use crate::exec::{CommandRunner, CommandSpec};
use crate::settings::{InstallSettings, ServiceSettings};

const INSTALL_TIMEOUT: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Apt,
    Dnf,
    Yum,
    Zypper,
}

impl PackageManager {
    const PROBE_ORDER: [PackageManager; 4] = [
        PackageManager::Apt,
        PackageManager::Dnf,
        PackageManager::Yum,
        PackageManager::Zypper,
    ];

    pub fn program(self) -> &'static str {
        match self {
            PackageManager::Apt => "apt-get",
            PackageManager::Dnf => "dnf",
            PackageManager::Yum => "yum",
            PackageManager::Zypper => "zypper",
        }
    }

    /// Commands run in order to install `package`.
    pub fn install_commands(self, package: &str) -> Vec<CommandSpec> {
        let spec = |args: &[&str]| {
            CommandSpec::new(self.program(), args.iter().copied()).with_timeout(INSTALL_TIMEOUT)
        };
        match self {
            PackageManager::Apt => vec![
                spec(&["update"]).with_env("DEBIAN_FRONTEND", "noninteractive"),
                spec(&["install", "-y", package]).with_env("DEBIAN_FRONTEND", "noninteractive"),
            ],
            PackageManager::Dnf | PackageManager::Yum => vec![spec(&["install", "-y", package])],
            PackageManager::Zypper => vec![spec(&["--non-interactive", "install", package])],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    AlreadyPresent,
    Installed(PackageManager),
    Disabled,
}

pub struct PackageInstaller<'a, R> {
    runner: &'a R,
    install: &'a InstallSettings,
    service: &'a ServiceSettings,
}

impl<'a, R: CommandRunner> PackageInstaller<'a, R> {
    pub fn new(runner: &'a R, install: &'a InstallSettings, service: &'a ServiceSettings) -> Self {
        Self {
            runner,
            install,
            service,
        }
    }

    pub async fn ensure_installed(&self) -> Result<InstallOutcome> {
        if !self.install.enabled {
            info!("Package installation disabled");
            return Ok(InstallOutcome::Disabled);
        }
        if let Some(path) = self.runner.locate(&self.service.client) {
            info!("{} already installed at {}", self.install.package, path.display());
            return Ok(InstallOutcome::AlreadyPresent);
        }

        let manager = PackageManager::PROBE_ORDER
            .into_iter()
            .find(|m| self.runner.locate(m.program()).is_some())
            .ok_or_else(|| self.failure("no supported package manager found".to_string()))?;

        info!("Installing {} with {}", self.install.package, manager.program());
        for spec in manager.install_commands(&self.install.package) {
            match self.runner.run(&spec).await {
                Ok(out) if out.success() => {}
                Ok(out) => {
                    warn!("`{}` failed: {}", spec, out.combined());
                    return Err(self.failure(format!("`{}` {}", spec, out.describe_exit())));
                }
                Err(e) => return Err(self.failure(format!("`{}` could not run: {}", spec, e))),
            }
        }

        if self.runner.locate(&self.service.client).is_none() {
            return Err(self.failure(format!(
                "{} still not found after install",
                self.service.client
            )));
        }
        Ok(InstallOutcome::Installed(manager))
    }

    fn failure(&self, reason: String) -> ProvisionError {
        ProvisionError::DependencyInstall {
            package: self.install.package.clone(),
            reason,
        }
    }
}
