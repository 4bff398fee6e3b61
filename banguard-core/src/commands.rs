//! Collaborator command lines.
//!
//! Builders only; nothing here executes anything.

use std::time::Duration;

use crate::exec::CommandSpec;
use crate::settings::ServiceSettings;

/// Per-invocation limit of the health probe.
pub const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(10);
/// Window the foreground capture is allowed to run before it is killed.
pub const FOREGROUND_WINDOW: Duration = Duration::from_secs(20);
/// Self-check and background start limit.
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);
/// Matches systemd's default start timeout.
pub const SYSTEMCTL_TIMEOUT: Duration = Duration::from_secs(90);
/// Read-only host queries (`ip`, `systemctl is-active`, `journalctl`).
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Destination used to discover the source address of the default route.
const ROUTE_PROBE_TARGET: &str = "1.1.1.1";
const JOURNAL_LINES: &str = "200";

fn systemctl(args: &[&str]) -> CommandSpec {
    CommandSpec::new("systemctl", args.iter().copied()).with_timeout(SYSTEMCTL_TIMEOUT)
}

pub fn route_source() -> CommandSpec {
    CommandSpec::new("ip", ["-4", "route", "get", ROUTE_PROBE_TARGET]).with_timeout(QUERY_TIMEOUT)
}

pub fn global_addresses() -> CommandSpec {
    CommandSpec::new("ip", ["-4", "-o", "addr", "show", "scope", "global"])
        .with_timeout(QUERY_TIMEOUT)
}

/// Canonical id of the SSH daemon unit (`ssh.service` on Debian-family hosts).
pub fn ssh_unit_id() -> CommandSpec {
    CommandSpec::new("systemctl", ["show", "-p", "Id", "--value", "sshd.service"])
        .with_timeout(QUERY_TIMEOUT)
}

pub fn unit_is_active(unit: &str) -> CommandSpec {
    CommandSpec::new("systemctl", ["is-active", "--quiet", unit]).with_timeout(QUERY_TIMEOUT)
}

impl ServiceSettings {
    pub fn self_check(&self) -> CommandSpec {
        CommandSpec::new(&self.client, ["-t"]).with_timeout(CLIENT_TIMEOUT)
    }

    pub fn health_probe(&self) -> CommandSpec {
        CommandSpec::new(&self.client, ["ping"]).with_timeout(HEALTH_PROBE_TIMEOUT)
    }

    pub fn background_start(&self) -> CommandSpec {
        CommandSpec::new(&self.client, ["-x", "start"]).with_timeout(CLIENT_TIMEOUT)
    }

    pub fn foreground_start(&self) -> CommandSpec {
        CommandSpec::new(&self.server, ["-f", "-x", "-v"]).with_timeout(FOREGROUND_WINDOW)
    }

    pub fn daemon_reload(&self) -> CommandSpec {
        systemctl(&["daemon-reload"])
    }

    pub fn reset_failed(&self) -> CommandSpec {
        systemctl(&["reset-failed", &self.unit])
    }

    pub fn enable(&self) -> CommandSpec {
        systemctl(&["enable", &self.unit])
    }

    pub fn start(&self) -> CommandSpec {
        systemctl(&["start", &self.unit])
    }

    pub fn restart(&self) -> CommandSpec {
        systemctl(&["restart", &self.unit])
    }

    pub fn is_active(&self) -> CommandSpec {
        unit_is_active(&self.unit)
    }

    pub fn status(&self) -> CommandSpec {
        CommandSpec::new("systemctl", ["status", self.unit.as_str(), "--no-pager", "-l"])
            .with_timeout(QUERY_TIMEOUT)
    }

    pub fn journal_excerpt(&self) -> CommandSpec {
        CommandSpec::new(
            "journalctl",
            ["-u", self.unit.as_str(), "-n", JOURNAL_LINES, "--no-pager"],
        )
        .with_timeout(QUERY_TIMEOUT)
    }
}
