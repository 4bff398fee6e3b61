//! Host facts gathered once per run.

use std::fmt;
use std::net::Ipv4Addr;

use serde::Serialize;

/// Immutable snapshot of the host, produced by [`crate::probe::EnvironmentProbe`]
/// and threaded through every later step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostFacts {
    pub primary_ipv4: Option<Ipv4Addr>,
    pub ssh_port: SshPort,
    /// Systemd unit of the SSH daemon, used for journal matching.
    pub ssh_unit: String,
    pub firewall: FirewallBackend,
    pub log_backend: LogBackend,
    pub os_release: Option<OsRelease>,
    /// Probes that fell back to a default.
    pub degraded: Vec<ProbeDegraded>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SshPort {
    Number(u16),
    /// Well-known service name, resolved by the daemon (`ssh`).
    Named(String),
}

impl SshPort {
    pub fn default_named() -> Self {
        SshPort::Named("ssh".to_string())
    }
}

impl fmt::Display for SshPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SshPort::Number(n) => write!(f, "{}", n),
            SshPort::Named(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FirewallBackend {
    Nftables,
    Ufw,
    GenericMultiport,
}

impl FirewallBackend {
    /// nftables wins over ufw; neither active means plain multiport rules.
    pub fn from_active_units(nftables: bool, ufw: bool) -> Self {
        match (nftables, ufw) {
            (true, _) => FirewallBackend::Nftables,
            (false, true) => FirewallBackend::Ufw,
            (false, false) => FirewallBackend::GenericMultiport,
        }
    }

    /// Ban action name understood by the daemon.
    pub fn ban_action(self) -> &'static str {
        match self {
            FirewallBackend::Nftables => "nftables-multiport",
            FirewallBackend::Ufw => "ufw",
            FirewallBackend::GenericMultiport => "iptables-multiport",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogBackend {
    FlatFile,
    Journal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OsRelease {
    pub id: Option<String>,
    pub version_id: Option<String>,
    pub pretty_name: Option<String>,
}

/// A probe that could not determine its fact and used a fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "probe", content = "reason", rename_all = "kebab-case")]
pub enum ProbeDegraded {
    PrimaryAddress(String),
    SshPort(String),
    SshUnit(String),
    Firewall(String),
    OsRelease(String),
}

impl fmt::Display for ProbeDegraded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (probe, reason) = match self {
            ProbeDegraded::PrimaryAddress(r) => ("primary address", r),
            ProbeDegraded::SshPort(r) => ("ssh port", r),
            ProbeDegraded::SshUnit(r) => ("ssh unit", r),
            ProbeDegraded::Firewall(r) => ("firewall", r),
            ProbeDegraded::OsRelease(r) => ("os release", r),
        };
        write!(f, "{}: {}", probe, reason)
    }
}
