use std::path::PathBuf;

use tracing::{debug, info};

use super::{Backend, DefaultSection, GuardSection, IniDocument, LogSource, ServiceConfig};
use crate::facts::{HostFacts, LogBackend};
use crate::layout::{DB_NAME, GUARDED_LOG, STATE_DIR};

const LOOPBACK_IGNORES: [&str; 2] = ["127.0.0.1/8", "::1"];

/// Ban policy applied to every synthesized configuration.
///
/// The numbers are fixed; the only way to change them is editing the
/// rendered file, which [`Policy::with_overrides_from`] picks up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    pub guard: String,
    pub bantime: i64,
    pub findtime: u64,
    pub maxretry: u32,
    pub guard_maxretry: u32,
    pub loglevel: String,
}

impl Default for Policy {
    fn default() -> Self {
        Self::for_guard("sshd")
    }
}

impl Policy {
    pub fn for_guard(guard: &str) -> Self {
        Self {
            guard: guard.to_string(),
            bantime: 3600,
            findtime: 600,
            maxretry: 5,
            guard_maxretry: 3,
            loglevel: "INFO".to_string(),
        }
    }

    /// Keep integer `bantime`, `findtime` and `maxretry` values found in the
    /// `[DEFAULT]` section of a previously rendered file.
    pub fn with_overrides_from(mut self, existing: &IniDocument) -> Self {
        let Some(section) = existing.section("DEFAULT") else {
            return self;
        };
        if let Some(v) = section.get("bantime").and_then(|v| v.parse().ok()) {
            self.bantime = v;
        }
        if let Some(v) = section.get("findtime").and_then(|v| v.parse().ok()) {
            self.findtime = v;
        }
        if let Some(v) = section.get("maxretry").and_then(|v| v.parse().ok()) {
            self.maxretry = v;
        }
        if (self.bantime, self.findtime, self.maxretry) != (3600, 600, 5) {
            info!(
                bantime = self.bantime,
                findtime = self.findtime,
                maxretry = self.maxretry,
                "Keeping operator-edited ban policy"
            );
        }
        self
    }
}

/// Render host facts and policy into a configuration. Pure and deterministic.
pub fn synthesize(facts: &HostFacts, policy: &Policy) -> ServiceConfig {
    let mut ignoreip: Vec<String> = LOOPBACK_IGNORES.iter().map(|s| s.to_string()).collect();
    if let Some(ip) = facts.primary_ipv4 {
        ignoreip.push(ip.to_string());
    }

    let (backend, source) = match facts.log_backend {
        LogBackend::FlatFile => (Backend::Auto, LogSource::LogPath(PathBuf::from(GUARDED_LOG))),
        LogBackend::Journal => (
            Backend::Systemd,
            LogSource::JournalMatch(format!(
                "_SYSTEMD_UNIT={} + _COMM=sshd",
                facts.ssh_unit
            )),
        ),
    };
    debug!(?backend, banaction = facts.firewall.ban_action(), "Synthesizing configuration");

    ServiceConfig {
        default: DefaultSection {
            bantime: policy.bantime,
            findtime: policy.findtime,
            maxretry: policy.maxretry,
            backend,
            dbfile: PathBuf::from(STATE_DIR).join(DB_NAME),
            ignoreip,
            banaction: facts.firewall.ban_action().to_string(),
            loglevel: policy.loglevel.clone(),
        },
        guards: vec![GuardSection {
            name: policy.guard.clone(),
            enabled: true,
            port: facts.ssh_port.to_string(),
            source,
            maxretry: policy.guard_maxretry,
        }],
    }
}
