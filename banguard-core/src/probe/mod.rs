//! Read-only host inspection.
//!
//! Every probe degrades to a fallback instead of failing; what fell back is
//! recorded in [`HostFacts::degraded`].

mod parse;

pub use parse::{PortScan, first_global_address, route_source, scan_ssh_port};

use std::fs::File;
use std::net::Ipv4Addr;

use tracing::{debug, info, warn};

use crate::commands;
use crate::exec::CommandRunner;
use crate::facts::{FirewallBackend, HostFacts, LogBackend, OsRelease, ProbeDegraded, SshPort};
use crate::layout::Layout;

const DEFAULT_SSH_UNIT: &str = "sshd.service";

pub struct EnvironmentProbe<'a, R> {
    runner: &'a R,
    layout: &'a Layout,
}

impl<'a, R: CommandRunner> EnvironmentProbe<'a, R> {
    pub fn new(runner: &'a R, layout: &'a Layout) -> Self {
        Self { runner, layout }
    }

    pub async fn probe(&self) -> HostFacts {
        let mut degraded = Vec::new();

        let primary_ipv4 = self.primary_ipv4(&mut degraded).await;
        let ssh_port = self.ssh_port(&mut degraded);
        let ssh_unit = self.ssh_unit(&mut degraded).await;
        let firewall = self.firewall(&mut degraded).await;
        let log_backend = self.log_backend();
        let os_release = self.os_release(&mut degraded);

        for d in &degraded {
            warn!("Probe degraded, using fallback: {}", d);
        }

        let facts = HostFacts {
            primary_ipv4,
            ssh_port,
            ssh_unit,
            firewall,
            log_backend,
            os_release,
            degraded,
        };
        info!(
            ip = ?facts.primary_ipv4,
            ssh_port = %facts.ssh_port,
            firewall = ?facts.firewall,
            log_backend = ?facts.log_backend,
            "Host probed"
        );
        facts
    }

    async fn primary_ipv4(&self, degraded: &mut Vec<ProbeDegraded>) -> Option<Ipv4Addr> {
        let attempts = [
            (commands::route_source(), route_source as fn(&str) -> Option<Ipv4Addr>),
            (commands::global_addresses(), first_global_address),
        ];
        let mut reasons = Vec::new();
        for (spec, parse) in attempts {
            match self.runner.run(&spec).await {
                Ok(out) if out.success() => match parse(&out.stdout) {
                    Some(ip) => return Some(ip),
                    None => reasons.push(format!("`{}` reported no address", spec)),
                },
                Ok(out) => reasons.push(format!("`{}` failed: {}", spec, out.describe_exit())),
                Err(e) => reasons.push(format!("`{}` could not run: {}", spec, e)),
            }
        }
        degraded.push(ProbeDegraded::PrimaryAddress(reasons.join("; ")));
        None
    }

    fn ssh_port(&self, degraded: &mut Vec<ProbeDegraded>) -> SshPort {
        match scan_ssh_port(self.layout) {
            Ok(PortScan::Found(port)) => SshPort::Number(port),
            Ok(PortScan::NotSet) => {
                debug!("No Port directive, using the named default");
                SshPort::default_named()
            }
            Ok(PortScan::Invalid(value)) => {
                degraded.push(ProbeDegraded::SshPort(format!("unusable Port value '{}'", value)));
                SshPort::default_named()
            }
            Err(e) => {
                degraded.push(ProbeDegraded::SshPort(format!(
                    "cannot read {}: {}",
                    self.layout.sshd_config.display(),
                    e
                )));
                SshPort::default_named()
            }
        }
    }

    async fn ssh_unit(&self, degraded: &mut Vec<ProbeDegraded>) -> String {
        let spec = commands::ssh_unit_id();
        let reason = match self.runner.run(&spec).await {
            Ok(out) if out.success() => {
                let id = out.stdout.trim();
                if !id.is_empty() {
                    return id.to_string();
                }
                "empty unit id".to_string()
            }
            Ok(out) => format!("`{}` failed: {}", spec, out.describe_exit()),
            Err(e) => format!("`{}` could not run: {}", spec, e),
        };
        degraded.push(ProbeDegraded::SshUnit(reason));
        DEFAULT_SSH_UNIT.to_string()
    }

    async fn firewall(&self, degraded: &mut Vec<ProbeDegraded>) -> FirewallBackend {
        let nftables = self.unit_active("nftables", degraded).await;
        let ufw = self.unit_active("ufw", degraded).await;
        FirewallBackend::from_active_units(nftables, ufw)
    }

    async fn unit_active(&self, unit: &str, degraded: &mut Vec<ProbeDegraded>) -> bool {
        let spec = commands::unit_is_active(unit);
        match self.runner.run(&spec).await {
            Ok(out) => out.success(),
            Err(e) => {
                degraded.push(ProbeDegraded::Firewall(format!("`{}` could not run: {}", spec, e)));
                false
            }
        }
    }

    fn log_backend(&self) -> LogBackend {
        let path = &self.layout.guarded_log;
        let usable = std::fs::metadata(path)
            .map(|meta| meta.is_file() && meta.len() > 0)
            .unwrap_or(false)
            && File::open(path).is_ok();
        if usable {
            LogBackend::FlatFile
        } else {
            debug!("{} not usable, matching the journal instead", path.display());
            LogBackend::Journal
        }
    }

    fn os_release(&self, degraded: &mut Vec<ProbeDegraded>) -> Option<OsRelease> {
        match parse::os_release(&self.layout.os_release) {
            Ok(release) => Some(release),
            Err(reason) => {
                degraded.push(ProbeDegraded::OsRelease(reason));
                None
            }
        }
    }
}
