//! End-to-end provisioning run.

use std::future::Future;

use banguard_unix::{InstanceLock, LockError};
use tracing::{info, warn};

use crate::activation::{Activation, ActivationOrchestrator};
use crate::clock::Clock;
use crate::diagnostics::{
    DiagnosticsCollector, DiagnosticsReport, append_report, preserve_previous_report,
};
use crate::errors::{ExitStatus, ProvisionError, Result};
use crate::exec::CommandRunner;
use crate::facts::HostFacts;
use crate::install::{InstallOutcome, PackageInstaller};
use crate::layout::Layout;
use crate::logging::RunLog;
use crate::overrides::{OverrideReport, UnitOverrideInspector};
use crate::poll::CancelFlag;
use crate::probe::EnvironmentProbe;
use crate::repair::{RepairPolicy, RuntimeState, RuntimeStateRepairer};
use crate::settings::Settings;
use crate::synth::{ConfigSynthesizer, WriteOutcome};
use crate::validate::{ConfigValidator, ValidationReport};

/// What a successful run did.
#[derive(Debug)]
pub struct RunReport {
    pub install: InstallOutcome,
    pub facts: HostFacts,
    pub config: WriteOutcome,
    pub overrides: OverrideReport,
    pub repair: RuntimeState,
    pub validation: ValidationReport,
    pub activation: Activation,
}

impl RunReport {
    pub fn exit_status(&self) -> ExitStatus {
        ExitStatus::Healthy
    }
}

pub struct Provisioner<'a, R, C> {
    settings: &'a Settings,
    layout: Layout,
    runner: &'a R,
    clock: &'a C,
    privileged: bool,
    run_log: Option<RunLog>,
    cancel: CancelFlag,
}

impl<'a, R: CommandRunner, C: Clock> Provisioner<'a, R, C> {
    pub fn new(settings: &'a Settings, runner: &'a R, clock: &'a C) -> Self {
        Self {
            settings,
            layout: settings.layout(),
            runner,
            clock,
            privileged: banguard_unix::is_privileged(),
            run_log: None,
            cancel: CancelFlag::new(),
        }
    }

    /// Override the detected privilege (tests, rooted installs).
    pub fn privileged(mut self, privileged: bool) -> Self {
        self.privileged = privileged;
        self
    }

    pub fn with_run_log(mut self, run_log: Option<RunLog>) -> Self {
        self.run_log = run_log;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Install, probe, write, repair, validate and activate.
    pub async fn run(&self) -> Result<RunReport> {
        self.require_privilege()?;
        let _lock = self.lock()?;
        info!("Provisioning {} under {}", self.settings.service.unit, self.layout.root().display());

        if let Err(e) = preserve_previous_report(&self.layout.diagnostics_report, self.clock.now()) {
            warn!("Could not back up previous diagnostics report: {}", e);
        }

        let install = self
            .interruptible(
                "installing",
                PackageInstaller::new(self.runner, &self.settings.install, &self.settings.service)
                    .ensure_installed(),
            )
            .await?;

        let facts = self
            .interruptible("probing", async { Ok(self.probe().await) })
            .await?;

        self.checkpoint("writing configuration")?;
        let synth = ConfigSynthesizer::new(&self.layout.jail_config, &self.settings.service.guard);
        let config = synth.write(&synth.synthesize(&facts), self.clock.now())?;

        let overrides = UnitOverrideInspector::new(
            &self.layout.unit_dropin_dir(&self.settings.service.unit),
        )
        .inspect(self.clock.now());

        let repairer = self.repairer();
        let repair = repairer.repair()?;

        let validation = self
            .interruptible(
                "validating",
                ConfigValidator::new(self.runner, &self.settings.service).validate(),
            )
            .await?;

        self.checkpoint("activating")?;
        let activation = ActivationOrchestrator::new(
            self.runner,
            self.clock,
            &self.settings.service,
            &repairer,
            &self.cancel,
        )
        .activate()
        .await;

        if !activation.is_healthy() {
            let report = self.collect_diagnostics(activation).await;
            if let Err(e) = append_report(&self.layout.diagnostics_report, &report) {
                warn!(
                    "Could not write diagnostics to {}: {}",
                    self.layout.diagnostics_report.display(),
                    e
                );
            }
            return Err(ProvisionError::ActivationExhausted {
                report: Box::new(report),
            });
        }

        info!("{} is healthy ({})", self.settings.service.unit, activation.state);
        Ok(RunReport {
            install,
            facts,
            config,
            overrides,
            repair,
            validation,
            activation,
        })
    }

    pub async fn probe(&self) -> HostFacts {
        EnvironmentProbe::new(self.runner, &self.layout).probe().await
    }

    /// Configuration this host would get, without writing it.
    pub async fn render(&self) -> String {
        let facts = self.probe().await;
        ConfigSynthesizer::new(&self.layout.jail_config, &self.settings.service.guard)
            .synthesize(&facts)
            .render()
    }

    /// Runtime repair on its own.
    pub fn repair(&self) -> Result<RuntimeState> {
        self.require_privilege()?;
        let _lock = self.lock()?;
        Ok(self.repairer().repair()?)
    }

    /// Current evidence, without activation attempts.
    pub async fn diagnose(&self) -> DiagnosticsReport {
        DiagnosticsCollector::new(
            self.runner,
            &self.layout,
            &self.settings.service,
            self.run_log.as_ref(),
        )
        .collect(Vec::new(), self.clock.now())
        .await
    }

    async fn collect_diagnostics(&self, activation: Activation) -> DiagnosticsReport {
        DiagnosticsCollector::new(
            self.runner,
            &self.layout,
            &self.settings.service,
            self.run_log.as_ref(),
        )
        .collect(activation.attempts, self.clock.now())
        .await
    }

    /// Abandon `step` as soon as cancellation is requested. Dropping the
    /// future kills any collaborator it is waiting on.
    async fn interruptible<T>(
        &self,
        step: &'static str,
        work: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                warn!("Cancelled while {}", step);
                Err(ProvisionError::Cancelled { step })
            }
            result = work => result,
        }
    }

    fn checkpoint(&self, step: &'static str) -> Result<()> {
        if self.cancel.is_cancelled() {
            warn!("Cancelled before {}", step);
            return Err(ProvisionError::Cancelled { step });
        }
        Ok(())
    }

    fn repairer(&self) -> RuntimeStateRepairer<'_> {
        RuntimeStateRepairer::new(&self.layout, RepairPolicy::from_settings(self.settings))
    }

    fn require_privilege(&self) -> Result<()> {
        if self.privileged {
            Ok(())
        } else {
            Err(ProvisionError::Privilege {
                euid: banguard_unix::effective_uid(),
            })
        }
    }

    fn lock(&self) -> Result<InstanceLock> {
        InstanceLock::acquire(&self.layout.lock_file).map_err(|e| match e {
            LockError::Held { path } => ProvisionError::AlreadyRunning { path },
            LockError::Io { path, source } => ProvisionError::Lock { path, source },
        })
    }
}
