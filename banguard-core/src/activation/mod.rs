//! Staged service activation.
//!
//! Stages run strictly in order and none is repeated. Each begins with a
//! runtime repair pass, issues its start commands, then polls the health
//! probe within a fixed budget.

mod states;

pub use states::{ActivationStage, ActivationState};

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::duration::{format_duration, serialize_optional_duration};
use crate::exec::{CommandRunner, CommandSpec};
use crate::poll::{CancelFlag, PollOutcome, Poller};
use crate::repair::RuntimeStateRepairer;
use crate::settings::ServiceSettings;

/// Health polling after a service-manager start: every 2s, 15 tries.
pub const SYSTEMD_START_POLL: Poller = Poller::new(Duration::from_secs(2), 15);
/// A direct start gets a single check after 3s.
pub const DIRECT_START_POLL: Poller = Poller::new(Duration::from_secs(3), 1);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivationAttempt {
    pub stage: ActivationStage,
    pub started_at: DateTime<Utc>,
    pub outcome: AttemptOutcome,
    /// Start-to-healthy time, only for a healthy attempt.
    #[serde(serialize_with = "serialize_optional_duration")]
    pub probe_latency: Option<Duration>,
    /// Start commands or repair steps that failed without ending the stage.
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Healthy { tries: u32 },
    Failed(StageFailure),
}

impl AttemptOutcome {
    pub fn is_healthy(&self) -> bool {
        matches!(self, AttemptOutcome::Healthy { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StageFailure {
    /// The health probe never passed within the poll budget.
    Unhealthy { tries: u32 },
    Cancelled { tries: u32 },
    /// Foreground run output, kept as evidence.
    Captured { exit: String, output: String },
}

impl ActivationAttempt {
    pub fn summary(&self) -> String {
        match &self.outcome {
            AttemptOutcome::Healthy { tries } => format!(
                "healthy after {} probe(s) in {}",
                tries,
                self.probe_latency.as_ref().map(format_duration).unwrap_or_default()
            ),
            AttemptOutcome::Failed(StageFailure::Unhealthy { tries }) => {
                format!("no healthy response after {} probe(s)", tries)
            }
            AttemptOutcome::Failed(StageFailure::Cancelled { tries }) => {
                format!("cancelled after {} probe(s)", tries)
            }
            AttemptOutcome::Failed(StageFailure::Captured { exit, .. }) => {
                format!("foreground run captured ({})", exit)
            }
        }
    }
}

/// Result of walking the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    pub state: ActivationState,
    pub attempts: Vec<ActivationAttempt>,
}

impl Activation {
    pub fn is_healthy(&self) -> bool {
        matches!(self.state, ActivationState::Healthy(_))
    }
}

pub struct ActivationOrchestrator<'a, R, C> {
    runner: &'a R,
    clock: &'a C,
    service: &'a ServiceSettings,
    repairer: &'a RuntimeStateRepairer<'a>,
    cancel: &'a CancelFlag,
}

impl<'a, R: CommandRunner, C: Clock> ActivationOrchestrator<'a, R, C> {
    pub fn new(
        runner: &'a R,
        clock: &'a C,
        service: &'a ServiceSettings,
        repairer: &'a RuntimeStateRepairer<'a>,
        cancel: &'a CancelFlag,
    ) -> Self {
        Self {
            runner,
            clock,
            service,
            repairer,
            cancel,
        }
    }

    pub async fn activate(&self) -> Activation {
        let mut state = ActivationState::start();
        let mut attempts = Vec::new();

        while let ActivationState::Running(stage) = state {
            if self.cancel.is_cancelled() {
                warn!("Activation cancelled before {}", stage);
                state = ActivationState::Failed;
                break;
            }
            info!("Activation stage {}", stage);
            let attempt = self.run_stage(stage).await;
            let cancelled = matches!(
                attempt.outcome,
                AttemptOutcome::Failed(StageFailure::Cancelled { .. })
            );
            if attempt.outcome.is_healthy() {
                info!("Stage {}: {}", stage, attempt.summary());
            } else {
                warn!("Stage {}: {}", stage, attempt.summary());
            }
            state = state.after(attempt.outcome.is_healthy(), cancelled);
            attempts.push(attempt);
        }

        if state == ActivationState::Failed {
            error!("All activation stages failed");
        }
        Activation { state, attempts }
    }

    async fn run_stage(&self, stage: ActivationStage) -> ActivationAttempt {
        let started_at = self.clock.now();
        let mut notes = Vec::new();

        if let Err(e) = self.repairer.repair() {
            warn!("Repair before {} failed: {}", stage, e);
            notes.push(e.to_string());
        }

        let outcome = match stage {
            ActivationStage::SystemdManagedStart => {
                self.systemd_start(&mut notes).await;
                self.poll(SYSTEMD_START_POLL).await
            }
            ActivationStage::DirectDaemonStart => {
                self.run_logged(&self.service.background_start(), &mut notes).await;
                self.poll(DIRECT_START_POLL).await
            }
            ActivationStage::ForegroundDebugCapture => self.foreground_capture().await,
        };

        let (outcome, probe_latency) = match outcome {
            Ok((tries, elapsed)) => (AttemptOutcome::Healthy { tries }, Some(elapsed)),
            Err(failure) => (AttemptOutcome::Failed(failure), None),
        };
        ActivationAttempt {
            stage,
            started_at,
            outcome,
            probe_latency,
            notes,
        }
    }

    async fn systemd_start(&self, notes: &mut Vec<String>) {
        let service = self.service;
        self.run_logged(&service.daemon_reload(), notes).await;
        self.run_logged(&service.reset_failed(), notes).await;
        self.run_logged(&service.enable(), notes).await;

        // restart so an already running daemon loads the new configuration
        let active = matches!(self.runner.run(&service.is_active()).await, Ok(out) if out.success());
        let start = if active { service.restart() } else { service.start() };
        self.run_logged(&start, notes).await;
    }

    /// Run a start command; failure is recorded but never ends the stage.
    async fn run_logged(&self, spec: &CommandSpec, notes: &mut Vec<String>) {
        let note = match self.runner.run(spec).await {
            Ok(out) if out.success() => return,
            Ok(out) => format!("`{}` {}: {}", spec, out.describe_exit(), out.combined()),
            Err(e) => format!("`{}` could not run: {}", spec, e),
        };
        warn!("{}", note);
        notes.push(note);
    }

    async fn poll(&self, poller: Poller) -> Result<(u32, Duration), StageFailure> {
        let probe = &self.service.health_probe();
        let runner = self.runner;
        let outcome = poller
            .until(self.clock, self.cancel, || async move {
                matches!(runner.run(probe).await, Ok(out) if out.success())
            })
            .await;
        match outcome {
            PollOutcome::Ready { tries, elapsed } => Ok((tries, elapsed)),
            PollOutcome::Exhausted { tries } => Err(StageFailure::Unhealthy { tries }),
            PollOutcome::Cancelled { tries } => Err(StageFailure::Cancelled { tries }),
        }
    }

    async fn foreground_capture(&self) -> Result<(u32, Duration), StageFailure> {
        let spec = self.service.foreground_start();
        let (exit, output) = match self.runner.run(&spec).await {
            Ok(out) => (out.describe_exit(), out.combined()),
            Err(e) => ("could not run".to_string(), e.to_string()),
        };
        Err(StageFailure::Captured { exit, output })
    }
}

#[cfg(test)]
mod tests;
