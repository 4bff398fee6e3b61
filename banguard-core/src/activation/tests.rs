use super::*;
use crate::clock::ManualClock;
use crate::exec::CommandOutput;
use crate::layout::Layout;
use crate::repair::RepairPolicy;
use crate::test_support::{FakeRunner, rooted_settings};
use tempfile::TempDir;

const PING: &str = "fail2ban-client ping";

struct Fixture {
    _dir: TempDir,
    layout: Layout,
    policy: RepairPolicy,
    service: ServiceSettings,
    clock: ManualClock,
    cancel: CancelFlag,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let settings = rooted_settings(dir.path());
        Self {
            layout: settings.layout(),
            policy: RepairPolicy::from_settings(&settings),
            service: settings.service.clone(),
            clock: ManualClock::default(),
            cancel: CancelFlag::new(),
            _dir: dir,
        }
    }

    async fn activate(&self, runner: &FakeRunner) -> Activation {
        let repairer = RuntimeStateRepairer::new(&self.layout, self.policy);
        ActivationOrchestrator::new(runner, &self.clock, &self.service, &repairer, &self.cancel)
            .activate()
            .await
    }
}

fn ok() -> CommandOutput {
    CommandOutput::exited(0)
}

#[test]
fn stages_only_move_forward() {
    let mut state = ActivationState::start();
    let mut seen = Vec::new();
    while let ActivationState::Running(stage) = state {
        assert!(!seen.contains(&stage));
        seen.push(stage);
        state = state.after(false, false);
    }
    assert_eq!(state, ActivationState::Failed);
    assert_eq!(
        seen,
        vec![
            ActivationStage::SystemdManagedStart,
            ActivationStage::DirectDaemonStart,
            ActivationStage::ForegroundDebugCapture,
        ]
    );
    assert_eq!(ActivationState::Failed.after(true, false), ActivationState::Failed);
}

#[test]
fn cancellation_ends_the_machine() {
    let state = ActivationState::start().after(false, true);
    assert_eq!(state, ActivationState::Failed);
    assert!(state.is_terminal());
}

#[tokio::test]
async fn healthy_on_first_stage() {
    let fx = Fixture::new();
    let runner = FakeRunner::new();
    runner
        .on("systemctl daemon-reload", ok())
        .on("systemctl reset-failed fail2ban", ok())
        .on("systemctl enable fail2ban", ok())
        .on("systemctl is-active --quiet fail2ban", CommandOutput::exited(3))
        .on("systemctl start fail2ban", ok())
        .once(PING, CommandOutput::exited(255))
        .once(PING, CommandOutput::exited(255))
        .on(PING, ok().with_stdout("Server replied: pong"));

    let activation = fx.activate(&runner).await;

    assert_eq!(
        activation.state,
        ActivationState::Healthy(ActivationStage::SystemdManagedStart)
    );
    assert_eq!(activation.attempts.len(), 1);
    let attempt = &activation.attempts[0];
    assert_eq!(attempt.outcome, AttemptOutcome::Healthy { tries: 3 });
    assert_eq!(attempt.probe_latency, Some(Duration::from_secs(6)));
    assert!(attempt.notes.is_empty());
    assert_eq!(runner.count("systemctl start fail2ban"), 1);
    assert_eq!(runner.count("systemctl restart fail2ban"), 0);
}

#[tokio::test]
async fn active_service_is_restarted() {
    let fx = Fixture::new();
    let runner = FakeRunner::new();
    runner
        .on("systemctl is-active --quiet fail2ban", ok())
        .on("systemctl restart fail2ban", ok())
        .on(PING, ok());

    let activation = fx.activate(&runner).await;

    assert!(activation.is_healthy());
    assert_eq!(runner.count("systemctl restart fail2ban"), 1);
    assert_eq!(runner.count("systemctl start fail2ban"), 0);
}

#[tokio::test]
async fn failed_start_command_still_spends_poll_budget() {
    let fx = Fixture::new();
    let runner = FakeRunner::new();
    // every systemctl call fails, ping never answers

    let activation = fx.activate(&runner).await;

    assert_eq!(activation.state, ActivationState::Failed);
    let first = &activation.attempts[0];
    assert_eq!(
        first.outcome,
        AttemptOutcome::Failed(StageFailure::Unhealthy { tries: 15 })
    );
    assert!(first.notes.iter().any(|n| n.contains("systemctl start fail2ban")));
    // 15 x 2s for the first stage, 1 x 3s for the second
    let expected: Vec<Duration> = std::iter::repeat_n(Duration::from_secs(2), 15)
        .chain([Duration::from_secs(3)])
        .collect();
    assert_eq!(fx.clock.sleeps(), expected);
}

#[tokio::test]
async fn falls_through_to_direct_start() {
    let fx = Fixture::new();
    let runner = FakeRunner::new();
    runner
        .on("systemctl start fail2ban", CommandOutput::exited(1).with_stderr("Job failed"))
        .on("fail2ban-client -x start", ok());
    for _ in 0..15 {
        runner.once(PING, CommandOutput::exited(255));
    }
    runner.on(PING, ok());

    let activation = fx.activate(&runner).await;

    assert_eq!(
        activation.state,
        ActivationState::Healthy(ActivationStage::DirectDaemonStart)
    );
    let stages: Vec<_> = activation.attempts.iter().map(|a| a.stage).collect();
    assert_eq!(
        stages,
        vec![
            ActivationStage::SystemdManagedStart,
            ActivationStage::DirectDaemonStart
        ]
    );
    assert_eq!(runner.count("fail2ban-server -f -x -v"), 0);
}

#[tokio::test]
async fn exhaustion_runs_each_stage_once_and_captures_foreground() {
    let fx = Fixture::new();
    let runner = FakeRunner::new();
    runner.on(
        "fail2ban-server -f -x -v",
        CommandOutput {
            exit_code: Some(255),
            stderr: "ERROR  Failed to access socket path".into(),
            ..CommandOutput::default()
        },
    );

    let activation = fx.activate(&runner).await;

    assert_eq!(activation.state, ActivationState::Failed);
    assert_eq!(activation.attempts.len(), 3);
    assert_eq!(runner.count("systemctl daemon-reload"), 1);
    assert_eq!(runner.count("fail2ban-client -x start"), 1);
    assert_eq!(runner.count("fail2ban-server -f -x -v"), 1);
    match &activation.attempts[2].outcome {
        AttemptOutcome::Failed(StageFailure::Captured { exit, output }) => {
            assert_eq!(exit, "exit status 255");
            assert!(output.contains("socket path"));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn every_stage_repairs_first() {
    let fx = Fixture::new();
    let runner = FakeRunner::new();

    fx.activate(&runner).await;

    assert!(fx.layout.runtime_dir.is_dir());
    assert!(fx.layout.legacy_runtime_dir.symlink_metadata().is_ok());
}

#[tokio::test]
async fn cancelled_before_activation_runs_nothing() {
    let fx = Fixture::new();
    fx.cancel.cancel();
    let runner = FakeRunner::new();

    let activation = fx.activate(&runner).await;

    assert_eq!(activation.state, ActivationState::Failed);
    assert!(activation.attempts.is_empty());
    assert!(runner.calls().is_empty());
}
