//! Stage fallthrough, exhaustion and cancellation through a full run

use banguard_core::ProvisionError;
use banguard_core::activation::{ActivationStage, ActivationState, AttemptOutcome, StageFailure};
use banguard_core::diagnostics::Artifact;
use banguard_tests::{Response, ScriptedRunner, TestHost};
use std::time::Duration;

fn never_healthy() -> ScriptedRunner {
    let runner = ScriptedRunner::healthy_host();
    runner
        .on("fail2ban-client ping", Response::fail(255, "Failed to access socket path"))
        .on(
            "fail2ban-server -f -x -v",
            Response::fail(255, "ERROR  Failed during configuration: unable to read log"),
        )
        .on(
            "systemctl status fail2ban --no-pager -l",
            Response::fail(3, "Active: failed (Result: exit-code)"),
        )
        .on("journalctl -u fail2ban -n 200 --no-pager", Response::LaunchError);
    runner
}

#[tokio::test]
async fn direct_start_recovers_broken_unit() {
    let host = TestHost::new();
    let runner = ScriptedRunner::healthy_host();
    runner
        .on("systemctl start fail2ban", Response::fail(1, "Job for fail2ban.service failed"))
        .on("fail2ban-client -x start", Response::ok());
    for _ in 0..15 {
        runner.once("fail2ban-client ping", Response::fail(255, ""));
    }

    let report = host.run(&runner).await.unwrap();

    assert_eq!(
        report.activation.state,
        ActivationState::Healthy(ActivationStage::DirectDaemonStart)
    );
    assert_eq!(report.activation.attempts.len(), 2);
    assert_eq!(runner.count("fail2ban-client ping"), 16);
    assert_eq!(host.clock.total_slept(), Duration::from_secs(33));
}

#[tokio::test]
async fn exhaustion_exits_two_with_diagnostics() {
    let host = TestHost::new();
    let runner = never_healthy();

    let err = host.run(&runner).await.unwrap_err();

    assert_eq!(err.exit_status().code(), 2);
    let ProvisionError::ActivationExhausted { report } = err else {
        panic!("expected exhaustion");
    };
    let stages: Vec<_> = report.attempts.iter().map(|a| a.stage).collect();
    assert_eq!(
        stages,
        vec![
            ActivationStage::SystemdManagedStart,
            ActivationStage::DirectDaemonStart,
            ActivationStage::ForegroundDebugCapture,
        ]
    );
    assert!(matches!(&report.status, Artifact::Collected(s) if s.contains("Active: failed")));
    assert!(matches!(report.journal, Artifact::Failed(_)));
    assert!(matches!(&report.config, Artifact::Collected(s) if s.contains("[sshd]")));
    assert!(report.runtime_paths.is_collected());

    let written = host.read("/var/log/banguard/diagnostics.report");
    assert!(written.contains("foreground-debug-capture"));
    assert!(written.contains("unable to read log"));
    assert_eq!(runner.count("systemctl status fail2ban --no-pager -l"), 1);
}

#[tokio::test]
async fn previous_report_is_backed_up_on_next_run() {
    let host = TestHost::new();
    let runner = never_healthy();

    host.run(&runner).await.unwrap_err();
    host.run(&runner).await.unwrap_err();

    let logs = host.list("/var/log/banguard");
    assert!(logs.contains(&"diagnostics.report".to_string()));
    assert!(
        logs.iter()
            .any(|name| name.starts_with("diagnostics.report.backup.")),
        "files: {:?}",
        logs
    );
    let current = host.read("/var/log/banguard/diagnostics.report");
    assert_eq!(current.matches("=== banguard diagnostics").count(), 2);
}

#[tokio::test]
async fn cancellation_stops_after_current_stage() {
    let host = TestHost::new();
    let runner = never_healthy();
    runner.cancels_on("fail2ban-client ping", &host.cancel);

    let err = host.run(&runner).await.unwrap_err();

    let ProvisionError::ActivationExhausted { report } = err else {
        panic!("expected exhaustion");
    };
    assert_eq!(report.attempts.len(), 1);
    assert_eq!(
        report.attempts[0].outcome,
        AttemptOutcome::Failed(StageFailure::Cancelled { tries: 1 })
    );
    assert_eq!(runner.count("fail2ban-client -x start"), 0);
    assert_eq!(runner.count("fail2ban-server -f -x -v"), 0);
}
