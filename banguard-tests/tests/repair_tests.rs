//! Runtime repair through the provisioner

use banguard_core::repair::RepairAction;
use banguard_tests::{ScriptedRunner, TestHost};
use std::os::unix::fs::symlink;

#[tokio::test]
async fn corrupted_runtime_state_converges() {
    let host = TestHost::new();
    // canonical path is a dangling link, legacy path a stray file
    std::fs::create_dir_all(host.path("/run")).unwrap();
    symlink(host.path("/nowhere"), host.path("/run/fail2ban")).unwrap();
    host.write("/var/run/fail2ban", "stray");
    let runner = ScriptedRunner::new();

    let first = host.provisioner(&runner).repair().unwrap();
    let second = host.provisioner(&runner).repair().unwrap();

    assert!(first.actions.contains(&RepairAction::RemovedNonDirectory {
        path: host.path("/run/fail2ban")
    }));
    assert!(first.actions.contains(&RepairAction::LinkedLegacyPath {
        path: host.path("/var/run/fail2ban"),
        target: host.path("/run/fail2ban"),
    }));
    assert!(second.is_noop(), "actions: {:?}", second.actions);
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn stale_daemon_files_are_cleared_before_activation() {
    let host = TestHost::new();
    host.write("/run/fail2ban/fail2ban.sock", "");
    host.write("/run/fail2ban/fail2ban.pid", "999999999\n");
    let runner = ScriptedRunner::healthy_host();

    let report = host.run(&runner).await.unwrap();

    assert!(report.repair.actions.contains(&RepairAction::RemovedStaleSocket {
        path: host.path("/run/fail2ban/fail2ban.sock")
    }));
    assert!(report.repair.actions.contains(&RepairAction::RemovedStalePidFile {
        path: host.path("/run/fail2ban/fail2ban.pid")
    }));
    assert!(!host.exists("/run/fail2ban/fail2ban.sock"));
}

#[tokio::test]
async fn missing_auth_log_gets_placeholder_and_journal_source() {
    let host = TestHost::empty();
    let runner = ScriptedRunner::healthy_host();

    let report = host.run(&runner).await.unwrap();

    assert!(host.exists("/var/log/auth.log"));
    assert!(
        report
            .repair
            .actions
            .iter()
            .any(|a| matches!(a, RepairAction::CreatedLogPlaceholder { .. }))
    );
    // probed before the placeholder existed
    assert!(host.read("/etc/fail2ban/jail.local").contains("journalmatch = _SYSTEMD_UNIT=ssh.service + _COMM=sshd"));
}

#[tokio::test]
async fn directory_in_place_of_socket_does_not_block_the_run() {
    let host = TestHost::new();
    std::fs::create_dir_all(host.path("/run/fail2ban/fail2ban.sock")).unwrap();
    std::fs::create_dir_all(host.path("/run/fail2ban/fail2ban.pid")).unwrap();
    let runner = ScriptedRunner::healthy_host();

    let report = host.run(&runner).await.unwrap();

    assert!(report.repair.actions.contains(&RepairAction::RemovedStaleSocket {
        path: host.path("/run/fail2ban/fail2ban.sock")
    }));
    assert!(!host.exists("/run/fail2ban/fail2ban.pid"));
    assert_eq!(report.exit_status().code(), 0);
}
