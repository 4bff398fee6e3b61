use banguard_core::activation::{ActivationAttempt, AttemptOutcome};
use banguard_core::duration::format_duration;
use banguard_core::facts::HostFacts;
use banguard_core::repair::RuntimeState;
use banguard_core::RunReport;
use colored::Colorize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

#[derive(Tabled)]
pub struct AttemptRow {
    #[tabled(rename = "STAGE")]
    pub stage: String,
    #[tabled(rename = "STARTED")]
    pub started: String,
    #[tabled(rename = "RESULT")]
    pub result: String,
    #[tabled(rename = "LATENCY")]
    pub latency: String,
}

pub fn attempt_row(attempt: &ActivationAttempt) -> AttemptRow {
    let marker = match attempt.outcome {
        AttemptOutcome::Healthy { .. } => "ok".green().to_string(),
        AttemptOutcome::Failed(_) => "failed".red().to_string(),
    };
    AttemptRow {
        stage: attempt.stage.to_string(),
        started: attempt.started_at.format("%H:%M:%S").to_string(),
        result: format!("{} {}", marker, attempt.summary()),
        latency: attempt
            .probe_latency
            .as_ref()
            .map(format_duration)
            .unwrap_or_else(|| "-".to_string()),
    }
}

pub fn attempts_table(attempts: &[ActivationAttempt]) -> String {
    let rows: Vec<AttemptRow> = attempts.iter().map(attempt_row).collect();
    Table::new(rows).with(Style::blank()).to_string()
}

fn facts_line(facts: &HostFacts) -> String {
    format!(
        "address {}, ssh port {}, firewall {}, log source {:?}",
        facts
            .primary_ipv4
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "unknown".to_string()),
        facts.ssh_port,
        facts.firewall.ban_action(),
        facts.log_backend
    )
}

pub fn print_run_report(report: &RunReport) {
    println!("{}", facts_line(&report.facts));
    if !report.facts.degraded.is_empty() {
        for d in &report.facts.degraded {
            println!("  {} {}", "degraded".yellow(), d);
        }
    }
    let config = &report.config;
    if config.changed {
        println!("wrote {}", config.path.display());
    } else {
        println!("{} unchanged", config.path.display());
    }
    if let Some(backup) = &config.backup {
        println!("  previous saved as {}", backup.display());
    }
    for q in &report.overrides.quarantined {
        println!("  {} {} ({})", "disabled".yellow(), q.path.display(), q.reason);
    }
    print_repair(&report.repair);
    println!("{}", attempts_table(&report.activation.attempts));
    println!("{}", "service is healthy".green().bold());
}

pub fn print_repair(state: &RuntimeState) {
    if state.is_noop() {
        println!("runtime state already consistent");
    }
    for action in &state.actions {
        println!("  repaired: {}", action);
    }
}
