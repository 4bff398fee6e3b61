//! Evidence collection after every activation stage failed.
//!
//! Each artifact is gathered independently; one failing never prevents the
//! others, and its error is recorded in place of the content.

mod listing;

pub use listing::runtime_listing;

use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::activation::{ActivationAttempt, AttemptOutcome, StageFailure};
use crate::backup::backup_file;
use crate::exec::{CommandRunner, CommandSpec};
use crate::layout::Layout;
use crate::logging::RunLog;
use crate::settings::ServiceSettings;

const REPORT_MODE: u32 = 0o640;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "content", rename_all = "snake_case")]
pub enum Artifact {
    Collected(String),
    Failed(String),
}

impl Artifact {
    pub fn is_collected(&self) -> bool {
        matches!(self, Artifact::Collected(_))
    }

    fn render_into(&self, out: &mut String, title: &str) {
        let _ = writeln!(out, "--- {} ---", title);
        match self {
            Artifact::Collected(content) => {
                out.push_str(content.trim_end());
                out.push('\n');
            }
            Artifact::Failed(reason) => {
                let _ = writeln!(out, "[collection failed: {}]", reason);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticsReport {
    pub collected_at: DateTime<Utc>,
    pub status: Artifact,
    pub journal: Artifact,
    pub config: Artifact,
    pub runtime_paths: Artifact,
    pub run_log: Artifact,
    pub attempts: Vec<ActivationAttempt>,
}

impl DiagnosticsReport {
    #[cfg(test)]
    pub fn empty_for_tests() -> Self {
        let none = || Artifact::Failed("not collected".to_string());
        Self {
            collected_at: DateTime::<Utc>::UNIX_EPOCH,
            status: none(),
            journal: none(),
            config: none(),
            runtime_paths: none(),
            run_log: none(),
            attempts: Vec::new(),
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "=== banguard diagnostics {} ===",
            self.collected_at.format("%Y-%m-%dT%H:%M:%SZ")
        );
        let _ = writeln!(out, "--- activation attempts ---");
        if self.attempts.is_empty() {
            out.push_str("(none)\n");
        }
        for attempt in &self.attempts {
            let _ = writeln!(
                out,
                "{} {} {}",
                attempt.started_at.format("%H:%M:%S"),
                attempt.stage,
                attempt.summary()
            );
            for note in &attempt.notes {
                let _ = writeln!(out, "    note: {}", note);
            }
        }
        self.status.render_into(&mut out, "service status");
        self.journal.render_into(&mut out, "journal");
        self.config.render_into(&mut out, "configuration");
        self.runtime_paths.render_into(&mut out, "runtime paths");
        self.run_log.render_into(&mut out, "run log");
        for attempt in &self.attempts {
            if let AttemptOutcome::Failed(StageFailure::Captured { exit, output }) = &attempt.outcome {
                Artifact::Collected(output.clone())
                    .render_into(&mut out, &format!("foreground capture ({})", exit));
            }
        }
        out.push('\n');
        out
    }
}

pub struct DiagnosticsCollector<'a, R> {
    runner: &'a R,
    layout: &'a Layout,
    service: &'a ServiceSettings,
    run_log: Option<&'a RunLog>,
}

impl<'a, R: CommandRunner> DiagnosticsCollector<'a, R> {
    pub fn new(
        runner: &'a R,
        layout: &'a Layout,
        service: &'a ServiceSettings,
        run_log: Option<&'a RunLog>,
    ) -> Self {
        Self {
            runner,
            layout,
            service,
            run_log,
        }
    }

    pub async fn collect(
        &self,
        attempts: Vec<ActivationAttempt>,
        now: DateTime<Utc>,
    ) -> DiagnosticsReport {
        info!("Collecting diagnostics");
        let report = DiagnosticsReport {
            collected_at: now,
            status: self.command_artifact(&self.service.status()).await,
            journal: self.command_artifact(&self.service.journal_excerpt()).await,
            config: file_artifact(&self.layout.jail_config),
            runtime_paths: Artifact::Collected(runtime_listing(self.layout)),
            run_log: match self.run_log {
                Some(log) => log.excerpt().map_or_else(
                    |e| Artifact::Failed(format!("{}: {}", log.path.display(), e)),
                    Artifact::Collected,
                ),
                None => Artifact::Failed("install log not enabled for this run".to_string()),
            },
            attempts,
        };
        for (name, artifact) in [
            ("status", &report.status),
            ("journal", &report.journal),
            ("config", &report.config),
            ("run log", &report.run_log),
        ] {
            if let Artifact::Failed(reason) = artifact {
                warn!("Diagnostics artifact {} unavailable: {}", name, reason);
            }
        }
        report
    }

    /// Status commands exit non-zero for inactive units but still print
    /// useful output, so any output counts.
    async fn command_artifact(&self, spec: &CommandSpec) -> Artifact {
        match self.runner.run(spec).await {
            Ok(out) => {
                let text = out.combined();
                if text.is_empty() {
                    Artifact::Failed(format!("`{}` {} with no output", spec, out.describe_exit()))
                } else {
                    Artifact::Collected(text)
                }
            }
            Err(e) => Artifact::Failed(format!("`{}` could not run: {}", spec, e)),
        }
    }
}

fn file_artifact(path: &Path) -> Artifact {
    match std::fs::read_to_string(path) {
        Ok(text) => Artifact::Collected(text),
        Err(e) => Artifact::Failed(format!("{}: {}", path.display(), e)),
    }
}

/// Copy last invocation's report aside before this run may append to it.
pub fn preserve_previous_report(path: &Path, now: DateTime<Utc>) -> io::Result<Option<PathBuf>> {
    backup_file(path, now)
}

pub fn append_report(path: &Path, report: &DiagnosticsReport) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .mode(REPORT_MODE)
        .open(path)?;
    file.write_all(report.render().as_bytes())?;
    info!("Diagnostics appended to {}", path.display());
    Ok(())
}
