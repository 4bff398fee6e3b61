//! Inspection of systemd drop-in overrides for the managed unit.
//!
//! A broken drop-in makes every `systemctl start` fail the same way, so
//! malformed ones are renamed out of the way before activation. Well-formed
//! drop-ins are never touched.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

const KNOWN_SECTIONS: [&str; 3] = ["Unit", "Service", "Install"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OverrideReport {
    pub kept: Vec<PathBuf>,
    pub quarantined: Vec<Quarantined>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quarantined {
    pub path: PathBuf,
    pub moved_to: PathBuf,
    pub reason: String,
}

pub struct UnitOverrideInspector<'a> {
    dropin_dir: &'a Path,
}

impl<'a> UnitOverrideInspector<'a> {
    pub fn new(dropin_dir: &'a Path) -> Self {
        Self { dropin_dir }
    }

    pub fn inspect(&self, now: DateTime<Utc>) -> OverrideReport {
        let mut report = OverrideReport::default();
        let entries = match std::fs::read_dir(self.dropin_dir) {
            Ok(entries) => entries,
            Err(_) => {
                debug!("No drop-in directory at {}", self.dropin_dir.display());
                return report;
            }
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "conf") && p.is_file())
            .collect();
        files.sort();

        for path in files {
            let verdict = match std::fs::read_to_string(&path) {
                Ok(text) => check_dropin(&text),
                Err(e) => Err(format!("unreadable: {}", e)),
            };
            match verdict {
                Ok(()) => report.kept.push(path),
                Err(reason) => {
                    let moved_to = quarantine_path(&path, now);
                    match std::fs::rename(&path, &moved_to) {
                        Ok(()) => {
                            info!(
                                "Quarantined malformed drop-in {} ({}) as {}",
                                path.display(),
                                reason,
                                moved_to.display()
                            );
                            report.quarantined.push(Quarantined {
                                path,
                                moved_to,
                                reason,
                            });
                        }
                        Err(e) => {
                            warn!("Failed to quarantine {}: {}", path.display(), e);
                            report.kept.push(path);
                        }
                    }
                }
            }
        }
        report
    }
}

fn quarantine_path(path: &Path, now: DateTime<Utc>) -> PathBuf {
    let base = format!("{}.disabled.{}", path.display(), now.format("%Y%m%dT%H%M%SZ"));
    let mut candidate = PathBuf::from(&base);
    let mut n = 1;
    while candidate.symlink_metadata().is_ok() {
        candidate = PathBuf::from(format!("{}.{}", base, n));
        n += 1;
    }
    candidate
}

/// `Err(reason)` when systemd would reject or misread the drop-in.
fn check_dropin(text: &str) -> Result<(), String> {
    let mut section: Option<String> = None;
    let mut exec_start_reset = false;

    for (idx, line) in logical_lines(text) {
        if let Some(name) = line.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
            if !KNOWN_SECTIONS.contains(&name) {
                return Err(format!("line {}: unknown section [{}]", idx, name));
            }
            section = Some(name.to_string());
            continue;
        }
        let Some(current) = section.as_deref() else {
            return Err(format!("line {}: setting before any section header", idx));
        };
        let Some((key, value)) = line.split_once('=') else {
            return Err(format!("line {}: expected Key=value", idx));
        };
        if current == "Service" && key.trim() == "ExecStart" {
            if value.trim().is_empty() {
                exec_start_reset = true;
            } else if !exec_start_reset {
                return Err(format!(
                    "line {}: ExecStart without a preceding empty ExecStart= reset",
                    idx
                ));
            }
        }
    }

    if section.is_none() {
        return Err("no section header".to_string());
    }
    Ok(())
}

/// Non-comment lines with backslash continuations joined, numbered by the
/// line they start on.
fn logical_lines(text: &str) -> Vec<(usize, String)> {
    let mut lines = Vec::new();
    let mut pending: Option<(usize, String)> = None;
    for (idx, raw) in text.lines().enumerate() {
        let trimmed = raw.trim();
        if pending.is_none() && (trimmed.is_empty() || trimmed.starts_with(['#', ';'])) {
            continue;
        }
        let (start, mut acc) = pending.take().unwrap_or((idx + 1, String::new()));
        match trimmed.strip_suffix('\\') {
            Some(head) => {
                acc.push_str(head);
                acc.push(' ');
                pending = Some((start, acc));
            }
            None => {
                acc.push_str(trimmed);
                lines.push((start, acc));
            }
        }
    }
    if let Some(last) = pending {
        lines.push(last);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 15, 0).unwrap()
    }

    #[test]
    fn accepts_well_formed_dropins() {
        assert!(check_dropin("[Service]\nExecStart=\nExecStart=/usr/bin/fail2ban-server -xf start\n").is_ok());
        assert!(check_dropin("# tuned\n[Unit]\nAfter=nftables.service\n\n[Service]\nRestart=always\n").is_ok());
        assert!(check_dropin("[Service]\nEnvironment=A=1 \\\n  B=2\n").is_ok());
    }

    #[test]
    fn exec_start_rule_applies_to_current_section_only() {
        assert!(check_dropin("[Unit]\nDescription=x\n[Install]\nWantedBy=multi-user.target\n").is_ok());
        assert!(check_dropin("[Unit]\nExecStart=/bin/true\n").is_ok());
        let reason = check_dropin("[Unit]\nAfter=network.target\n[Service]\nExecStart=/bin/true\n")
            .unwrap_err();
        assert!(reason.starts_with("line 4:"), "{}", reason);
    }

    #[test]
    fn rejects_malformed_dropins() {
        let cases = [
            ("", "no section header"),
            ("Restart=always\n", "before any section"),
            ("[Servce]\nRestart=always\n", "unknown section"),
            ("[Service]\nExecStart=/bin/true\n", "ExecStart"),
            ("[Service]\ngarbage\n", "Key=value"),
        ];
        for (text, expected) in cases {
            let reason = check_dropin(text).unwrap_err();
            assert!(reason.contains(expected), "{:?}: {}", text, reason);
        }
    }

    #[test]
    fn quarantines_only_malformed_files() {
        let dir = TempDir::new().unwrap();
        let good = dir.path().join("10-restart.conf");
        let bad = dir.path().join("20-broken.conf");
        let other = dir.path().join("notes.txt");
        std::fs::write(&good, "[Service]\nRestart=on-failure\n").unwrap();
        std::fs::write(&bad, "[Service]\nExecStart=/usr/bin/fail2ban-server\n").unwrap();
        std::fs::write(&other, "garbage").unwrap();

        let report = UnitOverrideInspector::new(dir.path()).inspect(now());

        assert_eq!(report.kept, vec![good.clone()]);
        assert_eq!(report.quarantined.len(), 1);
        let q = &report.quarantined[0];
        assert_eq!(q.path, bad);
        assert_eq!(
            q.moved_to.file_name().unwrap().to_str().unwrap(),
            "20-broken.conf.disabled.20240501T091500Z"
        );
        assert!(good.exists());
        assert!(!bad.exists());
        assert!(q.moved_to.exists());
        assert!(other.exists());
    }

    #[test]
    fn missing_directory_is_empty_report() {
        let dir = TempDir::new().unwrap();
        let report = UnitOverrideInspector::new(&dir.path().join("absent")).inspect(now());
        assert_eq!(report, OverrideReport::default());
    }
}
