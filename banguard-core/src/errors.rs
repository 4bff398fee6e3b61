use std::path::PathBuf;
use thiserror::Error;

use crate::diagnostics::DiagnosticsReport;

/// Format a YAML error for user-friendly display, including the field path
fn format_yaml_error(e: &serde_path_to_error::Error<serde_yaml::Error>) -> String {
    let path = e.path().to_string();
    let inner = e.inner();
    let msg = inner.to_string();

    let located = if let Some(loc) = inner.location() {
        format!("Line {}, Column {}: {}", loc.line(), loc.column(), msg)
    } else {
        msg
    };

    if path.is_empty() || path == "." {
        located
    } else {
        format!("{}: {}", path, located)
    }
}

/// How a failure affects the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Aborts before the running service is touched (exit 1).
    Fatal,
    /// All activation stages failed; diagnostics were collected (exit 2).
    Exhausted,
}

/// Process exit codes of a provisioning run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitStatus {
    Healthy = 0,
    SetupFailed = 1,
    ActivationExhausted = 2,
}

impl ExitStatus {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Fatal errors of a provisioning run.
///
/// Non-fatal conditions never appear here: probe degradation is recorded in
/// [`crate::facts::HostFacts::degraded`], stage failures in
/// [`crate::activation::AttemptOutcome`], and diagnostics collection errors
/// in [`crate::diagnostics::Artifact`].
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("administrative privilege required (running with effective uid {euid})")]
    Privilege { euid: u32 },

    #[error("another provisioning run is in progress ({path} is locked)")]
    AlreadyRunning { path: PathBuf },

    #[error("failed to acquire instance lock {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read settings file {path}: {source}")]
    SettingsRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings file '{path}':\n  {}", format_yaml_error(.source))]
    SettingsParse {
        path: PathBuf,
        #[source]
        source: serde_path_to_error::Error<serde_yaml::Error>,
    },

    #[error("failed to install package {package}: {reason}")]
    DependencyInstall { package: String, reason: String },

    #[error("failed to write configuration {path}: {source}")]
    ConfigWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Repair(#[from] crate::repair::RepairError),

    #[error("cancelled while {step}; activation was not attempted")]
    Cancelled { step: &'static str },

    #[error("configuration self-check failed:\n{details}")]
    Validation { details: String },

    #[error("activation exhausted all stages after {} attempts; diagnostics collected", .report.attempts.len())]
    ActivationExhausted { report: Box<DiagnosticsReport> },
}

impl ProvisionError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ProvisionError::ActivationExhausted { .. } => ErrorClass::Exhausted,
            _ => ErrorClass::Fatal,
        }
    }

    pub fn exit_status(&self) -> ExitStatus {
        match self.class() {
            ErrorClass::Fatal => ExitStatus::SetupFailed,
            ErrorClass::Exhausted => ExitStatus::ActivationExhausted,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProvisionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_errors_exit_one() {
        let errors = [
            ProvisionError::Privilege { euid: 1000 },
            ProvisionError::AlreadyRunning {
                path: PathBuf::from("/run/banguard.lock"),
            },
            ProvisionError::DependencyInstall {
                package: "fail2ban".into(),
                reason: "repository unreachable".into(),
            },
            ProvisionError::Validation {
                details: "ERROR  No file(s) found".into(),
            },
            ProvisionError::Cancelled {
                step: "installing",
            },
        ];
        for err in errors {
            assert_eq!(err.class(), ErrorClass::Fatal);
            assert_eq!(err.exit_status().code(), 1);
        }
    }

    #[test]
    fn exhaustion_exits_two() {
        let err = ProvisionError::ActivationExhausted {
            report: Box::new(DiagnosticsReport::empty_for_tests()),
        };
        assert_eq!(err.class(), ErrorClass::Exhausted);
        assert_eq!(err.exit_status(), ExitStatus::ActivationExhausted);
        assert_eq!(err.exit_status().code(), 2);
    }

    #[test]
    fn settings_parse_error_names_field() {
        let yaml = "install:\n  enabled: maybe\n";
        let de = serde_yaml::Deserializer::from_str(yaml);
        let source =
            serde_path_to_error::deserialize::<_, crate::settings::Settings>(de).unwrap_err();
        let err = ProvisionError::SettingsParse {
            path: PathBuf::from("/etc/banguard/settings.yaml"),
            source,
        };
        let msg = err.to_string();
        assert!(msg.contains("install.enabled"), "message was: {}", msg);
    }
}
