//! Configuration self-check run before any activation attempt.

use tracing::{error, info};

use crate::errors::{ProvisionError, Result};
use crate::exec::CommandRunner;
use crate::settings::ServiceSettings;

/// Output of a passing self-check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub output: String,
}

/// Gate in front of activation: the daemon's own configuration self-check.
pub struct ConfigValidator<'a, R> {
    runner: &'a R,
    service: &'a ServiceSettings,
}

impl<'a, R: CommandRunner> ConfigValidator<'a, R> {
    pub fn new(runner: &'a R, service: &'a ServiceSettings) -> Self {
        Self { runner, service }
    }

    pub async fn validate(&self) -> Result<ValidationReport> {
        let spec = self.service.self_check();
        let details = match self.runner.run(&spec).await {
            Ok(out) if out.success() => {
                info!("Configuration self-check passed");
                return Ok(ValidationReport {
                    output: out.combined(),
                });
            }
            Ok(out) => format!("`{}` {}\n{}", spec, out.describe_exit(), out.combined()),
            Err(e) => format!("`{}` could not run: {}", spec, e),
        };
        error!("Configuration self-check failed: {}", details.trim_end());
        Err(ProvisionError::Validation { details })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::CommandOutput;
    use crate::test_support::FakeRunner;

    #[tokio::test]
    async fn passing_check_returns_output() {
        let runner = FakeRunner::new();
        runner.on(
            "fail2ban-client -t",
            CommandOutput::exited(0).with_stdout("OK: configuration test is successful\n"),
        );
        let service = ServiceSettings::default();

        let report = ConfigValidator::new(&runner, &service).validate().await.unwrap();
        assert_eq!(report.output, "OK: configuration test is successful");
    }

    #[tokio::test]
    async fn failing_check_carries_details() {
        let runner = FakeRunner::new();
        runner.on(
            "fail2ban-client -t",
            CommandOutput::exited(255).with_stderr("ERROR  Failed during configuration: bad value\n"),
        );
        let service = ServiceSettings::default();

        let err = ConfigValidator::new(&runner, &service).validate().await.unwrap_err();
        match err {
            ProvisionError::Validation { details } => {
                assert!(details.contains("exit status 255"));
                assert!(details.contains("bad value"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn unlaunchable_client_is_validation_error() {
        let runner = FakeRunner::new();
        runner.unlaunchable("fail2ban-client");
        let service = ServiceSettings::default();

        let err = ConfigValidator::new(&runner, &service).validate().await.unwrap_err();
        assert!(matches!(err, ProvisionError::Validation { .. }));
    }
}
