use banguard_core::{ExitStatus, ProvisionError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error("Failed to start async runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("Failed to encode output: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    pub fn exit_status(&self) -> ExitStatus {
        match self {
            CliError::Provision(e) => e.exit_status(),
            CliError::Runtime(_) | CliError::Json(_) => ExitStatus::SetupFailed,
        }
    }
}

pub type Result<T> = std::result::Result<T, CliError>;
