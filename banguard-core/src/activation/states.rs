use serde::Serialize;
use std::fmt;

/// Recovery strategies, from least to most invasive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActivationStage {
    /// Enable and (re)start through the service manager.
    SystemdManagedStart,
    /// Ask the client to launch the server directly.
    DirectDaemonStart,
    /// Run the server in the foreground to capture why it dies. Never succeeds.
    ForegroundDebugCapture,
}

impl ActivationStage {
    pub const FIRST: ActivationStage = ActivationStage::SystemdManagedStart;

    pub fn next(self) -> Option<Self> {
        match self {
            Self::SystemdManagedStart => Some(Self::DirectDaemonStart),
            Self::DirectDaemonStart => Some(Self::ForegroundDebugCapture),
            Self::ForegroundDebugCapture => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SystemdManagedStart => "systemd-managed-start",
            Self::DirectDaemonStart => "direct-daemon-start",
            Self::ForegroundDebugCapture => "foreground-debug-capture",
        }
    }
}

impl fmt::Display for ActivationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position of a run in the activation state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "stage", rename_all = "snake_case")]
pub enum ActivationState {
    Running(ActivationStage),
    Healthy(ActivationStage),
    Failed,
}

impl ActivationState {
    pub fn start() -> Self {
        Self::Running(ActivationStage::FIRST)
    }

    /// Transition after the running stage finished. Transitions only move
    /// forward; a cancelled run fails without entering another stage.
    pub fn after(self, healthy: bool, cancelled: bool) -> Self {
        match self {
            Self::Running(stage) if healthy => Self::Healthy(stage),
            Self::Running(_) if cancelled => Self::Failed,
            Self::Running(stage) => stage.next().map_or(Self::Failed, Self::Running),
            terminal => terminal,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running(_))
    }
}

impl fmt::Display for ActivationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running(stage) => write!(f, "running {}", stage),
            Self::Healthy(stage) => write!(f, "healthy via {}", stage),
            Self::Failed => write!(f, "failed"),
        }
    }
}
