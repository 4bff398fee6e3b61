//! External command execution.
//!
//! Every collaborator (package manager, `systemctl`, `journalctl`, `ip`, the
//! fail2ban client and server) is invoked through [`CommandRunner`], so the
//! orchestrator's decisions can be exercised without touching the host.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Upper bound on captured bytes per stream.
const MAX_CAPTURE_BYTES: usize = 1024 * 1024;

/// How long to keep draining pipes after the child is gone. A daemonizing
/// child can hand its stdout to a grandchild that never closes it.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// A command to run: program, arguments, extra environment and an optional
/// wall-clock limit after which the child is killed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            env: Vec::new(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }

    /// Whether this spec is `program` invoked with exactly `args`.
    pub fn is(&self, program: &str, args: &[&str]) -> bool {
        self.program == program && self.args.iter().map(String::as_str).eq(args.iter().copied())
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Captured result of a finished (or killed) command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal (including our timeout).
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn exited(code: i32) -> Self {
        Self {
            exit_code: Some(code),
            ..Self::default()
        }
    }

    pub fn with_stdout(mut self, stdout: &str) -> Self {
        self.stdout = stdout.to_string();
        self
    }

    pub fn with_stderr(mut self, stderr: &str) -> Self {
        self.stderr = stderr.to_string();
        self
    }

    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// stdout followed by stderr, for error details and reports.
    pub fn combined(&self) -> String {
        match (self.stdout.trim_end(), self.stderr.trim_end()) {
            ("", "") => String::new(),
            (out, "") => out.to_string(),
            ("", err) => err.to_string(),
            (out, err) => format!("{}\n{}", out, err),
        }
    }

    /// Short human description of how the command ended.
    pub fn describe_exit(&self) -> String {
        match (self.timed_out, self.exit_code) {
            (true, _) => "timed out".to_string(),
            (false, Some(code)) => format!("exit status {}", code),
            (false, None) => "terminated by signal".to_string(),
        }
    }
}

/// Runs collaborator commands.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run `spec` to completion (or until its timeout) and capture output.
    ///
    /// `Err` means the program could not be launched at all.
    async fn run(&self, spec: &CommandSpec) -> io::Result<CommandOutput>;

    /// Resolve `program` on `PATH`.
    fn locate(&self, program: &str) -> Option<PathBuf> {
        which::which(program).ok()
    }
}

/// [`CommandRunner`] backed by `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec) -> io::Result<CommandOutput> {
        debug!(command = %spec, timeout = ?spec.timeout, "Running command");

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn()?;
        let stdout = Capture::start(child.stdout.take());
        let stderr = Capture::start(child.stderr.take());

        let (exit_code, timed_out) = match spec.timeout {
            Some(limit) => match timeout(limit, child.wait()).await {
                Ok(status) => (status?.code(), false),
                Err(_) => {
                    if let Err(e) = child.kill().await {
                        warn!(command = %spec, "Failed to kill timed-out command: {}", e);
                    }
                    (None, true)
                }
            },
            None => (child.wait().await?.code(), false),
        };

        Ok(CommandOutput {
            exit_code,
            stdout: stdout.finish().await,
            stderr: stderr.finish().await,
            timed_out,
        })
    }
}

/// Background reader that accumulates a child's stream into a shared buffer,
/// so partial output survives even when the reader has to be abandoned.
struct Capture {
    buffer: Arc<Mutex<Vec<u8>>>,
    task: Option<JoinHandle<()>>,
}

impl Capture {
    fn start<R>(stream: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let task = stream.map(|mut stream| {
            let buffer = Arc::clone(&buffer);
            tokio::spawn(async move {
                let mut chunk = [0u8; 4096];
                loop {
                    match stream.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            let mut buffer = buffer.lock();
                            let room = MAX_CAPTURE_BYTES.saturating_sub(buffer.len());
                            buffer.extend_from_slice(&chunk[..n.min(room)]);
                        }
                    }
                }
            })
        });
        Self { buffer, task }
    }

    async fn finish(mut self) -> String {
        if let Some(mut task) = self.task.take()
            && timeout(DRAIN_GRACE, &mut task).await.is_err()
        {
            task.abort();
        }
        let bytes = std::mem::take(&mut *self.buffer.lock());
        String::from_utf8_lossy(&bytes).into_owned()
    }
}
