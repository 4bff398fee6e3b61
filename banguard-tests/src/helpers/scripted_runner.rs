//! Command runner driven by a script instead of the host

use banguard_core::exec::{CommandOutput, CommandRunner, CommandSpec};
use banguard_core::poll::CancelFlag;
use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Scripted answer to one command line
#[derive(Debug, Clone)]
pub enum Response {
    Output(CommandOutput),
    /// The program cannot be launched
    LaunchError,
}

impl Response {
    pub fn ok() -> Self {
        Response::Output(CommandOutput::exited(0))
    }

    pub fn ok_with(stdout: &str) -> Self {
        Response::Output(CommandOutput::exited(0).with_stdout(stdout))
    }

    pub fn fail(code: i32, stderr: &str) -> Self {
        Response::Output(CommandOutput::exited(code).with_stderr(stderr))
    }
}

#[derive(Default)]
struct Script {
    queued: HashMap<String, VecDeque<Response>>,
    sticky: HashMap<String, Response>,
    located: HashSet<String>,
    /// Program that becomes locatable once the command succeeds
    installs: HashMap<String, String>,
    cancels: HashMap<String, CancelFlag>,
    calls: Vec<CommandSpec>,
}

/// Records every invocation and answers from the script.
///
/// Lookup order per command line: queued responses, then the sticky
/// response, then a generic non-zero exit.
#[derive(Default)]
pub struct ScriptedRunner {
    script: Mutex<Script>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collaborators of a host where everything works: package present,
    /// address 10.0.0.5, nftables active, self-check and health probe pass.
    pub fn healthy_host() -> Self {
        let runner = Self::new();
        runner
            .installed("fail2ban-client")
            .on(
                "ip -4 route get 1.1.1.1",
                Response::ok_with("1.1.1.1 via 10.0.0.1 dev eth0 src 10.0.0.5 uid 0\n"),
            )
            .on(
                "systemctl show -p Id --value sshd.service",
                Response::ok_with("ssh.service\n"),
            )
            .on("systemctl is-active --quiet nftables", Response::ok())
            .on("systemctl is-active --quiet ufw", Response::fail(3, ""))
            .on("systemctl is-active --quiet fail2ban", Response::fail(3, ""))
            .on("systemctl daemon-reload", Response::ok())
            .on("systemctl reset-failed fail2ban", Response::ok())
            .on("systemctl enable fail2ban", Response::ok())
            .on("systemctl start fail2ban", Response::ok())
            .on("systemctl restart fail2ban", Response::ok())
            .on(
                "fail2ban-client -t",
                Response::ok_with("OK: configuration test is successful\n"),
            )
            .on("fail2ban-client ping", Response::ok_with("Server replied: pong\n"));
        runner
    }

    pub fn on(&self, command: &str, response: Response) -> &Self {
        self.script
            .lock()
            .unwrap()
            .sticky
            .insert(command.to_string(), response);
        self
    }

    pub fn once(&self, command: &str, response: Response) -> &Self {
        self.script
            .lock()
            .unwrap()
            .queued
            .entry(command.to_string())
            .or_default()
            .push_back(response);
        self
    }

    pub fn installed(&self, program: &str) -> &Self {
        self.script.lock().unwrap().located.insert(program.to_string());
        self
    }

    pub fn uninstalled(&self, program: &str) -> &Self {
        self.script.lock().unwrap().located.remove(program);
        self
    }

    /// Make `program` locatable after `command` succeeds
    pub fn installs_on(&self, command: &str, program: &str) -> &Self {
        self.script
            .lock()
            .unwrap()
            .installs
            .insert(command.to_string(), program.to_string());
        self
    }

    /// Cancel `flag` whenever `command` runs
    pub fn cancels_on(&self, command: &str, flag: &CancelFlag) -> &Self {
        self.script
            .lock()
            .unwrap()
            .cancels
            .insert(command.to_string(), flag.clone());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.script
            .lock()
            .unwrap()
            .calls
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    pub fn specs(&self) -> Vec<CommandSpec> {
        self.script.lock().unwrap().calls.clone()
    }

    pub fn count(&self, command: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == command).count()
    }

    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }
}

impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> io::Result<CommandOutput> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(spec.clone());
        let key = spec.to_string();

        if let Some(flag) = script.cancels.get(&key) {
            flag.cancel();
        }

        let response = script
            .queued
            .get_mut(&key)
            .and_then(VecDeque::pop_front)
            .or_else(|| script.sticky.get(&key).cloned())
            .unwrap_or_else(|| Response::fail(1, "unscripted command"));

        match response {
            Response::LaunchError => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{}: not found", spec.program),
            )),
            Response::Output(out) => {
                if out.success()
                    && let Some(program) = script.installs.get(&key).cloned()
                {
                    script.located.insert(program);
                }
                Ok(out)
            }
        }
    }

    fn locate(&self, program: &str) -> Option<PathBuf> {
        self.script
            .lock()
            .unwrap()
            .located
            .contains(program)
            .then(|| Path::new("/usr/bin").join(program))
    }
}
