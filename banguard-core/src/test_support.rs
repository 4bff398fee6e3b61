//! In-crate fakes shared by unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::exec::{CommandOutput, CommandRunner, CommandSpec};
use crate::settings::{Ownership, Settings};

/// Runner answering by rendered command line. Queued answers are consumed
/// first, then the sticky answer, then a generic failure.
#[derive(Default)]
pub struct FakeRunner {
    queued: Mutex<HashMap<String, VecDeque<CommandOutput>>>,
    sticky: Mutex<HashMap<String, CommandOutput>>,
    unlaunchable: Mutex<HashSet<String>>,
    located: Mutex<HashSet<String>>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, command: &str, output: CommandOutput) -> &Self {
        self.sticky.lock().insert(command.to_string(), output);
        self
    }

    pub fn once(&self, command: &str, output: CommandOutput) -> &Self {
        self.queued
            .lock()
            .entry(command.to_string())
            .or_default()
            .push_back(output);
        self
    }

    pub fn unlaunchable(&self, program: &str) -> &Self {
        self.unlaunchable.lock().insert(program.to_string());
        self
    }

    pub fn installed(&self, program: &str) -> &Self {
        self.located.lock().insert(program.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().iter().map(ToString::to_string).collect()
    }

    pub fn count(&self, command: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == command).count()
    }
}

impl CommandRunner for FakeRunner {
    async fn run(&self, spec: &CommandSpec) -> io::Result<CommandOutput> {
        self.calls.lock().push(spec.clone());
        if self.unlaunchable.lock().contains(&spec.program) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such file or directory"));
        }
        let key = spec.to_string();
        if let Some(out) = self.queued.lock().get_mut(&key).and_then(VecDeque::pop_front) {
            return Ok(out);
        }
        if let Some(out) = self.sticky.lock().get(&key) {
            return Ok(out.clone());
        }
        Ok(CommandOutput::exited(1).with_stderr("unscripted"))
    }

    fn locate(&self, program: &str) -> Option<PathBuf> {
        self.located
            .lock()
            .contains(program)
            .then(|| Path::new("/usr/bin").join(program))
    }
}

/// Settings rooted at `root`, owned by the invoking user.
pub fn rooted_settings(root: &Path) -> Settings {
    let (uid, gid) = banguard_unix::current_ids();
    Settings {
        root: root.to_path_buf(),
        ownership: Ownership { uid, gid },
        log_group: gid.to_string(),
        ..Settings::default()
    }
}

pub fn write(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}
