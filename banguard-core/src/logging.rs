//! Console and install-log output.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::warn;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const INSTALL_LOG_MODE: u32 = 0o640;

/// Position in the install log where this run's output begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLog {
    pub path: PathBuf,
    pub start_offset: u64,
}

impl RunLog {
    pub fn starting_at_end(path: &Path) -> io::Result<Self> {
        let start_offset = match std::fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e),
        };
        Ok(Self {
            path: path.to_path_buf(),
            start_offset,
        })
    }

    /// Everything written to the install log since the run started.
    pub fn excerpt(&self) -> io::Result<String> {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(self.start_offset))?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

fn filter(verbose: bool) -> EnvFilter {
    let default = if verbose { "debug" } else { "info" };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Install the global subscriber: console on stderr and, when given, the
/// install log appended across runs.
///
/// Falls back to console-only output if the install log cannot be opened.
pub fn init_logging(install_log: Option<&Path>, verbose: bool) -> Option<RunLog> {
    let console = fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .with_ansi(true)
        .with_filter(filter(verbose));

    let (file_layer, run_log, open_error) = match install_log.map(open_install_log) {
        Some(Ok((file, run))) => {
            let layer = fmt::layer()
                .with_writer(Mutex::new(file))
                .with_target(true)
                .with_ansi(false)
                .with_filter(filter(verbose));
            (Some(layer), Some(run), None)
        }
        Some(Err(e)) => (None, None, Some(e)),
        None => (None, None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .try_init();

    if let Some(e) = open_error {
        warn!("Install log unavailable, logging to console only: {}", e);
    }
    run_log
}

fn open_install_log(path: &Path) -> io::Result<(File, RunLog)> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let run = RunLog::starting_at_end(path)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .mode(INSTALL_LOG_MODE)
        .open(path)?;
    Ok((file, run))
}
