mod commands;
mod errors;
mod summary;

use std::path::PathBuf;
use std::process::ExitCode;

use banguard_core::logging::{RunLog, init_logging};
use banguard_core::clock::SystemClock;
use banguard_core::exec::SystemRunner;
use banguard_core::poll::CancelFlag;
use banguard_core::{ProvisionError, Provisioner, Settings};
use clap::Parser;
use colored::Colorize;
use tokio::signal::unix::{SignalKind, signal};
use tracing::warn;

use crate::commands::Commands;
use crate::errors::{CliError, Result};

/// banguard - unattended fail2ban provisioning for SSH hosts
#[derive(Parser, Debug)]
#[command(name = "banguard")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Settings file (defaults to /etc/banguard/settings.yaml when present)
    #[arg(long, global = true, env = "BANGUARD_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Resolve every host path under this directory
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Never install the package, even if it is missing
    #[arg(long, global = true)]
    pub skip_install: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => return report_error(&CliError::Runtime(e)),
    };
    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report_error(&e),
    }
}

fn report_error(e: &CliError) -> ExitCode {
    if let CliError::Provision(ProvisionError::ActivationExhausted { report }) = e {
        println!("{}", summary::attempts_table(&report.attempts));
    }
    eprintln!("{} {}", "Error:".red().bold(), e);
    ExitCode::from(e.exit_status().code())
}

fn resolve_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = Settings::load_or_default(cli.settings.as_deref())?;
    if let Some(root) = &cli.root {
        settings.root = root.clone();
    }
    if cli.skip_install {
        settings.install.enabled = false;
    }
    Ok(settings)
}

async fn run(cli: Cli) -> Result<()> {
    let settings = resolve_settings(&cli)?;
    let command = cli.command.clone().unwrap_or_default();

    // Only host-mutating runs by a privileged user write the install log.
    let install_log = settings.layout().install_log;
    let log_to_file = command.mutates_host() && banguard_unix::is_privileged();
    let run_log: Option<RunLog> = init_logging(log_to_file.then_some(install_log.as_path()), cli.verbose);

    let runner = SystemRunner;
    let clock = SystemClock;
    let cancel = CancelFlag::new();
    // Other commands keep the default signal disposition.
    if matches!(command, Commands::Run) {
        spawn_signal_handler(cancel.clone());
    }

    let provisioner = Provisioner::new(&settings, &runner, &clock)
        .with_run_log(run_log)
        .with_cancel(cancel);

    match command {
        Commands::Run => {
            let report = provisioner.run().await?;
            summary::print_run_report(&report);
        }
        Commands::Probe => {
            let facts = provisioner.probe().await;
            println!("{}", serde_json::to_string_pretty(&facts)?);
        }
        Commands::Render => {
            print!("{}", provisioner.render().await);
        }
        Commands::Repair => {
            let state = provisioner.repair()?;
            summary::print_repair(&state);
        }
        Commands::Diagnose => {
            print!("{}", provisioner.diagnose().await.render());
        }
    }
    Ok(())
}

/// SIGINT/SIGTERM cancel the run. Before activation the pending command is
/// killed and the run fails with exit 1; during activation the current stage
/// fails and no later stage runs.
fn spawn_signal_handler(cancel: CancelFlag) {
    tokio::spawn(async move {
        let (mut interrupt, mut terminate) =
            match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
                (Ok(i), Ok(t)) => (i, t),
                (Err(e), _) | (_, Err(e)) => {
                    warn!("Cannot install signal handlers: {}", e);
                    return;
                }
            };
        tokio::select! {
            _ = interrupt.recv() => {}
            _ = terminate.recv() => {}
        }
        warn!("Signal received, cancelling the run");
        cancel.cancel();
    });
}
