use clap::Subcommand;

#[derive(Subcommand, Debug, Clone, Default, PartialEq, Eq)]
pub enum Commands {
    /// Install, configure and activate the service (default)
    #[default]
    Run,
    /// Print detected host facts as JSON
    Probe,
    /// Print the configuration this host would get, without writing it
    Render,
    /// Repair runtime directories, sockets and pid files only
    Repair,
    /// Print current service diagnostics
    Diagnose,
}

impl Commands {
    /// Commands that change the host and therefore need privilege, the
    /// instance lock and the install log.
    pub fn mutates_host(&self) -> bool {
        matches!(self, Commands::Run | Commands::Repair)
    }
}
