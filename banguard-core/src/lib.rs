//! Provisioning and activation of the fail2ban intrusion-prevention daemon.
//!
//! A run probes the host, renders and validates the jail configuration,
//! repairs runtime state and brings the service up through increasingly
//! invasive stages, collecting diagnostics when every stage fails.

pub mod activation;
pub mod backup;
pub mod clock;
pub mod commands;
pub mod config;
pub mod diagnostics;
pub mod duration;
pub mod errors;
pub mod exec;
pub mod facts;
pub mod install;
pub mod layout;
pub mod logging;
pub mod overrides;
pub mod poll;
pub mod probe;
pub mod provision;
pub mod repair;
pub mod settings;
pub mod synth;
pub mod validate;

#[cfg(test)]
mod test_support;

pub use errors::{ErrorClass, ExitStatus, ProvisionError, Result};
pub use provision::{Provisioner, RunReport};
pub use settings::Settings;
