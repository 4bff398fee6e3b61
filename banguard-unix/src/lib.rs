//! Unix primitives used by the banguard orchestrator.
//!
//! Everything here is a thin, side-effect-explicit wrapper over `nix`, kept in
//! its own crate so the orchestrator logic never touches raw syscalls.

#[cfg(unix)]
pub mod groups;
#[cfg(unix)]
pub mod lock;
#[cfg(unix)]
pub mod ownership;
#[cfg(unix)]
pub mod privilege;
#[cfg(unix)]
pub mod process;

#[cfg(unix)]
pub use lock::{InstanceLock, LockError};
#[cfg(unix)]
pub use privilege::{current_ids, effective_uid, is_privileged};
