//! Administrative privilege detection.

/// Effective user ID of the current process.
pub fn effective_uid() -> u32 {
    nix::unistd::geteuid().as_raw()
}

/// Whether the current process runs with administrative privilege (euid 0).
pub fn is_privileged() -> bool {
    nix::unistd::geteuid().is_root()
}

/// Real user and group IDs of the current process.
pub fn current_ids() -> (u32, u32) {
    (
        nix::unistd::getuid().as_raw(),
        nix::unistd::getgid().as_raw(),
    )
}
