//! Process liveness checks for stale pid file detection.

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;

/// Whether a process with `pid` currently exists.
///
/// Uses signal 0: `EPERM` means the process exists but belongs to someone
/// else, which still counts as alive. Non-positive PIDs address process
/// groups and are never considered alive.
pub fn pid_is_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    match kill(Pid::from_raw(pid), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_pid_is_alive() {
        assert!(pid_is_alive(std::process::id() as i32));
    }

    #[test]
    fn non_positive_pid_is_not_alive() {
        assert!(!pid_is_alive(0));
        assert!(!pid_is_alive(-1));
    }

    #[test]
    fn reaped_child_is_not_alive() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id() as i32;
        child.wait().unwrap();
        assert!(!pid_is_alive(pid));
    }
}
