//! Ownership and mode enforcement for repaired runtime paths.

use std::io;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path;

/// Result of an enforcement call: whether anything had to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enforced {
    Unchanged,
    Changed,
}

impl Enforced {
    pub fn changed(self) -> bool {
        matches!(self, Enforced::Changed)
    }
}

/// Permission bits of `path` (follows symlinks), masked to `0o7777`.
pub fn mode_of(path: &Path) -> io::Result<u32> {
    Ok(std::fs::metadata(path)?.mode() & 0o7777)
}

/// Set the permission bits of `path` unless they already match.
pub fn ensure_mode(path: &Path, mode: u32) -> io::Result<Enforced> {
    if mode_of(path)? == mode {
        return Ok(Enforced::Unchanged);
    }
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
    Ok(Enforced::Changed)
}

/// Change owner and group of `path` unless they already match.
pub fn ensure_owner(path: &Path, uid: u32, gid: u32) -> io::Result<Enforced> {
    let meta = std::fs::metadata(path)?;
    if meta.uid() == uid && meta.gid() == gid {
        return Ok(Enforced::Unchanged);
    }
    nix::unistd::chown(
        path,
        Some(nix::unistd::Uid::from_raw(uid)),
        Some(nix::unistd::Gid::from_raw(gid)),
    )
    .map_err(io::Error::from)?;
    Ok(Enforced::Changed)
}
