//! Group resolution for log placeholder ownership.

/// Resolve a group name to its GID.
///
/// Numeric strings are accepted as-is. Returns `None` when the group does not
/// exist or the lookup itself fails; callers treat both as "no suitable group".
pub fn lookup_gid(group: &str) -> Option<u32> {
    if let Ok(gid) = group.parse::<u32>() {
        return Some(gid);
    }

    match nix::unistd::Group::from_name(group) {
        Ok(Some(g)) => Some(g.gid.as_raw()),
        _ => None,
    }
}

/// Name of the group with the given GID, if it resolves.
pub fn group_name(gid: u32) -> Option<String> {
    match nix::unistd::Group::from_gid(nix::unistd::Gid::from_raw(gid)) {
        Ok(Some(g)) => Some(g.name),
        _ => None,
    }
}
