use std::fmt::Write as _;
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::path::Path;

use banguard_unix::groups::group_name;

use crate::layout::Layout;

/// One line per runtime path: type, mode, owner and link target.
pub fn runtime_listing(layout: &Layout) -> String {
    let paths = [
        layout.runtime_dir.clone(),
        layout.legacy_runtime_dir.clone(),
        layout.socket(),
        layout.pid_file(),
        layout.guarded_log.clone(),
        layout.state_dir.clone(),
        layout.jail_config.clone(),
    ];
    let mut out = String::new();
    for path in &paths {
        let _ = writeln!(out, "{}", describe(path));
    }
    out
}

fn describe(path: &Path) -> String {
    let meta = match path.symlink_metadata() {
        Ok(meta) => meta,
        Err(e) => return format!("{}: {}", path.display(), e),
    };
    let ft = meta.file_type();
    let kind = if ft.is_symlink() {
        "symlink"
    } else if ft.is_dir() {
        "directory"
    } else if ft.is_socket() {
        "socket"
    } else if ft.is_file() {
        "file"
    } else {
        "other"
    };
    let group = group_name(meta.gid()).unwrap_or_else(|| meta.gid().to_string());
    let mut line = format!(
        "{} {} {:04o} uid={} group={} size={}",
        path.display(),
        kind,
        meta.mode() & 0o7777,
        meta.uid(),
        group,
        meta.len()
    );
    if ft.is_symlink() {
        match std::fs::read_link(path) {
            Ok(target) => {
                let _ = write!(line, " -> {}", target.display());
            }
            Err(e) => {
                let _ = write!(line, " -> (unreadable: {})", e);
            }
        }
    }
    line
}
