//! Timestamped backups of files about to be replaced.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::info;

const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// First free `<path>.backup.<timestamp>[.<n>]` name.
pub fn backup_path(path: &Path, at: DateTime<Utc>) -> PathBuf {
    let base = format!("{}.backup.{}", path.display(), at.format(TIMESTAMP_FORMAT));
    let mut candidate = PathBuf::from(&base);
    let mut n = 1;
    while candidate.symlink_metadata().is_ok() {
        candidate = PathBuf::from(format!("{}.{}", base, n));
        n += 1;
    }
    candidate
}

/// Copy `path` aside if it exists. Returns the backup location.
pub fn backup_file(path: &Path, at: DateTime<Utc>) -> io::Result<Option<PathBuf>> {
    if !path.is_file() {
        return Ok(None);
    }
    let target = backup_path(path, at);
    std::fs::copy(path, &target)?;
    info!("Backed up {} to {}", path.display(), target.display());
    Ok(Some(target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 5).unwrap()
    }

    #[test]
    fn missing_file_is_not_backed_up() {
        let dir = TempDir::new().unwrap();
        let result = backup_file(&dir.path().join("jail.local"), at()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn same_second_backups_do_not_collide() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("jail.local");
        std::fs::write(&file, "first").unwrap();

        let first = backup_file(&file, at()).unwrap().unwrap();
        std::fs::write(&file, "second").unwrap();
        let second = backup_file(&file, at()).unwrap().unwrap();

        assert_eq!(
            first.file_name().unwrap().to_str().unwrap(),
            "jail.local.backup.20240501T123005Z"
        );
        assert_eq!(
            second.file_name().unwrap().to_str().unwrap(),
            "jail.local.backup.20240501T123005Z.1"
        );
        assert_eq!(std::fs::read_to_string(first).unwrap(), "first");
        assert_eq!(std::fs::read_to_string(second).unwrap(), "second");
    }
}
