//! Parsers for probe command output and host files.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use globset::GlobBuilder;
use regex::Regex;
use tracing::warn;

use crate::facts::OsRelease;
use crate::layout::Layout;

static ROUTE_SRC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bsrc\s+(\d{1,3}(?:\.\d{1,3}){3})\b").unwrap());
static INET_ADDR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\binet\s+(\d{1,3}(?:\.\d{1,3}){3})/\d+").unwrap());

/// Nested `Include` limit, as sshd enforces one too.
const MAX_INCLUDE_DEPTH: usize = 16;

const GLOB_META: [char; 4] = ['*', '?', '[', '{'];

/// Source address from `ip -4 route get <dst>`.
pub fn route_source(output: &str) -> Option<Ipv4Addr> {
    ROUTE_SRC
        .captures_iter(output)
        .filter_map(|c| c[1].parse::<Ipv4Addr>().ok())
        .find(|ip| !ip.is_loopback() && !ip.is_unspecified())
}

/// First global address from `ip -4 -o addr show scope global`.
pub fn first_global_address(output: &str) -> Option<Ipv4Addr> {
    INET_ADDR
        .captures_iter(output)
        .filter_map(|c| c[1].parse::<Ipv4Addr>().ok())
        .find(|ip| !ip.is_loopback() && !ip.is_unspecified())
}

/// What scanning the sshd configuration produced.
#[derive(Debug, PartialEq, Eq)]
pub enum PortScan {
    Found(u16),
    Invalid(String),
    NotSet,
}

/// Find the first `Port` directive, following `Include` at the position it
/// appears. Scanning stops at the first `Match` block.
pub fn scan_ssh_port(layout: &Layout) -> std::io::Result<PortScan> {
    let contents = std::fs::read_to_string(&layout.sshd_config)?;
    let host_config = layout
        .sshd_config
        .strip_prefix(layout.root())
        .map(|relative| Path::new("/").join(relative))
        .unwrap_or_else(|_| layout.sshd_config.clone());
    let mut scanner = PortScanner {
        layout,
        base: host_config.parent().map(Path::to_path_buf).unwrap_or_default(),
    };
    Ok(scanner.scan(&contents, 0).unwrap_or(PortScan::NotSet))
}

struct PortScanner<'a> {
    layout: &'a Layout,
    /// Host-absolute directory of the sshd configuration.
    base: PathBuf,
}

impl PortScanner<'_> {
    /// `None` means "keep looking"; `Some` ends the scan.
    fn scan(&mut self, contents: &str, depth: usize) -> Option<PortScan> {
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (keyword, rest) = split_directive(line);
            match keyword.to_ascii_lowercase().as_str() {
                "port" => {
                    let value = rest.split_whitespace().next().unwrap_or("");
                    return Some(match value.parse::<u16>() {
                        Ok(port) if port > 0 => PortScan::Found(port),
                        _ => PortScan::Invalid(value.to_string()),
                    });
                }
                "include" if depth < MAX_INCLUDE_DEPTH => {
                    for pattern in rest.split_whitespace() {
                        for file in self.expand_include(pattern) {
                            let Ok(nested) = std::fs::read_to_string(&file) else {
                                continue;
                            };
                            if let Some(found) = self.scan(&nested, depth + 1) {
                                return Some(found);
                            }
                        }
                    }
                }
                "match" => return Some(PortScan::NotSet),
                _ => {}
            }
        }
        None
    }

    /// Resolve an `Include` argument to files in lexical order. Relative
    /// patterns are relative to the sshd configuration directory. Glob
    /// syntax may appear in any path component.
    fn expand_include(&self, pattern: &str) -> Vec<PathBuf> {
        let host_pattern = self.base.join(pattern);
        let Some(text) = host_pattern.to_str() else {
            return Vec::new();
        };
        if !text.contains(GLOB_META) {
            return vec![self.layout.host_path(&host_pattern)];
        }
        let matcher = match GlobBuilder::new(text).literal_separator(true).build() {
            Ok(glob) => glob.compile_matcher(),
            Err(e) => {
                warn!("Ignoring invalid Include pattern '{}': {}", pattern, e);
                return Vec::new();
            }
        };

        // Walk from the deepest literal directory, one level per remaining
        // pattern component.
        let mut literal = PathBuf::new();
        let mut remaining = 0;
        for component in host_pattern.components() {
            let is_glob = component
                .as_os_str()
                .to_str()
                .is_some_and(|c| c.contains(GLOB_META));
            if remaining > 0 || is_glob {
                remaining += 1;
            } else {
                literal.push(component);
            }
        }

        let mut candidates = Vec::new();
        self.collect_candidates(&literal, remaining, &mut candidates);
        let mut files: Vec<PathBuf> = candidates
            .into_iter()
            .filter(|host| matcher.is_match(host))
            .map(|host| self.layout.host_path(&host))
            .collect();
        files.sort();
        files
    }

    /// Host paths exactly `levels` below `dir` that are regular files.
    fn collect_candidates(&self, dir: &Path, levels: usize, out: &mut Vec<PathBuf>) {
        let Ok(entries) = std::fs::read_dir(self.layout.host_path(dir)) else {
            return;
        };
        for entry in entries.filter_map(|e| e.ok()) {
            let host = dir.join(entry.file_name());
            let on_disk = entry.path();
            if levels == 1 {
                if on_disk.is_file() {
                    out.push(host);
                }
            } else if on_disk.is_dir() {
                self.collect_candidates(&host, levels - 1, out);
            }
        }
    }
}

fn split_directive(line: &str) -> (&str, &str) {
    // sshd accepts both `Key value` and `Key=value`
    let end = line
        .find(|c: char| c.is_whitespace() || c == '=')
        .unwrap_or(line.len());
    let (keyword, rest) = line.split_at(end);
    let rest = rest.trim_start().strip_prefix('=').unwrap_or(rest).trim();
    (keyword, rest)
}

/// Read the identifiers of `/etc/os-release`.
pub fn os_release(path: &Path) -> Result<OsRelease, String> {
    let iter = dotenvy::from_path_iter(path).map_err(|e| e.to_string())?;
    let mut release = OsRelease {
        id: None,
        version_id: None,
        pretty_name: None,
    };
    for item in iter {
        let (key, value) = item.map_err(|e| e.to_string())?;
        match key.as_str() {
            "ID" => release.id = Some(value),
            "VERSION_ID" => release.version_id = Some(value),
            "PRETTY_NAME" => release.pretty_name = Some(value),
            _ => {}
        }
    }
    if release.id.is_none() && release.pretty_name.is_none() {
        return Err("no ID or PRETTY_NAME".to_string());
    }
    Ok(release)
}
