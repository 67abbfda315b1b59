//! Host enumeration from OpenSSH client configuration
//!
//! Only `Host` and `Include` directives matter here. Every concrete alias
//! named on a `Host` line becomes a candidate target; wildcard and negated
//! patterns are skipped since they cannot be connected to by name.

use regex::Regex;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::config::expand_tilde;
use crate::error::ConfigError;

/// Nesting limit for `Include`, matching OpenSSH's own
const MAX_INCLUDE_DEPTH: usize = 16;

/// Host aliases declared in `path` and everything it includes.
///
/// Relative `Include` paths resolve under `~/.ssh`. A missing file yields
/// no hosts.
pub fn parse_hosts(path: &Path) -> Result<Vec<String>, ConfigError> {
    let base = expand_tilde("~/.ssh");
    parse_hosts_with_base(path, &base)
}

/// Like [`parse_hosts`], resolving relative includes against `include_base`
pub fn parse_hosts_with_base(path: &Path, include_base: &Path) -> Result<Vec<String>, ConfigError> {
    let mut hosts = Vec::new();
    let mut seen_hosts = HashSet::new();
    let mut visited = HashSet::new();
    collect(path, include_base, 0, &mut visited, &mut seen_hosts, &mut hosts)?;
    Ok(hosts)
}

fn collect(
    path: &Path,
    include_base: &Path,
    depth: usize,
    visited: &mut HashSet<PathBuf>,
    seen_hosts: &mut HashSet<String>,
    hosts: &mut Vec<String>,
) -> Result<(), ConfigError> {
    if depth > MAX_INCLUDE_DEPTH {
        tracing::warn!("Include nesting too deep at {:?}, skipping", path);
        return Ok(());
    }

    let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if !visited.insert(key) {
        tracing::debug!("Already read {:?}, skipping include cycle", path);
        return Ok(());
    }

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!("SSH config {:?} not found", path);
            return Ok(());
        }
        Err(source) => {
            return Err(ConfigError::SshConfig {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    for line in content.lines() {
        let Some((keyword, argument)) = split_directive(line) else {
            continue;
        };

        if keyword.eq_ignore_ascii_case("host") {
            for pattern in argument.split_whitespace() {
                if is_concrete_alias(pattern) && seen_hosts.insert(pattern.to_string()) {
                    hosts.push(pattern.to_string());
                }
            }
        } else if keyword.eq_ignore_ascii_case("include") {
            for target in argument.split_whitespace() {
                let resolved = resolve_include(target, include_base);
                collect(&resolved, include_base, depth + 1, visited, seen_hosts, hosts)?;
            }
        }
    }

    Ok(())
}

/// Split a config line into keyword and argument (`Key value` or `Key=value`)
fn split_directive(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let split_at = line.find(|c: char| c.is_whitespace() || c == '=')?;
    let (keyword, rest) = line.split_at(split_at);
    let argument = rest.trim_start_matches(|c: char| c.is_whitespace() || c == '=');
    Some((keyword, argument.trim()))
}

fn is_concrete_alias(pattern: &str) -> bool {
    !pattern.is_empty() && !pattern.contains(['*', '?', '!'])
}

fn resolve_include(target: &str, include_base: &Path) -> PathBuf {
    let expanded = expand_tilde(target);
    if expanded.is_absolute() {
        expanded
    } else {
        include_base.join(expanded)
    }
}

/// Keep hosts whose alias matches `pattern` (unanchored), or all when `None`
pub fn filter_hosts(hosts: Vec<String>, pattern: Option<&str>) -> Result<Vec<String>, regex::Error> {
    let Some(pattern) = pattern else {
        return Ok(hosts);
    };
    let re = Regex::new(pattern)?;
    Ok(hosts.into_iter().filter(|h| re.is_match(h)).collect())
}
