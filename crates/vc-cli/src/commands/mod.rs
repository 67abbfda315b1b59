//! CLI command implementations

mod config;
mod forward;
mod launch;
mod listing;
mod tmux;

pub use config::{config_init, config_path, config_show};
pub use forward::auto_forward_command;
pub use launch::launch_command;
pub use listing::{list_local_command, list_remote_command, status_command};
pub use tmux::{clean_tmux_forwards_command, kill_tmux_command, tmux_forwards_command};

use anyhow::{Context, Result};

use vc_core::config::{expand_tilde, ForwardConfig};
use vc_core::ssh_config::{filter_hosts, parse_hosts};

/// Hosts from the SSH config, optionally narrowed by a regex
pub fn resolve_hosts(config: &ForwardConfig, host_regex: Option<&str>) -> Result<Vec<String>> {
    let path = expand_tilde(&config.ssh_config.to_string_lossy());
    let hosts =
        parse_hosts(&path).with_context(|| format!("Failed to read hosts from {:?}", path))?;
    let hosts = filter_hosts(hosts, host_regex).context("Invalid --host-regex")?;
    tracing::debug!("Selected {} hosts from {:?}", hosts.len(), path);
    Ok(hosts)
}
