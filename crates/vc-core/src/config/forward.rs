//! Forwarding configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::{duration_millis, duration_secs};
use crate::types::{LocalRange, DEFAULT_SESSION_PREFIX};

/// Settings for discovery and reconciliation of forwards
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwardConfig {
    /// Prefix of every session name this tool creates or recognizes
    pub session_prefix: String,

    /// Remote port probed when none is given on the command line
    pub remote_port: u16,

    /// Local ports available for new tunnels
    pub local_range: LocalRange,

    /// SSH config used for host enumeration
    pub ssh_config: PathBuf,

    /// Tunnel client program, as it appears in the process table
    pub tunnel_program: String,

    /// Upper bound on one remote command
    #[serde(with = "duration_secs")]
    pub ssh_timeout: Duration,

    /// `curl --max-time` used by the remote probe
    #[serde(with = "duration_millis")]
    pub remote_probe_timeout: Duration,

    /// Timeout for probing a local port while listing
    #[serde(with = "duration_millis")]
    pub local_probe_timeout: Duration,

    /// Timeout for each readiness poll after a launch
    #[serde(with = "duration_millis")]
    pub ready_probe_timeout: Duration,

    /// Pause after creating a tunnel so ssh can bind its port
    #[serde(with = "duration_millis")]
    pub tunnel_settle: Duration,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            session_prefix: DEFAULT_SESSION_PREFIX.to_string(),
            remote_port: 8000,
            local_range: LocalRange::default(),
            ssh_config: dirs::home_dir()
                .unwrap_or_default()
                .join(".ssh")
                .join("config"),
            tunnel_program: "ssh".to_string(),
            ssh_timeout: Duration::from_secs(5),
            remote_probe_timeout: Duration::from_millis(200),
            local_probe_timeout: Duration::from_millis(200),
            ready_probe_timeout: Duration::from_secs(1),
            tunnel_settle: Duration::from_millis(1000),
        }
    }
}
