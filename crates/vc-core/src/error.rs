//! Core error types for vllmctl
//!
//! Absence (no service on a port, no session, no tunnel) is never an error
//! here; it is modelled with `Option` or dedicated enum variants. These types
//! cover real faults only.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures of the remote-execution channel.
///
/// These are distinct from "the remote command ran and printed nothing":
/// a host that answers but has no service is absence, not a transport fault.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The transport client could not be started
    #[error("failed to spawn {program}: {reason}")]
    Spawn { program: String, reason: String },

    /// The remote command did not finish in time
    #[error("{host}: timed out after {timeout:?}")]
    Timeout { host: String, timeout: Duration },

    /// The transport itself reported failure (ssh exits 255)
    #[error("{host}: {stderr}")]
    Unreachable { host: String, stderr: String },
}

/// Failures of local helper commands (tmux, ss)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The helper program could not be started
    #[error("failed to run {program}: {reason}")]
    Spawn { program: String, reason: String },

    /// The helper exited unsuccessfully
    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },
}

/// Process-table and session-table enumeration failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InventoryError {
    /// The process table could not be read
    #[error("process table unavailable: {0}")]
    Processes(String),

    /// The session manager could not be queried
    #[error("session listing failed: {0}")]
    Sessions(#[from] CommandError),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// Local port range could not be parsed
    #[error("Invalid local range {0:?}: expected START-END, e.g. 16100-16199")]
    LocalRange(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// SSH config could not be read
    #[error("Failed to read {path}: {source}")]
    SshConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
