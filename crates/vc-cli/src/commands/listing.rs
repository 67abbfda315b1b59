//! Listing command implementations

use anyhow::Result;

use crate::output::{format_forward_sessions, format_local_models, format_remote_models};
use vc_core::config::ForwardConfig;
use vc_forward::listing::{list_local_models, list_remote_models};
use vc_forward::{list_forward_sessions, Backends};

/// Show models answering on local ports
pub async fn list_local_command(backends: &Backends, config: &ForwardConfig) -> Result<()> {
    let models = list_local_models(backends, config).await?;
    println!("{}", format_local_models(&models));
    Ok(())
}

/// Show models served on remote hosts
pub async fn list_remote_command(
    backends: &Backends,
    config: &ForwardConfig,
    hosts: &[String],
    remote_port: u16,
    debug: bool,
) -> Result<()> {
    let models = list_remote_models(backends, config, hosts, remote_port).await;
    println!("{}", format_remote_models(&models, debug));
    Ok(())
}

/// Show every forward with its health
pub async fn status_command(backends: &Backends, config: &ForwardConfig) -> Result<()> {
    let sessions = list_forward_sessions(backends, config).await?;
    println!("{}", format_forward_sessions(&sessions));
    Ok(())
}
