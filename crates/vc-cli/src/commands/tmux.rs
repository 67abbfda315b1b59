//! Tunnel-session command implementations

use anyhow::Result;

use crate::output::{format_cleaned, format_session_forwards, print_error, print_success};
use vc_core::config::ForwardConfig;
use vc_forward::listing::{clean_tmux_forwards, kill_session, tmux_forwards};
use vc_forward::Backends;

/// List tunnel sessions and what they forward
pub async fn tmux_forwards_command(
    backends: &Backends,
    config: &ForwardConfig,
    prefix: &str,
) -> Result<()> {
    let forwards = tmux_forwards(backends, config, prefix).await?;
    println!("{}", format_session_forwards(&forwards));
    Ok(())
}

/// Kill tunnel sessions without a working forward
pub async fn clean_tmux_forwards_command(
    backends: &Backends,
    config: &ForwardConfig,
    prefix: &str,
) -> Result<()> {
    let cleaned = clean_tmux_forwards(backends, config, prefix).await?;
    println!("{}", format_cleaned(&cleaned));
    Ok(())
}

/// Kill one session by name
pub async fn kill_tmux_command(backends: &Backends, session: &str) -> Result<()> {
    match kill_session(backends, session).await {
        Ok(()) => {
            print_success(&format!("Killed session {}", session));
            Ok(())
        }
        Err(e) => {
            print_error(&format!("Failed to kill {}: {}", session, e));
            Err(e.into())
        }
    }
}
