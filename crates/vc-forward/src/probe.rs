//! Service probing, locally and from a remote host's own view

use vc_core::config::ForwardConfig;
use vc_core::error::TransportError;
use vc_core::traits::{LocalProbe, RemoteExec};
use vc_core::ModelIdentity;

use crate::remote::probe_command;

/// The model served on local `port`, or `None` when nothing answers
pub async fn probe_local(
    probe: &dyn LocalProbe,
    port: u16,
    config: &ForwardConfig,
) -> Option<ModelIdentity> {
    probe.probe(port, config.local_probe_timeout).await
}

/// The model served on `host`'s loopback `port`.
///
/// `Ok(None)` means the host answered and nothing is serving; a channel
/// failure is returned as `Err` so callers can tell the two apart.
pub async fn probe_remote(
    remote: &dyn RemoteExec,
    host: &str,
    port: u16,
    config: &ForwardConfig,
) -> Result<Option<ModelIdentity>, TransportError> {
    let command = probe_command(port, config.remote_probe_timeout);
    let output = remote.run(host, &command, config.ssh_timeout).await?;
    let model = ModelIdentity::from_listing(&output);
    match &model {
        Some(model) => tracing::debug!("{}:{} serves {}", host, port, model),
        None => tracing::debug!("{}:{} has no service", host, port),
    }
    Ok(model)
}
