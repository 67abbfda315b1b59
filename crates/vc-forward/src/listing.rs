//! Read-mostly views: models reachable locally or remotely, and the
//! tunnel sessions this tool owns

use std::collections::BTreeSet;
use std::fmt;

use vc_core::config::ForwardConfig;
use vc_core::error::{CommandError, InventoryError};
use vc_core::types::parse_session_name;
use vc_core::{Endpoint, ModelIdentity, ObservedTunnel};

use crate::backends::Backends;
use crate::probe::{probe_local, probe_remote};
use crate::world::{ServiceState, WorldState};

/// Where a local port leads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardOrigin {
    pub host: Option<String>,
    pub remote_port: u16,
    pub pid: Option<u32>,
    pub session: Option<String>,
}

/// A model answering on a local port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalModel {
    pub port: u16,
    pub model: ModelIdentity,
    /// Set when the port belongs to a known tunnel
    pub origin: Option<ForwardOrigin>,
}

/// Every local port that answers as an inference server.
///
/// Candidates are the loopback listeners plus every tunnel port, so tunnels
/// are still probed when the socket table could not be read.
pub async fn list_local_models(
    backends: &Backends,
    config: &ForwardConfig,
) -> Result<Vec<LocalModel>, InventoryError> {
    let world = WorldState::capture(backends, config, &[]).await?;

    let mut candidates: BTreeSet<u16> = world.bound_ports.ports.clone();
    candidates.extend(world.tunnels.keys().copied());
    candidates.extend(world.session_tunnels.values().map(|t| t.local_port));

    let mut models = Vec::new();
    for port in candidates {
        if let Some(model) = probe_local(backends.probe.as_ref(), port, config).await {
            models.push(LocalModel {
                port,
                model,
                origin: origin_of(&world, port, &config.session_prefix),
            });
        }
    }
    Ok(models)
}

fn origin_of(world: &WorldState, port: u16, prefix: &str) -> Option<ForwardOrigin> {
    let owning_session = world
        .session_tunnels
        .iter()
        .find(|(_, t)| t.local_port == port)
        .map(|(name, t)| (name.clone(), t));

    if let Some(tunnel) = world.tunnels.get(&port) {
        let session = owning_session.map(|(name, _)| name).or_else(|| {
            let name = Endpoint::new(tunnel.host.clone()?, tunnel.remote_port).session_name(prefix);
            world.has_session(&name).then_some(name)
        });
        return Some(ForwardOrigin {
            host: tunnel.host.clone(),
            remote_port: tunnel.remote_port,
            pid: Some(tunnel.pid),
            session,
        });
    }

    let (name, tunnel) = owning_session?;
    let host = tunnel
        .host
        .clone()
        .or_else(|| parse_session_name(prefix, &name).map(|(host, _)| host));
    Some(ForwardOrigin {
        host,
        remote_port: tunnel.remote_port,
        pid: Some(tunnel.pid),
        session: Some(name),
    })
}

/// Probe result for one remote endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteModel {
    pub endpoint: Endpoint,
    pub state: ServiceState,
}

/// Probe `remote_port` on each host, one host at a time
pub async fn list_remote_models(
    backends: &Backends,
    config: &ForwardConfig,
    hosts: &[String],
    remote_port: u16,
) -> Vec<RemoteModel> {
    let mut models = Vec::with_capacity(hosts.len());
    for host in hosts {
        let state = match probe_remote(backends.remote.as_ref(), host, remote_port, config).await {
            Ok(Some(model)) => ServiceState::Serving(model),
            Ok(None) => ServiceState::Absent,
            Err(e) => {
                tracing::debug!("Cannot probe {}: {}", host, e);
                ServiceState::Unreachable(e)
            }
        };
        models.push(RemoteModel {
            endpoint: Endpoint::new(host.clone(), remote_port),
            state,
        });
    }
    models
}

/// A prefixed session with the tunnel found inside it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionForward {
    pub session: String,
    pub tunnel: Option<ObservedTunnel>,
    /// Model answering on the tunnel's local port
    pub model: Option<ModelIdentity>,
}

/// Every session named with `prefix`, resolved and probed
pub async fn tmux_forwards(
    backends: &Backends,
    config: &ForwardConfig,
    prefix: &str,
) -> Result<Vec<SessionForward>, InventoryError> {
    let config = ForwardConfig {
        session_prefix: prefix.to_string(),
        ..config.clone()
    };
    let world = WorldState::capture(backends, &config, &[]).await?;

    let mut forwards = Vec::with_capacity(world.sessions.len());
    for session in &world.sessions {
        let tunnel = world.session_tunnels.get(session).cloned();
        let model = match &tunnel {
            Some(t) => probe_local(backends.probe.as_ref(), t.local_port, &config).await,
            None => None,
        };
        forwards.push(SessionForward {
            session: session.clone(),
            tunnel,
            model,
        });
    }
    Ok(forwards)
}

/// Why a session was cleaned up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanReason {
    NoTunnel,
    NoModel,
}

impl fmt::Display for CleanReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CleanReason::NoTunnel => write!(f, "no ssh forward"),
            CleanReason::NoModel => write!(f, "no model"),
        }
    }
}

/// A session chosen for cleanup and what happened to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanedSession {
    pub session: String,
    pub reason: CleanReason,
    /// Set when killing the session failed
    pub error: Option<String>,
}

/// Kill every prefixed session without a working forward
pub async fn clean_tmux_forwards(
    backends: &Backends,
    config: &ForwardConfig,
    prefix: &str,
) -> Result<Vec<CleanedSession>, InventoryError> {
    let mut cleaned = Vec::new();
    for forward in tmux_forwards(backends, config, prefix).await? {
        let reason = match (&forward.tunnel, &forward.model) {
            (None, _) => CleanReason::NoTunnel,
            (Some(_), None) => CleanReason::NoModel,
            (Some(_), Some(_)) => continue,
        };
        let error = match kill_session(backends, &forward.session).await {
            Ok(()) => None,
            Err(e) => Some(e.to_string()),
        };
        cleaned.push(CleanedSession {
            session: forward.session,
            reason,
            error,
        });
    }
    Ok(cleaned)
}

/// Kill one session by name
pub async fn kill_session(backends: &Backends, name: &str) -> Result<(), CommandError> {
    tracing::info!("Killing session {}", name);
    backends.sessions.kill(name).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::Harness;

    #[tokio::test]
    async fn test_local_models_with_origin() {
        let h = Harness::new();
        h.existing_tunnel("gpu-1", 8000, 16100);
        h.ports.bind(&[16100, 8080, 22]);
        h.probe.answer(16100, "llama");
        h.probe.answer(8080, "local-model");

        let models = list_local_models(&h.backends(), &Harness::config())
            .await
            .unwrap();
        assert_eq!(models.len(), 2);

        assert_eq!(models[0].port, 8080);
        assert_eq!(models[0].origin, None);

        assert_eq!(models[1].port, 16100);
        let origin = models[1].origin.as_ref().unwrap();
        assert_eq!(origin.host.as_deref(), Some("gpu-1"));
        assert_eq!(origin.remote_port, 8000);
        assert_eq!(origin.session.as_deref(), Some("vllmctl_gpu-1_8000"));
    }

    #[tokio::test]
    async fn test_local_models_probe_tunnels_without_port_scan() {
        let h = Harness::new();
        h.ports.set(vc_core::traits::PortScan::unavailable("ss missing"));
        h.existing_tunnel("gpu-1", 8000, 16100);
        h.probe.answer(16100, "llama");

        let models = list_local_models(&h.backends(), &Harness::config())
            .await
            .unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].port, 16100);
    }

    #[tokio::test]
    async fn test_remote_models_keep_every_host() {
        let h = Harness::new();
        h.remote.serve("gpu-1", 8000, "llama");
        h.remote.set_unreachable("gpu-2");
        let hosts = vec!["gpu-1".to_string(), "gpu-2".to_string(), "gpu-3".to_string()];

        let models = list_remote_models(&h.backends(), &Harness::config(), &hosts, 8000).await;
        assert_eq!(models.len(), 3);
        assert_eq!(models[0].state, ServiceState::Serving(ModelIdentity::new("llama")));
        assert!(matches!(models[1].state, ServiceState::Unreachable(_)));
        assert_eq!(models[2].state, ServiceState::Absent);
    }

    #[tokio::test]
    async fn test_clean_kills_broken_sessions_only() {
        let h = Harness::new();
        h.existing_tunnel("gpu-1", 8000, 16100);
        h.existing_tunnel("gpu-2", 8000, 16101);
        let shell = h.processes.spawn(Some(1), &["bash"]);
        h.sessions.insert("vllmctl_gpu-3_8000", vec![shell]);
        h.sessions.insert("other", vec![]);
        h.probe.answer(16100, "llama");

        let forwards = tmux_forwards(&h.backends(), &Harness::config(), "vllmctl_")
            .await
            .unwrap();
        assert_eq!(forwards.len(), 3);

        let cleaned = clean_tmux_forwards(&h.backends(), &Harness::config(), "vllmctl_")
            .await
            .unwrap();
        assert_eq!(
            cleaned,
            vec![
                CleanedSession {
                    session: "vllmctl_gpu-2_8000".to_string(),
                    reason: CleanReason::NoModel,
                    error: None,
                },
                CleanedSession {
                    session: "vllmctl_gpu-3_8000".to_string(),
                    reason: CleanReason::NoTunnel,
                    error: None,
                },
            ]
        );
        assert_eq!(h.sessions.names(), vec!["other", "vllmctl_gpu-1_8000"]);
    }

    #[tokio::test]
    async fn test_custom_prefix() {
        let h = Harness::new();
        h.sessions.insert("mine_gpu-1_8000", vec![]);
        h.sessions.insert("vllmctl_gpu-1_8000", vec![]);

        let forwards = tmux_forwards(&h.backends(), &Harness::config(), "mine_")
            .await
            .unwrap();
        assert_eq!(forwards.len(), 1);
        assert_eq!(forwards[0].session, "mine_gpu-1_8000");
        assert_eq!(forwards[0].tunnel, None);
    }
}
