//! Liveness of individual forwards

use std::collections::BTreeMap;
use std::fmt;

use vc_core::config::ForwardConfig;
use vc_core::error::InventoryError;
use vc_core::types::service_session_name;
use vc_core::{ModelIdentity, ObservedTunnel};

use crate::backends::Backends;
use crate::probe::probe_local;
use crate::remote::has_session_command;
use crate::world::WorldState;

/// Verdict of a liveness check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Liveness {
    /// Session present and the model answers
    Alive,
    /// No session name to check, or the remote host has no such session
    NoSession,
    /// Session present, nothing answers on the local port
    ModelNotResponding,
    /// The session check itself could not run
    Unreachable(String),
}

impl Liveness {
    pub fn is_alive(&self) -> bool {
        matches!(self, Liveness::Alive)
    }

    /// Diagnostic for a dead forward
    pub fn reason(&self) -> Option<String> {
        match self {
            Liveness::Alive => None,
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for Liveness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Liveness::Alive => write!(f, "alive"),
            Liveness::NoSession => write!(f, "No tmux session on remote"),
            Liveness::ModelNotResponding => write!(f, "Model API not responding"),
            Liveness::Unreachable(e) => write!(f, "Remote unreachable: {}", e),
        }
    }
}

/// A forward that is believed to exist, with its last health verdict
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardSession {
    pub local_port: u16,
    pub remote_port: u16,
    /// Remote host, when known
    pub server: Option<String>,
    /// Session on the remote host that should be running the service
    pub tmux_session: Option<String>,
    /// Model last seen answering on `local_port`
    pub model_name: Option<ModelIdentity>,
    pub alive: bool,
    pub reason: Option<String>,
}

impl ForwardSession {
    pub fn new(
        local_port: u16,
        remote_port: u16,
        server: Option<String>,
        tmux_session: Option<String>,
    ) -> Self {
        Self {
            local_port,
            remote_port,
            server,
            tmux_session,
            model_name: None,
            alive: false,
            reason: None,
        }
    }

    fn from_tunnel(tunnel: &ObservedTunnel, prefix: &str) -> Self {
        let tmux_session = tunnel
            .host
            .as_ref()
            .map(|_| service_session_name(prefix, tunnel.remote_port));
        Self::new(
            tunnel.local_port,
            tunnel.remote_port,
            tunnel.host.clone(),
            tmux_session,
        )
    }

    /// Evaluate liveness without recording it.
    ///
    /// The session check comes first and short-circuits: a missing session
    /// outranks a silent model, which may only be slow to start.
    pub async fn liveness(
        &self,
        backends: &Backends,
        config: &ForwardConfig,
    ) -> (Liveness, Option<ModelIdentity>) {
        let (Some(session), Some(server)) = (&self.tmux_session, &self.server) else {
            return (Liveness::NoSession, None);
        };

        let command = has_session_command(session);
        match backends.remote.run(server, &command, config.ssh_timeout).await {
            Ok(output) if output.trim() == "1" => {}
            Ok(_) => return (Liveness::NoSession, None),
            Err(e) => return (Liveness::Unreachable(e.to_string()), None),
        }

        match probe_local(backends.probe.as_ref(), self.local_port, config).await {
            Some(model) => (Liveness::Alive, Some(model)),
            None => (Liveness::ModelNotResponding, None),
        }
    }

    /// Run the liveness check and record the verdict on `self`
    pub async fn check_alive(
        &mut self,
        backends: &Backends,
        config: &ForwardConfig,
    ) -> (bool, Option<String>) {
        let (liveness, model) = self.liveness(backends, config).await;
        if model.is_some() {
            self.model_name = model;
        }
        self.alive = liveness.is_alive();
        self.reason = liveness.reason();
        tracing::debug!(
            "Forward on {} -> {:?}:{}: {}",
            self.local_port,
            self.server,
            self.remote_port,
            liveness
        );
        (self.alive, self.reason.clone())
    }
}

/// Every live forward, checked
pub async fn list_forward_sessions(
    backends: &Backends,
    config: &ForwardConfig,
) -> Result<Vec<ForwardSession>, InventoryError> {
    let world = WorldState::capture(backends, config, &[]).await?;

    let mut by_port: BTreeMap<u16, &ObservedTunnel> =
        world.tunnels.iter().map(|(port, t)| (*port, t)).collect();
    for tunnel in world.session_tunnels.values() {
        by_port.entry(tunnel.local_port).or_insert(tunnel);
    }

    let mut sessions = Vec::with_capacity(by_port.len());
    for tunnel in by_port.values() {
        let mut session = ForwardSession::from_tunnel(tunnel, &config.session_prefix);
        session.check_alive(backends, config).await;
        sessions.push(session);
    }
    Ok(sessions)
}
