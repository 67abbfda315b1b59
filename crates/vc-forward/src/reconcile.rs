//! Forward reconciliation
//!
//! One pass captures a [`WorldState`], then walks the requested hosts in
//! order and converges each endpoint toward "forwarded exactly when a
//! service is running":
//!
//! | service | live forward | session live | action               |
//! |---------|--------------|--------------|----------------------|
//! | yes     | no           | yes          | report duplicate     |
//! | yes     | no           | no           | allocate and create  |
//! | yes     | yes          | -            | none                 |
//! | no      | yes          | -            | tear down (unless suppressed) |
//! | no      | no           | -            | none                 |
//!
//! Failures are scoped to one host. An unreachable host, an exhausted port
//! range or a failing tunnel command produce an outcome for that host and
//! the pass moves on.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use vc_core::config::ForwardConfig;
use vc_core::error::InventoryError;
use vc_core::{Endpoint, Forward, LocalRange, ModelIdentity};

use crate::backends::Backends;
use crate::remote::tunnel_command;
use crate::world::{Correlation, ServiceState, WorldState};

/// Desired state for one pass
#[derive(Debug, Clone)]
pub struct ReconcileRequest {
    /// Hosts to converge, in order
    pub hosts: Vec<String>,
    /// Remote port of the service on every host
    pub remote_port: u16,
    /// Where new local ports come from
    pub local_range: LocalRange,
    /// Keep forwards whose service went away
    pub suppress_teardown: bool,
    /// Also report hosts that were skipped (unreachable or idle)
    pub verbose: bool,
}

/// Result of converging one endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardStatus {
    Forwarded,
    AlreadyForwarded,
    DuplicateSession(String),
    TornDown,
    TeardownSuppressed,
    NoFreePorts,
    TunnelFailed(String),
    TeardownFailed(String),
    Unreachable(String),
    NoModel,
}

impl ForwardStatus {
    /// Whether the outcome reports a problem
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            ForwardStatus::DuplicateSession(_)
                | ForwardStatus::NoFreePorts
                | ForwardStatus::TunnelFailed(_)
                | ForwardStatus::TeardownFailed(_)
                | ForwardStatus::Unreachable(_)
        )
    }
}

impl fmt::Display for ForwardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForwardStatus::Forwarded => write!(f, "forwarded"),
            ForwardStatus::AlreadyForwarded => write!(f, "already forwarded"),
            ForwardStatus::DuplicateSession(name) => write!(f, "duplicate session: {}", name),
            ForwardStatus::TornDown => write!(f, "forward torn down"),
            ForwardStatus::TeardownSuppressed => write!(f, "forward kept (teardown suppressed)"),
            ForwardStatus::NoFreePorts => write!(f, "no free local ports"),
            ForwardStatus::TunnelFailed(e) => write!(f, "tunnel failed: {}", e),
            ForwardStatus::TeardownFailed(e) => write!(f, "teardown failed: {}", e),
            ForwardStatus::Unreachable(e) => write!(f, "unreachable: {}", e),
            ForwardStatus::NoModel => write!(f, "no model"),
        }
    }
}

/// One row of a pass report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardOutcome {
    pub host: String,
    pub remote_port: u16,
    pub local_port: Option<u16>,
    pub status: ForwardStatus,
    pub model: Option<ModelIdentity>,
}

impl ForwardOutcome {
    fn new(endpoint: &Endpoint, local_port: Option<u16>, status: ForwardStatus) -> Self {
        Self {
            host: endpoint.host.clone(),
            remote_port: endpoint.remote_port,
            local_port,
            status,
            model: None,
        }
    }

    fn with_model(mut self, model: &ModelIdentity) -> Self {
        self.model = Some(model.clone());
        self
    }
}

/// Drives passes against a fixed set of backends
pub struct ForwardReconciler {
    backends: Backends,
    config: ForwardConfig,
}

impl ForwardReconciler {
    pub fn new(backends: Backends, config: ForwardConfig) -> Self {
        Self { backends, config }
    }

    /// Capture the world and converge it.
    ///
    /// Only a failure to read the process table or the session list fails
    /// the pass; everything host-specific becomes an outcome.
    pub async fn reconcile(
        &self,
        request: &ReconcileRequest,
    ) -> Result<Vec<ForwardOutcome>, InventoryError> {
        let endpoints = endpoints_of(request);
        let world = WorldState::capture(&self.backends, &self.config, &endpoints).await?;
        Ok(self.converge(&world, request).await)
    }

    /// Converge `world` toward `request`. `world` is the only view of the
    /// OS consulted; it is not refreshed as actions are taken.
    pub async fn converge(
        &self,
        world: &WorldState,
        request: &ReconcileRequest,
    ) -> Vec<ForwardOutcome> {
        let mut claimed = BTreeSet::new();
        let mut outcomes = Vec::new();

        for endpoint in endpoints_of(request) {
            let outcome = match world.service(&endpoint) {
                Some(ServiceState::Serving(model)) => Some(
                    self.ensure_forward(world, &endpoint, request, &mut claimed)
                        .await
                        .with_model(model),
                ),
                Some(ServiceState::Absent) => {
                    self.ensure_no_forward(world, &endpoint, request).await
                }
                Some(ServiceState::Unreachable(e)) => request.verbose.then(|| {
                    let local_port = forwarded_port(world, &endpoint);
                    ForwardOutcome::new(&endpoint, local_port, ForwardStatus::Unreachable(e.to_string()))
                }),
                None => {
                    tracing::warn!("{} was not probed in this pass, skipping", endpoint);
                    None
                }
            };

            if let Some(outcome) = outcome {
                tracing::info!(
                    "{}:{} -> {}",
                    outcome.host,
                    outcome.remote_port,
                    outcome.status
                );
                outcomes.push(outcome);
            }
        }

        outcomes
    }

    async fn ensure_forward(
        &self,
        world: &WorldState,
        endpoint: &Endpoint,
        request: &ReconcileRequest,
        claimed: &mut BTreeSet<u16>,
    ) -> ForwardOutcome {
        match world.correlate(endpoint) {
            Correlation::Forwarded(forward) => ForwardOutcome::new(
                endpoint,
                Some(forward.local_port),
                ForwardStatus::AlreadyForwarded,
            ),
            Correlation::Duplicate {
                session,
                local_port,
            } => {
                tracing::warn!(
                    "Session {} exists but does not forward {}",
                    session,
                    endpoint
                );
                ForwardOutcome::new(endpoint, local_port, ForwardStatus::DuplicateSession(session))
            }
            Correlation::Absent => {
                let Some(local_port) = world.allocate(&request.local_range, claimed) else {
                    tracing::warn!(
                        "No free local port in {} for {}",
                        request.local_range,
                        endpoint
                    );
                    return ForwardOutcome::new(endpoint, None, ForwardStatus::NoFreePorts);
                };
                match self.create_tunnel(endpoint, local_port).await {
                    Ok(()) => {
                        claimed.insert(local_port);
                        ForwardOutcome::new(endpoint, Some(local_port), ForwardStatus::Forwarded)
                    }
                    Err(e) => {
                        tracing::error!("Failed to forward {}: {}", endpoint, e);
                        ForwardOutcome::new(endpoint, None, ForwardStatus::TunnelFailed(e))
                    }
                }
            }
        }
    }

    async fn ensure_no_forward(
        &self,
        world: &WorldState,
        endpoint: &Endpoint,
        request: &ReconcileRequest,
    ) -> Option<ForwardOutcome> {
        let Correlation::Forwarded(forward) = world.correlate(endpoint) else {
            return request
                .verbose
                .then(|| ForwardOutcome::new(endpoint, None, ForwardStatus::NoModel));
        };

        if request.suppress_teardown {
            return Some(ForwardOutcome::new(
                endpoint,
                Some(forward.local_port),
                ForwardStatus::TeardownSuppressed,
            ));
        }

        let status = match self.teardown(world, &forward).await {
            Ok(()) => ForwardStatus::TornDown,
            Err(e) => {
                tracing::error!("Failed to tear down {}: {}", endpoint, e);
                ForwardStatus::TeardownFailed(e)
            }
        };
        Some(ForwardOutcome::new(endpoint, Some(forward.local_port), status))
    }

    /// Start the tunnel session for `endpoint` on `local_port`
    async fn create_tunnel(&self, endpoint: &Endpoint, local_port: u16) -> Result<(), String> {
        let name = endpoint.session_name(&self.config.session_prefix);
        let command = tunnel_command(
            &self.config.tunnel_program,
            &endpoint.host,
            endpoint.remote_port,
            local_port,
        );
        tracing::debug!("Creating session {}: {}", name, command);

        self.backends
            .sessions
            .create(&name, &command)
            .await
            .map_err(|e| e.to_string())?;

        if !self.config.tunnel_settle.is_zero() {
            tokio::time::sleep(self.config.tunnel_settle).await;
        }
        Ok(())
    }

    /// Stop `forward`: its session if live, otherwise its tunnel process
    async fn teardown(&self, world: &WorldState, forward: &Forward) -> Result<(), String> {
        if world.has_session(&forward.session_name) {
            tracing::debug!("Killing session {}", forward.session_name);
            return self
                .backends
                .sessions
                .kill(&forward.session_name)
                .await
                .map_err(|e| e.to_string());
        }

        match forward.pid {
            Some(pid) if self.backends.processes.terminate(pid) => Ok(()),
            Some(pid) => Err(format!("could not signal process {}", pid)),
            None => Err(format!("no session or process owns port {}", forward.local_port)),
        }
    }
}

/// Requested endpoints, hosts de-duplicated in order
fn endpoints_of(request: &ReconcileRequest) -> Vec<Endpoint> {
    let mut seen = HashSet::new();
    request
        .hosts
        .iter()
        .filter(|host| seen.insert(host.as_str()))
        .map(|host| Endpoint::new(host.clone(), request.remote_port))
        .collect()
}

fn forwarded_port(world: &WorldState, endpoint: &Endpoint) -> Option<u16> {
    match world.correlate(endpoint) {
        Correlation::Forwarded(forward) => Some(forward.local_port),
        Correlation::Duplicate { local_port, .. } => local_port,
        Correlation::Absent => None,
    }
}
