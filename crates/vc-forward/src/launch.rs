//! Starting an inference server behind a fresh forward
//!
//! Creating the tunnel and waiting for the server are not transactional:
//! when the server never becomes ready the tunnel stays up and the report
//! names both sessions so they can be inspected by hand.

use std::collections::BTreeSet;
use std::time::Duration;
use thiserror::Error;

use vc_core::config::{ForwardConfig, LaunchConfig};
use vc_core::error::{CommandError, InventoryError, TransportError};
use vc_core::types::service_session_name;
use vc_core::{Endpoint, LocalRange, ModelIdentity};

use crate::backends::Backends;
use crate::remote::{tunnel_command, ServeCommand};
use crate::world::{Correlation, WorldState};

/// What to launch and where
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub server: String,
    pub remote_port: u16,
    pub local_range: LocalRange,
    pub model: String,
    pub tensor_parallel_size: u32,
    pub conda_env: String,
    /// Give up waiting for the server after this long
    pub ready_timeout: Duration,
    pub poll_interval: Duration,
}

impl LaunchRequest {
    /// A request for `server` with every other field from configuration
    pub fn from_config(
        server: impl Into<String>,
        forward: &ForwardConfig,
        launch: &LaunchConfig,
    ) -> Self {
        Self {
            server: server.into(),
            remote_port: forward.remote_port,
            local_range: forward.local_range,
            model: launch.model.clone(),
            tensor_parallel_size: launch.tensor_parallel_size,
            conda_env: launch.conda_env.clone(),
            ready_timeout: launch.ready_timeout,
            poll_interval: launch.poll_interval,
        }
    }
}

/// Launch failures that happen before the readiness wait
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error(transparent)]
    Inventory(#[from] InventoryError),

    #[error("no free local port in {0}")]
    NoFreePorts(LocalRange),

    #[error("session {0} already exists but does not forward this endpoint")]
    DuplicateSession(String),

    #[error("failed to create tunnel session {session}: {source}")]
    Tunnel {
        session: String,
        #[source]
        source: CommandError,
    },

    #[error("failed to start server in {session}: {source}")]
    Start {
        session: String,
        #[source]
        source: TransportError,
    },
}

/// Where the launched server can be reached, and whether it answered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchReport {
    pub endpoint: Endpoint,
    pub local_port: u16,
    /// Local session holding the tunnel
    pub tunnel_session: String,
    /// Remote session running the server
    pub service_session: String,
    /// An existing forward was used instead of creating one
    pub reused_forward: bool,
    /// Model the server reported once ready
    pub model: Option<ModelIdentity>,
    pub ready: bool,
}

/// Forward a local port to `request.server`, start the server there and
/// wait for it to answer through the forward.
pub async fn launch(
    backends: &Backends,
    config: &ForwardConfig,
    request: &LaunchRequest,
) -> Result<LaunchReport, LaunchError> {
    let endpoint = Endpoint::new(request.server.clone(), request.remote_port);
    let tunnel_session = endpoint.session_name(&config.session_prefix);
    let service_session = service_session_name(&config.session_prefix, request.remote_port);

    let world = WorldState::capture(backends, config, &[]).await?;
    let (local_port, reused_forward) = match world.correlate(&endpoint) {
        Correlation::Forwarded(forward) => {
            tracing::info!("Reusing forward on local port {}", forward.local_port);
            (forward.local_port, true)
        }
        Correlation::Duplicate { session, .. } => {
            return Err(LaunchError::DuplicateSession(session));
        }
        Correlation::Absent => {
            let local_port = world
                .allocate(&request.local_range, &BTreeSet::new())
                .ok_or(LaunchError::NoFreePorts(request.local_range))?;
            let command = tunnel_command(
                &config.tunnel_program,
                &endpoint.host,
                endpoint.remote_port,
                local_port,
            );
            backends
                .sessions
                .create(&tunnel_session, &command)
                .await
                .map_err(|source| LaunchError::Tunnel {
                    session: tunnel_session.clone(),
                    source,
                })?;
            tracing::info!("Forwarding localhost:{} to {}", local_port, endpoint);
            if !config.tunnel_settle.is_zero() {
                tokio::time::sleep(config.tunnel_settle).await;
            }
            (local_port, false)
        }
    };

    let serve = ServeCommand {
        conda_env: &request.conda_env,
        model: &request.model,
        tensor_parallel_size: request.tensor_parallel_size,
        port: request.remote_port,
    };
    tracing::info!(
        "Starting {} on {} in {}",
        request.model,
        request.server,
        service_session
    );
    backends
        .remote
        .run(
            &request.server,
            &serve.in_session(&service_session),
            config.ssh_timeout,
        )
        .await
        .map_err(|source| LaunchError::Start {
            session: service_session.clone(),
            source,
        })?;

    let model = wait_ready(backends, config, local_port, request).await;
    if model.is_none() {
        tracing::warn!(
            "Server not ready after {:?}; tunnel {} left running, check {} on {}",
            request.ready_timeout,
            tunnel_session,
            service_session,
            request.server
        );
    }

    Ok(LaunchReport {
        endpoint,
        local_port,
        tunnel_session,
        service_session,
        reused_forward,
        ready: model.is_some(),
        model,
    })
}

/// Poll the local end of the forward until it answers or time runs out
async fn wait_ready(
    backends: &Backends,
    config: &ForwardConfig,
    local_port: u16,
    request: &LaunchRequest,
) -> Option<ModelIdentity> {
    let deadline = tokio::time::Instant::now() + request.ready_timeout;
    loop {
        let probed = backends
            .probe
            .probe(local_port, config.ready_probe_timeout)
            .await;
        if let Some(model) = probed {
            tracing::info!("Server on localhost:{} is ready ({})", local_port, model);
            return Some(model);
        }
        if tokio::time::Instant::now() >= deadline {
            return None;
        }
        tracing::debug!("Waiting for localhost:{}", local_port);
        tokio::time::sleep(request.poll_interval).await;
    }
}
