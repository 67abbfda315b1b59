//! One consistent snapshot of everything a pass decides on

use std::collections::{BTreeMap, BTreeSet};

use vc_core::config::ForwardConfig;
use vc_core::error::{InventoryError, TransportError};
use vc_core::traits::PortScan;
use vc_core::{Endpoint, Forward, LocalRange, ModelIdentity, ObservedTunnel};

use crate::backends::Backends;
use crate::inventory::{collect_tunnels, list_sessions, resolve_tunnel_in};
use crate::probe::probe_remote;

/// What a remote probe found behind an endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceState {
    /// A service answered with this identity
    Serving(ModelIdentity),
    /// The host answered; nothing is serving on the port
    Absent,
    /// The host could not be asked
    Unreachable(TransportError),
}

/// How an endpoint relates to the live forwards
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Correlation {
    /// A live forward serves the endpoint
    Forwarded(Forward),
    /// The endpoint's session exists but no tunnel inside it serves the
    /// endpoint
    Duplicate {
        session: String,
        local_port: Option<u16>,
    },
    /// Nothing live for this endpoint
    Absent,
}

/// Live state captured once at the start of a pass.
///
/// Never refreshed or edited afterwards: every decision in a pass is made
/// against the same snapshot, even if the OS changes underneath.
#[derive(Debug, Clone)]
pub struct WorldState {
    /// Loopback listeners
    pub bound_ports: PortScan,
    /// Tunnel processes by local port
    pub tunnels: BTreeMap<u16, ObservedTunnel>,
    /// Live prefixed sessions
    pub sessions: BTreeSet<String>,
    /// Tunnel found inside each session, where one was found
    pub session_tunnels: BTreeMap<String, ObservedTunnel>,
    /// Remote probe result per requested endpoint
    pub services: BTreeMap<Endpoint, ServiceState>,
    prefix: String,
}

impl WorldState {
    /// Capture the world as seen by `backends`.
    ///
    /// Remote probes run one endpoint at a time, in order. A probe that
    /// cannot reach its host is recorded, not raised; failing to read the
    /// process table or the session list fails the capture.
    pub async fn capture(
        backends: &Backends,
        config: &ForwardConfig,
        endpoints: &[Endpoint],
    ) -> Result<Self, InventoryError> {
        let bound_ports = backends.ports.listening_ports().await;
        if let vc_core::traits::ScanStatus::Unavailable(reason) = &bound_ports.status {
            tracing::warn!("Listening ports unknown: {}", reason);
        }

        let entries = backends.processes.snapshot()?;
        let tunnels = collect_tunnels(&entries, &config.tunnel_program);

        let sessions = list_sessions(backends.sessions.as_ref(), &config.session_prefix).await?;
        let mut session_tunnels = BTreeMap::new();
        for name in &sessions {
            let pane_pids = match backends.sessions.pane_pids(name).await {
                Ok(pids) => pids,
                Err(e) => {
                    tracing::debug!("Cannot list panes of {}: {}", name, e);
                    continue;
                }
            };
            if let Some(tunnel) = resolve_tunnel_in(&entries, &pane_pids, &config.tunnel_program) {
                session_tunnels.insert(name.clone(), tunnel);
            }
        }

        let mut services = BTreeMap::new();
        for endpoint in endpoints {
            let state = match probe_remote(
                backends.remote.as_ref(),
                &endpoint.host,
                endpoint.remote_port,
                config,
            )
            .await
            {
                Ok(Some(model)) => ServiceState::Serving(model),
                Ok(None) => ServiceState::Absent,
                Err(e) => {
                    tracing::warn!("Cannot probe {}: {}", endpoint, e);
                    ServiceState::Unreachable(e)
                }
            };
            services.insert(endpoint.clone(), state);
        }

        tracing::debug!(
            "World: {} bound ports, {} tunnels, {} sessions ({} resolved)",
            bound_ports.ports.len(),
            tunnels.len(),
            sessions.len(),
            session_tunnels.len()
        );

        Ok(Self {
            bound_ports,
            tunnels,
            sessions,
            session_tunnels,
            services,
            prefix: config.session_prefix.clone(),
        })
    }

    /// Probe result for `endpoint`, if it was requested at capture
    pub fn service(&self, endpoint: &Endpoint) -> Option<&ServiceState> {
        self.services.get(endpoint)
    }

    /// Whether session `name` was live at capture
    pub fn has_session(&self, name: &str) -> bool {
        self.sessions.contains(name)
    }

    /// Every live forward serving `endpoint`, lowest local port first.
    ///
    /// Process-table tunnels and session-resolved tunnels are merged by
    /// local port, so one tunnel seen through both channels counts once.
    pub fn forwards_for(&self, endpoint: &Endpoint) -> Vec<Forward> {
        let session_name = endpoint.session_name(&self.prefix);
        let mut found: BTreeMap<u16, Forward> = BTreeMap::new();

        for tunnel in self.tunnels.values().filter(|t| t.serves(endpoint)) {
            found.insert(
                tunnel.local_port,
                Forward {
                    endpoint: endpoint.clone(),
                    local_port: tunnel.local_port,
                    session_name: session_name.clone(),
                    pid: Some(tunnel.pid),
                },
            );
        }

        if let Some(tunnel) = self.session_tunnels.get(&session_name) {
            let host_agrees = tunnel.host.as_deref().map_or(true, |h| h == endpoint.host);
            if tunnel.remote_port == endpoint.remote_port && host_agrees {
                found.entry(tunnel.local_port).or_insert_with(|| Forward {
                    endpoint: endpoint.clone(),
                    local_port: tunnel.local_port,
                    session_name: session_name.clone(),
                    pid: Some(tunnel.pid),
                });
            }
        }

        found.into_values().collect()
    }

    /// Relate `endpoint` to the live forwards
    pub fn correlate(&self, endpoint: &Endpoint) -> Correlation {
        let mut forwards = self.forwards_for(endpoint);
        if forwards.len() > 1 {
            let ports: Vec<u16> = forwards.iter().map(|f| f.local_port).collect();
            tracing::warn!("{} is forwarded more than once, on ports {:?}", endpoint, ports);
        }
        if !forwards.is_empty() {
            return Correlation::Forwarded(forwards.remove(0));
        }

        let session = endpoint.session_name(&self.prefix);
        if self.has_session(&session) {
            let local_port = self.session_tunnels.get(&session).map(|t| t.local_port);
            return Correlation::Duplicate {
                session,
                local_port,
            };
        }

        Correlation::Absent
    }

    /// Local ports held by a listener or by any known tunnel
    pub fn used_ports(&self) -> BTreeSet<u16> {
        let mut used = self.bound_ports.ports.clone();
        used.extend(self.tunnels.keys().copied());
        used.extend(self.session_tunnels.values().map(|t| t.local_port));
        used
    }

    /// Lowest port of `range` that is neither used nor in `claimed`
    pub fn allocate(&self, range: &LocalRange, claimed: &BTreeSet<u16>) -> Option<u16> {
        let used = self.used_ports();
        range
            .ports()
            .find(|port| !used.contains(port) && !claimed.contains(port))
    }
}
