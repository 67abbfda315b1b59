//! The set of collaborators one pass talks to

use std::sync::Arc;

use vc_core::config::ForwardConfig;
use vc_core::traits::{LocalProbe, PortScanner, ProcessTable, RemoteExec, SessionManager};

use crate::system::{HttpProbe, SshExec, SsPortScanner, SysProcessTable, Tmux};

/// Handles to everything outside the process: remote shell, session
/// manager, process table, socket table and local HTTP probing.
#[derive(Clone)]
pub struct Backends {
    pub remote: Arc<dyn RemoteExec>,
    pub sessions: Arc<dyn SessionManager>,
    pub processes: Arc<dyn ProcessTable>,
    pub ports: Arc<dyn PortScanner>,
    pub probe: Arc<dyn LocalProbe>,
}

impl Backends {
    /// Backends driving the real ssh, tmux, ss and process table
    pub fn system(config: &ForwardConfig) -> Self {
        Self {
            remote: Arc::new(SshExec::new(config.ssh_timeout)),
            sessions: Arc::new(Tmux::default()),
            processes: Arc::new(SysProcessTable),
            ports: Arc::new(SsPortScanner),
            probe: Arc::new(HttpProbe::new()),
        }
    }
}
