//! Local port space and local service probing

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::time::Duration;

use crate::types::ModelIdentity;

/// Whether a port scan saw the whole socket table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanStatus {
    /// The socket table was read
    Complete,
    /// No scanning tool worked; the port set is empty but not trustworthy
    Unavailable(String),
}

/// Result of listing loopback listeners
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortScan {
    /// Ports with a listener reachable on loopback
    pub ports: BTreeSet<u16>,
    /// Completeness of `ports`
    pub status: ScanStatus,
}

impl PortScan {
    /// A scan that read the socket table
    pub fn complete(ports: impl IntoIterator<Item = u16>) -> Self {
        Self {
            ports: ports.into_iter().collect(),
            status: ScanStatus::Complete,
        }
    }

    /// A scan that could not run
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            ports: BTreeSet::new(),
            status: ScanStatus::Unavailable(reason.into()),
        }
    }

    /// Whether `ports` can be taken at face value
    pub fn is_complete(&self) -> bool {
        self.status == ScanStatus::Complete
    }
}

/// Lists locally bound listening ports
#[async_trait]
pub trait PortScanner: Send + Sync {
    async fn listening_ports(&self) -> PortScan;
}

/// Asks a local port for its self-description
#[async_trait]
pub trait LocalProbe: Send + Sync {
    /// The model served on `port`, or `None` if nothing answers properly.
    ///
    /// Non-success status, timeout and malformed bodies are all absence.
    async fn probe(&self, port: u16, timeout: Duration) -> Option<ModelIdentity>;
}
