//! Remote command execution

use async_trait::async_trait;
use std::time::Duration;

use crate::error::TransportError;

/// Runs a shell command on a remote host
#[async_trait]
pub trait RemoteExec: Send + Sync {
    /// Execute `command` on `host` and return its standard output.
    ///
    /// A remote command that runs but fails (for example `curl` finding
    /// nothing on the port) still returns `Ok` with whatever it printed.
    /// Only failures of the channel itself are `Err`.
    async fn run(
        &self,
        host: &str,
        command: &str,
        timeout: Duration,
    ) -> Result<String, TransportError>;
}
