//! Terminal-multiplexer session management

use async_trait::async_trait;

use crate::error::CommandError;

/// Detached, named sessions on the local machine
#[async_trait]
pub trait SessionManager: Send + Sync {
    /// Names of all active sessions. No running server means no sessions.
    async fn list(&self) -> Result<Vec<String>, CommandError>;

    /// Start a detached session `name` running `command`
    async fn create(&self, name: &str, command: &str) -> Result<(), CommandError>;

    /// Process ids of the panes owned by session `name`
    async fn pane_pids(&self, name: &str) -> Result<Vec<u32>, CommandError>;

    /// Terminate session `name`
    async fn kill(&self, name: &str) -> Result<(), CommandError>;
}
