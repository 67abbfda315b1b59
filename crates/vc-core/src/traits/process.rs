//! Process-table introspection

use crate::error::InventoryError;

/// One row of the OS process table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    /// Process id
    pub pid: u32,
    /// Parent process id, if known
    pub parent: Option<u32>,
    /// Executable name (e.g. `ssh`)
    pub name: String,
    /// Full argument vector, program first
    pub argv: Vec<String>,
}

/// Read access to the process table plus the ability to stop a process
pub trait ProcessTable: Send + Sync {
    /// Capture every process currently running
    fn snapshot(&self) -> Result<Vec<ProcessEntry>, InventoryError>;

    /// Terminate `pid`; returns whether the signal was delivered
    fn terminate(&self, pid: u32) -> bool;
}
