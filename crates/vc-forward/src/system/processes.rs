//! Process table backed by sysinfo

use sysinfo::{Pid, Signal, System};

use vc_core::error::InventoryError;
use vc_core::traits::{ProcessEntry, ProcessTable};

/// The local OS process table
pub struct SysProcessTable;

impl ProcessTable for SysProcessTable {
    fn snapshot(&self) -> Result<Vec<ProcessEntry>, InventoryError> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(InventoryError::Processes(
                "process listing is not supported on this platform".to_string(),
            ));
        }

        let sys = System::new_all();
        let mut entries: Vec<ProcessEntry> = sys
            .processes()
            .iter()
            .map(|(pid, process)| ProcessEntry {
                pid: pid.as_u32(),
                parent: process.parent().map(|p| p.as_u32()),
                name: process.name().to_string_lossy().into_owned(),
                argv: process
                    .cmd()
                    .iter()
                    .map(|arg| arg.to_string_lossy().into_owned())
                    .collect(),
            })
            .collect();
        entries.sort_by_key(|entry| entry.pid);

        tracing::trace!("Captured {} processes", entries.len());
        Ok(entries)
    }

    fn terminate(&self, pid: u32) -> bool {
        let sys = System::new_all();
        match sys.process(Pid::from_u32(pid)) {
            Some(process) => {
                tracing::debug!("Terminating process {}", pid);
                process
                    .kill_with(Signal::Term)
                    .unwrap_or_else(|| process.kill())
            }
            None => {
                tracing::debug!("Process {} already gone", pid);
                false
            }
        }
    }
}
