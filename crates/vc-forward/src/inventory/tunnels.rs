//! Tunnel processes from the process table

use std::collections::BTreeMap;

use vc_core::argv::{forward_specs, infer_host, tokenize, ArityTable};
use vc_core::error::InventoryError;
use vc_core::traits::{ProcessEntry, ProcessTable};
use vc_core::ObservedTunnel;

/// Whether `entry` runs the tunnel client `program`
pub fn is_tunnel_client(entry: &ProcessEntry, program: &str) -> bool {
    if entry.name == program {
        return true;
    }
    entry
        .argv
        .first()
        .map(|arg0| arg0.rsplit('/').next().unwrap_or(arg0) == program)
        .unwrap_or(false)
}

/// Every forwarding spec carried by one process.
///
/// A single process may carry several `-L` flags; each becomes its own
/// tunnel sharing the pid and inferred host.
pub fn tunnels_of(entry: &ProcessEntry) -> Vec<ObservedTunnel> {
    let args = entry.argv.get(1..).unwrap_or_default();
    let tokens = tokenize(args, &ArityTable::SSH);
    let host = infer_host(&tokens);
    forward_specs(&tokens)
        .into_iter()
        .map(|spec| ObservedTunnel {
            pid: entry.pid,
            local_port: spec.local_port,
            remote_port: spec.remote_port,
            host: host.clone(),
        })
        .collect()
}

/// Tunnels in an already captured process list, keyed by local port.
///
/// When two processes claim the same local port the lower pid is kept.
pub fn collect_tunnels(entries: &[ProcessEntry], program: &str) -> BTreeMap<u16, ObservedTunnel> {
    let mut tunnels: BTreeMap<u16, ObservedTunnel> = BTreeMap::new();
    for entry in entries.iter().filter(|e| is_tunnel_client(e, program)) {
        for tunnel in tunnels_of(entry) {
            match tunnels.get(&tunnel.local_port) {
                Some(existing) if existing.pid <= tunnel.pid => {
                    tracing::debug!(
                        "Local port {} claimed by pids {} and {}",
                        tunnel.local_port,
                        existing.pid,
                        tunnel.pid
                    );
                }
                _ => {
                    tunnels.insert(tunnel.local_port, tunnel);
                }
            }
        }
    }
    tunnels
}

/// Snapshot the process table and return its tunnels, keyed by local port
pub fn discover(
    processes: &dyn ProcessTable,
    program: &str,
) -> Result<BTreeMap<u16, ObservedTunnel>, InventoryError> {
    let entries = processes.snapshot()?;
    let tunnels = collect_tunnels(&entries, program);
    tracing::debug!("Found {} tunnel forwards", tunnels.len());
    Ok(tunnels)
}
