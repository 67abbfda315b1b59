//! Prefixed multiplexer sessions and the tunnels running inside them

use std::collections::{BTreeSet, HashMap};

use vc_core::error::InventoryError;
use vc_core::traits::{ProcessEntry, ProcessTable, SessionManager};
use vc_core::ObservedTunnel;

use super::tunnels::{is_tunnel_client, tunnels_of};

/// Active sessions whose name starts with `prefix`
pub async fn list_sessions(
    sessions: &dyn SessionManager,
    prefix: &str,
) -> Result<BTreeSet<String>, InventoryError> {
    let names = sessions.list().await?;
    Ok(names
        .into_iter()
        .filter(|name| name.starts_with(prefix))
        .collect())
}

/// Parent-to-children index over one process snapshot
struct ProcessTree<'a> {
    by_pid: HashMap<u32, &'a ProcessEntry>,
    children: HashMap<u32, Vec<u32>>,
}

impl<'a> ProcessTree<'a> {
    fn new(entries: &'a [ProcessEntry]) -> Self {
        let by_pid: HashMap<u32, &ProcessEntry> = entries.iter().map(|e| (e.pid, e)).collect();
        let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
        for entry in entries {
            if let Some(parent) = entry.parent {
                children.entry(parent).or_default().push(entry.pid);
            }
        }
        for kids in children.values_mut() {
            kids.sort_unstable();
        }
        Self { by_pid, children }
    }

    /// Pre-order walk from `root` (inclusive), children by ascending pid
    fn find_first(&self, root: u32, program: &str) -> Option<&'a ProcessEntry> {
        let mut stack = vec![root];
        let mut seen = BTreeSet::new();
        while let Some(pid) = stack.pop() {
            if !seen.insert(pid) {
                continue;
            }
            if let Some(&entry) = self.by_pid.get(&pid) {
                if is_tunnel_client(entry, program) && !tunnels_of(entry).is_empty() {
                    return Some(entry);
                }
            }
            if let Some(kids) = self.children.get(&pid) {
                stack.extend(kids.iter().rev());
            }
        }
        None
    }
}

/// The tunnel running under a session whose panes are `pane_pids`, in an
/// already captured process list.
///
/// The walk covers the pane processes themselves, since a pane shell may
/// `exec` the client. If several tunnel clients live under one session the
/// first one in walk order is returned.
pub fn resolve_tunnel_in(
    entries: &[ProcessEntry],
    pane_pids: &[u32],
    program: &str,
) -> Option<ObservedTunnel> {
    let tree = ProcessTree::new(entries);
    pane_pids
        .iter()
        .find_map(|pid| tree.find_first(*pid, program))
        .and_then(|entry| tunnels_of(entry).into_iter().next())
}

/// Resolve the tunnel behind session `name`.
///
/// A session that vanished between listing and resolution resolves to
/// `None`.
pub async fn resolve_tunnel(
    sessions: &dyn SessionManager,
    processes: &dyn ProcessTable,
    name: &str,
    program: &str,
) -> Result<Option<ObservedTunnel>, InventoryError> {
    let pane_pids = match sessions.pane_pids(name).await {
        Ok(pids) => pids,
        Err(e) => {
            tracing::debug!("Session {} has no panes: {}", name, e);
            return Ok(None);
        }
    };
    let entries = processes.snapshot()?;
    Ok(resolve_tunnel_in(&entries, &pane_pids, program))
}
