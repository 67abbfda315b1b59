//! Auto-forward command implementation

use anyhow::Result;

use crate::output::{format_outcomes, print_error, print_warning};
use vc_core::config::ForwardConfig;
use vc_core::LocalRange;
use vc_forward::{Backends, ForwardReconciler, ReconcileRequest};

/// Run one reconciliation pass per remote port and print each report
pub async fn auto_forward_command(
    backends: Backends,
    config: ForwardConfig,
    hosts: Vec<String>,
    remote_ports: &[u16],
    local_range: LocalRange,
    no_kill: bool,
    debug: bool,
) -> Result<()> {
    if hosts.is_empty() {
        print_warning("No hosts selected");
        return Ok(());
    }

    let reconciler = ForwardReconciler::new(backends, config);
    let mut failures = 0usize;

    for &remote_port in remote_ports {
        let request = ReconcileRequest {
            hosts: hosts.clone(),
            remote_port,
            local_range,
            suppress_teardown: no_kill,
            verbose: debug,
        };

        let outcomes = match reconciler.reconcile(&request).await {
            Ok(outcomes) => outcomes,
            Err(e) => {
                print_error(&format!("Cannot read local state: {}", e));
                return Err(e.into());
            }
        };

        failures += outcomes.iter().filter(|o| o.status.is_failure()).count();
        if remote_ports.len() > 1 {
            println!("Remote port {}:", remote_port);
        }
        println!("{}", format_outcomes(&outcomes));
    }

    if failures > 0 {
        print_warning(&format!("{} host(s) need attention", failures));
    }
    Ok(())
}
