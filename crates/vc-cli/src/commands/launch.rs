//! Launch command implementation

use anyhow::Result;

use crate::output::{format_launch, print_error, print_info, print_success, print_warning};
use vc_core::config::ForwardConfig;
use vc_forward::{launch, Backends, LaunchRequest};

/// Start a server and wait for it through a forward
pub async fn launch_command(
    backends: &Backends,
    config: &ForwardConfig,
    request: &LaunchRequest,
) -> Result<()> {
    print_info(&format!(
        "Launching {} on {}:{} (waiting up to {:?})",
        request.model, request.server, request.remote_port, request.ready_timeout
    ));

    let report = match launch(backends, config, request).await {
        Ok(report) => report,
        Err(e) => {
            print_error(&format!("Launch failed: {}", e));
            return Err(e.into());
        }
    };

    if report.ready {
        print_success(&format!(
            "Server ready on http://127.0.0.1:{}",
            report.local_port
        ));
    } else {
        print_warning("Server did not become ready in time; the forward was left running");
    }
    print!("{}", format_launch(&report));
    Ok(())
}
