//! Remote execution over the OpenSSH client

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;

use vc_core::error::TransportError;
use vc_core::traits::RemoteExec;

/// Exit status ssh uses for its own failures
const SSH_FAILURE_STATUS: i32 = 255;

/// Runs commands with `ssh <host> <command>`.
///
/// Batch mode keeps a missing key from blocking on a password prompt.
pub struct SshExec {
    connect_timeout: Duration,
}

impl SshExec {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl RemoteExec for SshExec {
    async fn run(
        &self,
        host: &str,
        command: &str,
        timeout: Duration,
    ) -> Result<String, TransportError> {
        let connect_timeout = format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1));
        let mut cmd = tokio::process::Command::new("ssh");
        cmd.args(["-o", "BatchMode=yes", "-o", &connect_timeout])
            .arg(host)
            .arg(command)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        tracing::debug!("ssh {}: {}", host, command);

        let output = tokio::time::timeout(timeout, cmd.output())
            .await
            .map_err(|_| TransportError::Timeout {
                host: host.to_string(),
                timeout,
            })?
            .map_err(|e| TransportError::Spawn {
                program: "ssh".to_string(),
                reason: e.to_string(),
            })?;

        match output.status.code() {
            Some(SSH_FAILURE_STATUS) | None => {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                Err(TransportError::Unreachable {
                    host: host.to_string(),
                    stderr: if stderr.is_empty() {
                        format!("ssh exited with {}", output.status)
                    } else {
                        stderr
                    },
                })
            }
            Some(_) => Ok(String::from_utf8_lossy(&output.stdout).into_owned()),
        }
    }
}
