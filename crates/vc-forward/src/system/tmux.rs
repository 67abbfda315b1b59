//! Session management through tmux

use async_trait::async_trait;
use std::process::Output;

use vc_core::error::CommandError;
use vc_core::traits::SessionManager;

/// Drives the local tmux server.
///
/// Targets are written as `=name` so tmux matches the session name exactly
/// instead of by prefix.
pub struct Tmux {
    program: String,
}

impl Default for Tmux {
    fn default() -> Self {
        Self {
            program: "tmux".to_string(),
        }
    }
}

impl Tmux {
    async fn run(&self, args: &[&str]) -> Result<Output, CommandError> {
        tracing::debug!("{} {}", self.program, args.join(" "));
        tokio::process::Command::new(&self.program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| CommandError::Spawn {
                program: self.program.clone(),
                reason: e.to_string(),
            })
    }

    fn failed(&self, output: &Output) -> CommandError {
        CommandError::Failed {
            program: self.program.clone(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
    }

    async fn run_checked(&self, args: &[&str]) -> Result<Output, CommandError> {
        let output = self.run(args).await?;
        if output.status.success() {
            Ok(output)
        } else {
            Err(self.failed(&output))
        }
    }
}

/// tmux reports a missing server as an error; for listing it means "none"
fn is_no_server(stderr: &str) -> bool {
    stderr.contains("no server running")
        || stderr.contains("error connecting to")
        || stderr.contains("no sessions")
}

#[async_trait]
impl SessionManager for Tmux {
    async fn list(&self) -> Result<Vec<String>, CommandError> {
        let output = self.run(&["list-sessions", "-F", "#{session_name}"]).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if is_no_server(&stderr) {
                return Ok(Vec::new());
            }
            return Err(self.failed(&output));
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn create(&self, name: &str, command: &str) -> Result<(), CommandError> {
        self.run_checked(&["new-session", "-d", "-s", name, command])
            .await
            .map(|_| ())
    }

    async fn pane_pids(&self, name: &str) -> Result<Vec<u32>, CommandError> {
        let target = format!("={}", name);
        let output = self
            .run_checked(&["list-panes", "-s", "-t", &target, "-F", "#{pane_pid}"])
            .await?;
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(|line| line.trim().parse::<u32>().ok())
            .collect())
    }

    async fn kill(&self, name: &str) -> Result<(), CommandError> {
        let target = format!("={}", name);
        self.run_checked(&["kill-session", "-t", &target])
            .await
            .map(|_| ())
    }
}
