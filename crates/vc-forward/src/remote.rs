//! Shell commands sent over the remote-execution channel or to tmux

use std::time::Duration;

/// Quote `s` as a single POSIX shell word
pub fn shell_quote(s: &str) -> String {
    if !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ':' | '=' | '@' | ','))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Self-description URL of a service on `port`, from the host's own view
pub fn models_url(port: u16) -> String {
    format!("http://127.0.0.1:{}/v1/models", port)
}

/// Remote command that prints the self-description body, or nothing
pub fn probe_command(port: u16, max_time: Duration) -> String {
    format!(
        "curl -s --max-time {} {}",
        format_seconds(max_time),
        models_url(port)
    )
}

/// Remote command that prints `1` if session `name` exists, else `0`
pub fn has_session_command(name: &str) -> String {
    format!(
        "tmux has-session -t {} 2>/dev/null && echo 1 || echo 0",
        shell_quote(&format!("={}", name))
    )
}

/// Local command run inside a tunnel session
pub fn tunnel_command(program: &str, host: &str, remote_port: u16, local_port: u16) -> String {
    format!(
        "{} -N -L {}:localhost:{} {} -o ServerAliveInterval=30 -o ServerAliveCountMax=3",
        program,
        local_port,
        remote_port,
        shell_quote(host)
    )
}

/// Parameters of `vllm serve`
#[derive(Debug, Clone)]
pub struct ServeCommand<'a> {
    pub conda_env: &'a str,
    pub model: &'a str,
    pub tensor_parallel_size: u32,
    pub port: u16,
}

impl ServeCommand<'_> {
    /// Script that activates the environment and starts the server
    pub fn script(&self) -> String {
        format!(
            "source ~/.bashrc && conda activate {} && vllm serve {} --tensor-parallel-size {} --port {}",
            shell_quote(self.conda_env),
            shell_quote(self.model),
            self.tensor_parallel_size,
            self.port
        )
    }

    /// Remote command that starts the script in detached session `session`
    pub fn in_session(&self, session: &str) -> String {
        let inner = format!("bash -lc {}", shell_quote(&self.script()));
        format!(
            "tmux new-session -d -s {} {}",
            shell_quote(session),
            shell_quote(&inner)
        )
    }
}

fn format_seconds(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs.fract() == 0.0 {
        format!("{}", d.as_secs())
    } else {
        format!("{:.3}", secs)
            .trim_end_matches('0')
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("gpu-1"), "gpu-1");
        assert_eq!(shell_quote("Qwen/Qwen2.5"), "Qwen/Qwen2.5");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn test_probe_command() {
        assert_eq!(
            probe_command(8000, Duration::from_millis(200)),
            "curl -s --max-time 0.2 http://127.0.0.1:8000/v1/models"
        );
        assert_eq!(
            probe_command(8001, Duration::from_secs(2)),
            "curl -s --max-time 2 http://127.0.0.1:8001/v1/models"
        );
    }

    #[test]
    fn test_tunnel_command() {
        assert_eq!(
            tunnel_command("ssh", "gpu-1", 8000, 16100),
            "ssh -N -L 16100:localhost:8000 gpu-1 -o ServerAliveInterval=30 -o ServerAliveCountMax=3"
        );
    }

    #[test]
    fn test_has_session_uses_exact_target() {
        assert_eq!(
            has_session_command("vllmctl_serve_8000"),
            "tmux has-session -t =vllmctl_serve_8000 2>/dev/null && echo 1 || echo 0"
        );
    }

    #[test]
    fn test_serve_command_nests_quotes() {
        let serve = ServeCommand {
            conda_env: "vllm_env",
            model: "Qwen/Qwen2.5-Coder-32B-Instruct",
            tensor_parallel_size: 8,
            port: 8000,
        };
        assert_eq!(
            serve.script(),
            "source ~/.bashrc && conda activate vllm_env && vllm serve Qwen/Qwen2.5-Coder-32B-Instruct --tensor-parallel-size 8 --port 8000"
        );
        let cmd = serve.in_session("vllmctl_serve_8000");
        assert!(cmd.starts_with("tmux new-session -d -s vllmctl_serve_8000 'bash -lc '\\''source"));
    }
}
