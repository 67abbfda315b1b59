//! Launch configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::duration_secs;

/// Defaults for starting an inference server on a remote host
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchConfig {
    /// Model passed to `vllm serve`
    pub model: String,

    /// `--tensor-parallel-size` passed to `vllm serve`
    pub tensor_parallel_size: u32,

    /// Conda environment activated before serving
    pub conda_env: String,

    /// How long to wait for the server to answer
    #[serde(with = "duration_secs")]
    pub ready_timeout: Duration,

    /// Delay between readiness polls
    #[serde(with = "duration_secs")]
    pub poll_interval: Duration,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            model: "Qwen/Qwen2.5-Coder-32B-Instruct".to_string(),
            tensor_parallel_size: 8,
            conda_env: "vllm_env".to_string(),
            ready_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(2),
        }
    }
}
