//! vllmctl CLI
//!
//! Finds vLLM servers on the hosts of the SSH config and keeps local port
//! forwards to them, each tunnel running in its own tmux session.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vc_core::config::ConfigFile;
use vc_core::LocalRange;
use vc_forward::{Backends, LaunchRequest};
use vllmctl::commands;

#[derive(Parser)]
#[command(name = "vllmctl")]
#[command(author, version, about = "Discover vLLM servers over SSH and manage local forwards")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List models served on local ports
    ListLocal,

    /// List models served on SSH hosts
    ListRemote {
        /// Only hosts whose alias matches this regex
        #[arg(long)]
        host_regex: Option<String>,
        /// Remote port to probe
        #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
        remote_port: Option<u16>,
        /// Also show hosts without a model, and probe errors
        #[arg(long)]
        debug: bool,
    },

    /// Forward every running remote model to a local port
    AutoForward {
        /// Only hosts whose alias matches this regex
        #[arg(long)]
        host_regex: Option<String>,
        /// Remote ports, comma separated
        #[arg(long, value_delimiter = ',', value_parser = clap::value_parser!(u16).range(1..))]
        remote_port: Vec<u16>,
        /// Local port range, e.g. 16100-16199
        #[arg(long)]
        local_range: Option<LocalRange>,
        /// Keep forwards whose model went away
        #[arg(long)]
        no_kill: bool,
        /// Also report unreachable hosts and hosts without a model
        #[arg(long)]
        debug: bool,
    },

    /// Start vllm serve on a host and forward it
    Launch {
        /// Host alias to launch on
        #[arg(long)]
        server: String,
        /// Model to serve
        #[arg(long)]
        model: Option<String>,
        /// Tensor parallel size
        #[arg(long)]
        tensor_parallel_size: Option<u32>,
        /// Remote port to serve on
        #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
        remote_port: Option<u16>,
        /// Local port range, e.g. 16100-16199
        #[arg(long)]
        local_range: Option<LocalRange>,
        /// Conda environment with vllm installed
        #[arg(long)]
        conda_env: Option<String>,
        /// Seconds to wait for the server to answer
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Show every forward and whether it is alive
    Status,

    /// List tunnel sessions and what they forward
    TmuxForwards {
        /// Session name prefix
        #[arg(long)]
        tmux_prefix: Option<String>,
    },

    /// Kill tunnel sessions without a working forward
    CleanTmuxForwards {
        /// Session name prefix
        #[arg(long)]
        tmux_prefix: Option<String>,
    },

    /// Kill a tmux session by name
    KillTmux {
        /// Session name
        session: String,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Show config file path
    Path,
    /// Write a configuration file with defaults
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Config commands must work without a readable config file
    if let Commands::Config { action } = &cli.command {
        let path = cli.config.as_deref();
        return match action {
            ConfigAction::Show => commands::config_show(path),
            ConfigAction::Path => commands::config_path(path),
            ConfigAction::Init { force } => commands::config_init(path, *force),
        };
    }

    let config = ConfigFile::load_or_default(cli.config.as_deref())
        .context("Failed to load configuration")?;
    let forward = config.forward;
    let backends = Backends::system(&forward);

    match cli.command {
        Commands::ListLocal => {
            commands::list_local_command(&backends, &forward).await?;
        }

        Commands::ListRemote {
            host_regex,
            remote_port,
            debug,
        } => {
            let hosts = commands::resolve_hosts(&forward, host_regex.as_deref())?;
            let remote_port = remote_port.unwrap_or(forward.remote_port);
            commands::list_remote_command(&backends, &forward, &hosts, remote_port, debug).await?;
        }

        Commands::AutoForward {
            host_regex,
            remote_port,
            local_range,
            no_kill,
            debug,
        } => {
            let hosts = commands::resolve_hosts(&forward, host_regex.as_deref())?;
            let remote_ports = if remote_port.is_empty() {
                vec![forward.remote_port]
            } else {
                remote_port
            };
            let local_range = local_range.unwrap_or(forward.local_range);
            commands::auto_forward_command(
                backends,
                forward,
                hosts,
                &remote_ports,
                local_range,
                no_kill,
                debug,
            )
            .await?;
        }

        Commands::Launch {
            server,
            model,
            tensor_parallel_size,
            remote_port,
            local_range,
            conda_env,
            timeout,
        } => {
            let mut request = LaunchRequest::from_config(server, &forward, &config.launch);
            if let Some(model) = model {
                request.model = model;
            }
            if let Some(size) = tensor_parallel_size {
                request.tensor_parallel_size = size;
            }
            if let Some(port) = remote_port {
                request.remote_port = port;
            }
            if let Some(range) = local_range {
                request.local_range = range;
            }
            if let Some(env) = conda_env {
                request.conda_env = env;
            }
            if let Some(secs) = timeout {
                request.ready_timeout = Duration::from_secs(secs);
            }
            commands::launch_command(&backends, &forward, &request).await?;
        }

        Commands::Status => {
            commands::status_command(&backends, &forward).await?;
        }

        Commands::TmuxForwards { tmux_prefix } => {
            let prefix = tmux_prefix.unwrap_or_else(|| forward.session_prefix.clone());
            commands::tmux_forwards_command(&backends, &forward, &prefix).await?;
        }

        Commands::CleanTmuxForwards { tmux_prefix } => {
            let prefix = tmux_prefix.unwrap_or_else(|| forward.session_prefix.clone());
            commands::clean_tmux_forwards_command(&backends, &forward, &prefix).await?;
        }

        Commands::KillTmux { session } => {
            commands::kill_tmux_command(&backends, &session).await?;
        }

        Commands::Config { .. } => {}
    }

    Ok(())
}
