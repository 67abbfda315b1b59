//! Collaborators backed by the real operating system

mod http;
mod ports;
mod processes;
mod ssh;
mod tmux;

pub use http::HttpProbe;
pub use ports::{parse_proc_net, parse_ss_listeners, SsPortScanner};
pub use processes::SysProcessTable;
pub use ssh::SshExec;
pub use tmux::Tmux;
