//! Live-state inventories: tunnel processes and multiplexer sessions

pub mod sessions;
pub mod tunnels;

pub use sessions::{list_sessions, resolve_tunnel, resolve_tunnel_in};
pub use tunnels::{collect_tunnels, discover, is_tunnel_client, tunnels_of};
