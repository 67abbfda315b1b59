//! vc-core: Core abstractions and configuration for vllmctl
//!
//! This crate provides the domain types, error taxonomy, configuration
//! structures and collaborator traits shared by the forwarding engine and
//! the CLI.

pub mod argv;
pub mod config;
pub mod error;
pub mod ssh_config;
pub mod traits;
pub mod types;

pub use error::{CommandError, ConfigError, InventoryError, TransportError};
pub use types::{Endpoint, Forward, LocalRange, ModelIdentity, ObservedTunnel};
