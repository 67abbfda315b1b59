//! vc-forward: Forward-reconciliation engine
//!
//! Derives the live state of the world (loopback listeners, tunnel
//! processes, multiplexer sessions, remote services) once per pass and
//! converges it toward the desired set of forwards. Nothing is persisted
//! between passes; the OS is the only record of a forward.

pub mod backends;
pub mod health;
pub mod inventory;
pub mod launch;
pub mod listing;
pub mod probe;
pub mod reconcile;
pub mod remote;
pub mod system;
pub mod world;

#[cfg(test)]
pub(crate) mod fakes;

pub use backends::Backends;
pub use health::{list_forward_sessions, ForwardSession, Liveness};
pub use launch::{launch, LaunchError, LaunchReport, LaunchRequest};
pub use reconcile::{ForwardOutcome, ForwardReconciler, ForwardStatus, ReconcileRequest};
pub use world::{ServiceState, WorldState};
