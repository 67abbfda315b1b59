//! Core trait definitions
//!
//! The forwarding engine talks to the outside world only through these
//! traits, so every pass can be replayed against in-memory fakes.

mod ports;
mod process;
mod remote;
mod session;

pub use ports::{LocalProbe, PortScan, PortScanner, ScanStatus};
pub use process::{ProcessEntry, ProcessTable};
pub use remote::RemoteExec;
pub use session::SessionManager;
