//! vllmctl: command-line interface
//!
//! Command implementations and terminal output for the `vllmctl` binary.

pub mod commands;
pub mod output;
