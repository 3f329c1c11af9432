//! IPC server for CLI communication
//!
//! Serves the newline-delimited JSON protocol from `pl_core::ipc` on
//! localhost TCP.

mod server;

pub use server::AgentServer;
