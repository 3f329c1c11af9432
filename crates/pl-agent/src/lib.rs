//! pl-agent: Local daemon caching WireGuard tunnels
//!
//! The agent runs on the user's machine, provisions one peer per
//! organization on first use and keeps it (private key included) so later
//! invocations reuse the same tunnel. The CLI talks to it over the IPC
//! protocol in `pl_core::ipc`.

pub mod daemon;
pub mod ipc;
pub mod naming;
pub mod state;

pub use daemon::run_agent;
pub use state::{AgentState, StateError};
