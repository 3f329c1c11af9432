//! IPC client for communicating with the local agent

mod client;

pub use client::{AgentClient, AgentLauncher};
pub use pl_core::ipc::{AgentStatus, DEFAULT_IPC_PORT};
