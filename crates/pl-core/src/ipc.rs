//! IPC protocol between the CLI and the local agent
//!
//! Newline-delimited JSON over TCP on 127.0.0.1. One request line is always
//! answered by exactly one response line. Apart from `Ping`, a connection
//! must authenticate with the token from the agent lock file first.

use serde::{Deserialize, Serialize};

use crate::types::{OrgSlug, TunnelDescriptor};

/// Default agent IPC port
pub const DEFAULT_IPC_PORT: u16 = 22240;

/// Request from the CLI to the agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentRequest {
    /// Present the lock-file token
    Authenticate { token: String },

    /// Liveness check, allowed before authentication
    Ping,

    /// Agent status
    GetStatus,

    /// Bring up (or return the cached) tunnel for an organization
    Establish { org: OrgSlug },

    /// Drop the cached tunnel and provision a new peer
    Reestablish { org: OrgSlug },

    /// List cached tunnels
    ListTunnels,

    /// Drop the cached tunnel for `org` if it still refers to `peer_name`
    Forget { org: OrgSlug, peer_name: String },

    /// Stop the agent
    Shutdown,
}

/// Response from the agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentResponse {
    /// Authentication accepted
    Authenticated,

    /// Pong response
    Pong,

    /// Agent status
    Status(AgentStatus),

    /// A single tunnel
    Tunnel(TunnelDescriptor),

    /// All cached tunnels
    Tunnels { tunnels: Vec<TunnelDescriptor> },

    /// Result of a forget request
    Forgotten { removed: bool },

    /// Generic success
    Ok,

    /// Error response
    Error { message: String },
}

/// Agent status information
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatus {
    /// Agent version
    pub version: String,
    /// Agent process id
    pub pid: u32,
    /// Uptime in seconds
    pub uptime_secs: u64,
    /// Number of cached tunnels
    pub tunnel_count: usize,
    /// Transport flag read at agent startup
    pub websockets: bool,
    /// Settings version read at agent startup
    pub settings_version: u64,
}
