//! Client-side seam to the local agent
//!
//! The lifecycle manager only talks to the agent through these traits, so
//! it can be driven by a real IPC client or by a fake in tests.

use async_trait::async_trait;

use crate::error::AgentError;
use crate::ipc::AgentStatus;
use crate::types::{OrgSlug, TunnelDescriptor};

/// An open, authenticated session with the agent
#[async_trait]
pub trait AgentConnection: Send {
    /// Liveness check
    async fn ping(&mut self) -> Result<bool, AgentError>;

    /// Process status
    async fn status(&mut self) -> Result<AgentStatus, AgentError>;

    /// Cached tunnel for `org`, provisioning one on first use
    async fn establish(&mut self, org: &OrgSlug) -> Result<TunnelDescriptor, AgentError>;

    /// Replace the tunnel for `org` with a freshly provisioned peer
    async fn reestablish(&mut self, org: &OrgSlug) -> Result<TunnelDescriptor, AgentError>;

    /// All cached tunnels
    async fn tunnels(&mut self) -> Result<Vec<TunnelDescriptor>, AgentError>;

    /// Drop the cached tunnel for `org` if it belongs to `peer_name`
    ///
    /// Returns whether an entry was removed.
    async fn forget(&mut self, org: &OrgSlug, peer_name: &str) -> Result<bool, AgentError>;

    /// Ask the agent to exit
    async fn kill(&mut self) -> Result<(), AgentError>;
}

/// Outcome of looking for a running agent
#[derive(Debug)]
pub enum AgentLink<C> {
    Connected(C),
    NotRunning,
}

impl<C> AgentLink<C> {
    pub fn is_running(&self) -> bool {
        matches!(self, AgentLink::Connected(_))
    }
}

/// Finds or starts the agent
#[async_trait]
pub trait AgentConnector: Send + Sync {
    type Conn: AgentConnection;

    /// Connect to an agent that is already running; never starts one
    async fn connect(&self) -> Result<AgentLink<Self::Conn>, AgentError>;

    /// Connect, starting the agent first if it is not running
    async fn establish_connection(&self) -> Result<Self::Conn, AgentError>;
}
