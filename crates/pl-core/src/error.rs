//! Core error types for peerlink

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by peer lifecycle operations
///
/// Every variant that concerns a peer or an organization carries it, so the
/// message shown to the user always says what was involved. Key material is
/// never part of an error.
#[derive(Error, Debug)]
pub enum PeerError {
    /// The remote peer store rejected or failed the call
    #[error("{op} failed for organization '{org}': {source}")]
    Remote {
        op: &'static str,
        org: String,
        #[source]
        source: RemoteError,
    },

    /// The local agent could not be reached
    #[error("agent unavailable: {0}")]
    AgentUnavailable(String),

    /// The agent was reachable but the operation failed
    #[error("agent failed to {op} for organization '{org}': {message}")]
    Agent {
        op: &'static str,
        org: String,
        message: String,
    },

    /// Interactive resolution found nothing to pick, or the user declined
    #[error("{0}")]
    SelectionAborted(String),

    /// The invocation was cancelled while the call was in flight
    #[error("{op} cancelled")]
    Cancelled { op: &'static str },

    /// The call did not finish within its time budget
    #[error("{op} timed out after {after:?}")]
    TimedOut { op: &'static str, after: Duration },

    /// A WireGuard configuration document could not be rendered
    #[error("invalid WireGuard configuration: {0}")]
    InvalidConfig(String),

    /// Writing the configuration artifact failed
    #[error("failed to write WireGuard configuration: {0}")]
    Output(#[source] std::io::Error),

    /// Settings could not be read or written
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl PeerError {
    /// Whether this error is a clean early return rather than a failure
    pub fn is_aborted(&self) -> bool {
        matches!(self, PeerError::SelectionAborted(_))
    }
}

/// Errors from the remote peer store
#[derive(Error, Debug)]
pub enum RemoteError {
    /// Network or TLS level failure
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The addressed organization or peer does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// The server answered with a non-success status
    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The response body did not match the expected shape
    #[error("unexpected response: {0}")]
    Decode(String),
}

/// Errors at the agent client seam
#[derive(Error, Debug)]
pub enum AgentError {
    /// Connection dropped, refused mid-call, or the agent crashed
    #[error("agent unavailable: {0}")]
    Unavailable(String),

    /// The agent processed the request and answered with an error
    #[error("{0}")]
    Rejected(String),

    /// The agent answered with something the client did not expect
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<std::io::Error> for AgentError {
    fn from(e: std::io::Error) -> Self {
        AgentError::Unavailable(e.to_string())
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(e: serde_json::Error) -> Self {
        AgentError::Protocol(e.to_string())
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Reading or writing the file failed
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
