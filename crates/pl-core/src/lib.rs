//! pl-core: Core abstractions and configuration for peerlink
//!
//! This crate provides the shared types, error taxonomy, settings, agent IPC
//! protocol and WireGuard key/document handling used by the agent daemon and
//! the CLI.

pub mod agent;
pub mod config;
pub mod error;
pub mod ipc;
pub mod ipc_auth;
pub mod keys;
pub mod process;
pub mod store;
pub mod time;
pub mod types;
pub mod wgconf;

pub use agent::{AgentConnection, AgentConnector, AgentLink};
pub use error::{AgentError, ConfigError, PeerError, RemoteError};
pub use keys::PrivateKey;
pub use store::PeerStore;
pub use types::{
    CreatedPeer, OrgSlug, Organization, Peer, PeerCreateResult, PeerStatus, TunnelDescriptor,
};
pub use wgconf::WireGuardState;
