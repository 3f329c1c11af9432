//! peerlink: WireGuard peer management CLI
//!
//! Provides the `peerlink` binary: peer lifecycle commands backed by the
//! platform API, and management of the local agent that caches tunnels.

pub mod commands;
pub mod deadline;
pub mod ipc;
pub mod lifecycle;
pub mod output;
pub mod select;

pub use lifecycle::{LifecycleOptions, PeerLifecycleManager};
