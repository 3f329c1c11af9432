//! Agent state: the per-organization tunnel cache
//!
//! One [`WireGuardState`] per organization, persisted to
//! `wireguard_state.json` in the state directory after every change so a
//! restarted agent keeps using the peers it already provisioned.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::Mutex;

use pl_core::config::Settings;
use pl_core::ipc::AgentStatus;
use pl_core::store::provision_peer;
use pl_core::time::current_time_secs;
use pl_core::{OrgSlug, PeerStore, RemoteError, TunnelDescriptor, WireGuardState};

use crate::naming::interactive_peer_name;

/// Cache file name inside the state directory
pub const STATE_FILENAME: &str = "wireguard_state.json";

/// Errors from agent state operations
#[derive(Error, Debug)]
pub enum StateError {
    /// The remote store refused or failed the provisioning
    #[error("failed to provision peer for organization '{org}': {source}")]
    Provision {
        org: String,
        #[source]
        source: RemoteError,
    },

    /// The cache file exists but could not be read
    #[error("failed to read tunnel state from {path:?}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// State shared by all IPC connections of one agent process
pub struct AgentState<S> {
    store: Arc<S>,
    tunnels: DashMap<OrgSlug, WireGuardState>,
    state_path: PathBuf,
    /// Transport flag as read at startup
    websockets: bool,
    settings_version: u64,
    started: Instant,
    /// Serializes provisioning so one org never gets two peers
    provision: Mutex<()>,
    /// Held from snapshot to rename so the file never regresses
    persist_lock: Mutex<()>,
}

impl<S: PeerStore> AgentState<S> {
    /// Load the persisted cache from `state_dir`
    ///
    /// A missing file is an empty cache. A file that does not parse is
    /// logged and ignored; those tunnels will be provisioned again.
    pub fn load(store: Arc<S>, state_dir: &Path, settings: &Settings) -> Result<Self, StateError> {
        let state_path = state_dir.join(STATE_FILENAME);
        let tunnels = DashMap::new();

        match std::fs::read_to_string(&state_path) {
            Ok(contents) => match serde_json::from_str::<Vec<WireGuardState>>(&contents) {
                Ok(entries) => {
                    for entry in entries {
                        tunnels.insert(entry.org.clone(), entry);
                    }
                    tracing::info!("Loaded {} cached tunnel(s)", tunnels.len());
                }
                Err(e) => {
                    tracing::warn!("Ignoring unreadable tunnel state {:?}: {}", state_path, e);
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(StateError::Load {
                    path: state_path,
                    source,
                })
            }
        }

        Ok(Self {
            store,
            tunnels,
            state_path,
            websockets: settings.wire_guard_websockets,
            settings_version: settings.version,
            started: Instant::now(),
            provision: Mutex::new(()),
            persist_lock: Mutex::new(()),
        })
    }

    /// Current process status
    pub fn status(&self) -> AgentStatus {
        AgentStatus {
            version: env!("CARGO_PKG_VERSION").to_string(),
            pid: std::process::id(),
            uptime_secs: self.started.elapsed().as_secs(),
            tunnel_count: self.tunnels.len(),
            websockets: self.websockets,
            settings_version: self.settings_version,
        }
    }

    /// All cached tunnels, ordered by organization
    pub fn tunnels(&self) -> Vec<TunnelDescriptor> {
        let mut tunnels: Vec<TunnelDescriptor> =
            self.tunnels.iter().map(|e| e.value().descriptor()).collect();
        tunnels.sort_by(|a, b| a.org.cmp(&b.org));
        tunnels
    }

    /// Cached tunnel for `org`, provisioning one on first use
    pub async fn establish(&self, org: &OrgSlug) -> Result<TunnelDescriptor, StateError> {
        if let Some(entry) = self.tunnels.get(org) {
            return Ok(entry.descriptor());
        }

        let _guard = self.provision.lock().await;
        // Another connection may have provisioned while we waited
        if let Some(entry) = self.tunnels.get(org) {
            return Ok(entry.descriptor());
        }

        let entry = self.provision(org).await?;
        let descriptor = entry.descriptor();
        self.tunnels.insert(org.clone(), entry);
        self.persist().await;

        tracing::info!(%org, peer = %descriptor.peer_name, "Established tunnel");
        Ok(descriptor)
    }

    /// Replace the tunnel for `org` with a newly provisioned peer
    ///
    /// The previous peer is left registered remotely.
    pub async fn reestablish(&self, org: &OrgSlug) -> Result<TunnelDescriptor, StateError> {
        let _guard = self.provision.lock().await;

        let entry = self.provision(org).await?;
        let descriptor = entry.descriptor();
        if let Some(old) = self.tunnels.insert(org.clone(), entry) {
            tracing::info!(%org, old = %old.name, "Discarded cached tunnel");
        }
        self.persist().await;

        tracing::info!(%org, peer = %descriptor.peer_name, "Reestablished tunnel");
        Ok(descriptor)
    }

    /// Drop the entry for `org` only if it still refers to `peer_name`
    pub async fn forget(&self, org: &OrgSlug, peer_name: &str) -> bool {
        let removed = self
            .tunnels
            .remove_if(org, |_, entry| entry.name == peer_name)
            .is_some();

        if removed {
            tracing::info!(%org, peer = %peer_name, "Forgot cached tunnel");
            self.persist().await;
        } else {
            tracing::debug!(%org, peer = %peer_name, "Nothing to forget");
        }
        removed
    }

    async fn provision(&self, org: &OrgSlug) -> Result<WireGuardState, StateError> {
        let name = interactive_peer_name();
        let created = provision_peer(self.store.as_ref(), org, None, Some(&name))
            .await
            .map_err(|source| StateError::Provision {
                org: org.to_string(),
                source,
            })?;
        Ok(WireGuardState::from_created(
            created,
            self.websockets,
            current_time_secs(),
        ))
    }

    /// Write the cache to disk; failures are logged, the in-memory entry stays
    async fn persist(&self) {
        let _guard = self.persist_lock.lock().await;

        let result = match self.snapshot() {
            Ok(json) => {
                let path = self.state_path.clone();
                tokio::task::spawn_blocking(move || write_state(&path, &json))
                    .await
                    .unwrap_or_else(|e| Err(io::Error::new(io::ErrorKind::Other, e)))
            }
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            tracing::error!("Failed to persist tunnel state to {:?}: {}", self.state_path, e);
        }
    }

    fn snapshot(&self) -> io::Result<Vec<u8>> {
        let mut entries: Vec<WireGuardState> =
            self.tunnels.iter().map(|e| e.value().clone()).collect();
        entries.sort_by(|a, b| a.org.cmp(&b.org));
        serde_json::to_vec_pretty(&entries).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

fn write_state(path: &Path, json: &[u8]) -> io::Result<()> {
    let dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&dir)?;

    // NamedTempFile is created 0600
    let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
    tmp.write_all(json)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
