//! Agent process lifecycle
//!
//! Lock, load, serve, unlock.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio_util::sync::CancellationToken;

use pl_core::config::{self, Settings};
use pl_core::ipc_auth::{acquire_lock, release_lock, LockOwnership};
use pl_core::store::HttpPeerStore;
use pl_core::PeerStore;

use crate::ipc::AgentServer;
use crate::state::AgentState;

/// Run the agent for the settings at `config_path` until `shutdown` fires
///
/// Settings are read once here; a running agent never notices later
/// changes to the file.
pub async fn run_agent(config_path: &Path, shutdown: CancellationToken) -> Result<()> {
    let settings = Settings::load_or_default(config_path)
        .with_context(|| format!("Failed to load settings from {:?}", config_path))?;
    let store = HttpPeerStore::new(&settings.api).context("Failed to create API client")?;
    let state_dir = config::state_dir(config_path);

    run_with_store(Arc::new(store), &state_dir, &settings, shutdown).await
}

/// Run the agent against any peer store
pub async fn run_with_store<S: PeerStore + 'static>(
    store: Arc<S>,
    state_dir: &Path,
    settings: &Settings,
    shutdown: CancellationToken,
) -> Result<()> {
    let address = settings.agent.ipc_address();

    let token = match acquire_lock(state_dir, &address).context("Failed to acquire agent lock")? {
        LockOwnership::Acquired { token } => token,
        LockOwnership::Held { pid, address } => {
            bail!("Agent already running (PID {}) on {}", pid, address)
        }
    };

    tracing::info!(
        websockets = settings.wire_guard_websockets,
        settings_version = settings.version,
        "peerlink agent starting"
    );

    let result = serve(store, state_dir, settings, &address, token, shutdown).await;

    if let Err(e) = release_lock(state_dir) {
        tracing::warn!("Failed to remove agent lock: {}", e);
    }
    tracing::info!("Agent shutdown complete");
    result
}

async fn serve<S: PeerStore + 'static>(
    store: Arc<S>,
    state_dir: &Path,
    settings: &Settings,
    address: &str,
    token: String,
    shutdown: CancellationToken,
) -> Result<()> {
    let state = AgentState::load(store, state_dir, settings)?;
    let server = AgentServer::new(Arc::new(state), token, shutdown);
    server.run(address).await
}

/// Cancel `shutdown` on Ctrl+C or SIGTERM
pub fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, initiating shutdown...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, initiating shutdown...");
            }
            _ = shutdown.cancelled() => return,
        }

        shutdown.cancel();
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use pl_core::ipc_auth::{read_lock, AgentLock};
    use pl_core::store::memory::MemoryPeerStore;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_refuses_when_lock_held() {
        // Our own PID counts as reclaimable, so use init as the live owner
        if !pl_core::process::is_process_alive(1) {
            return;
        }
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(pl_core::ipc_auth::LOCK_FILENAME),
            serde_json::to_string(&AgentLock {
                token: "t".into(),
                pid: 1,
                address: "127.0.0.1:1".into(),
            })
            .unwrap(),
        )
        .unwrap();

        let err = run_with_store(
            Arc::new(MemoryPeerStore::new()),
            dir.path(),
            &Settings::default(),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("already running"));
        assert_eq!(read_lock(dir.path()).unwrap().unwrap().pid, 1);
    }

    #[tokio::test]
    async fn test_lock_released_after_shutdown() {
        let dir = tempdir().unwrap();
        let mut settings = Settings::default();
        settings.agent.ipc_port = 0;
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        run_with_store(
            Arc::new(MemoryPeerStore::new()),
            dir.path(),
            &settings,
            shutdown,
        )
        .await
        .unwrap();

        assert!(read_lock(dir.path()).unwrap().is_none());
    }
}
