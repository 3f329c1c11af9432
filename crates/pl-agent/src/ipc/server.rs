//! IPC server implementation
//!
//! Listens on 127.0.0.1 only. Each connection must authenticate with the
//! lock-file token before anything but `Ping` is answered.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use pl_core::ipc::{AgentRequest, AgentResponse};
use pl_core::ipc_auth::validate_token;
use pl_core::PeerStore;

use crate::state::AgentState;

/// IPC server for the CLI
pub struct AgentServer<S> {
    state: Arc<AgentState<S>>,
    token: String,
    shutdown: CancellationToken,
}

impl<S: PeerStore + 'static> AgentServer<S> {
    /// Create a server that accepts clients presenting `token`
    pub fn new(state: Arc<AgentState<S>>, token: String, shutdown: CancellationToken) -> Self {
        Self {
            state,
            token,
            shutdown,
        }
    }

    /// Bind `address` and serve until shutdown
    pub async fn run(&self, address: &str) -> Result<()> {
        let listener = TcpListener::bind(address)
            .await
            .with_context(|| format!("Failed to bind IPC server to {}", address))?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until shutdown
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        tracing::info!("IPC server listening on {}", listener.local_addr()?);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("IPC server shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer_addr)) => {
                        if !peer_addr.ip().is_loopback() {
                            tracing::warn!("Rejected non-localhost connection from {}", peer_addr);
                            continue;
                        }

                        let state = Arc::clone(&self.state);
                        let token = self.token.clone();
                        let shutdown = self.shutdown.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_client(stream, state, token, shutdown).await {
                                tracing::warn!("IPC client error: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!("Failed to accept IPC connection: {}", e);
                    }
                },
            }
        }
    }
}

async fn handle_client<S: PeerStore>(
    stream: TcpStream,
    state: Arc<AgentState<S>>,
    token: String,
    shutdown: CancellationToken,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    let mut authenticated = false;

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            break;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<AgentRequest>(trimmed) {
            Ok(AgentRequest::Ping) => AgentResponse::Pong,
            Ok(AgentRequest::Authenticate { token: provided }) => {
                if validate_token(&provided, &token) {
                    authenticated = true;
                    tracing::debug!("IPC client authenticated");
                    AgentResponse::Authenticated
                } else {
                    tracing::warn!("IPC client presented an invalid token");
                    AgentResponse::Error {
                        message: "invalid authentication token".to_string(),
                    }
                }
            }
            Ok(_) if !authenticated => AgentResponse::Error {
                message: "not authenticated".to_string(),
            },
            Ok(request) => handle_request(request, &state, &shutdown).await,
            Err(e) => AgentResponse::Error {
                message: format!("Invalid request: {}", e),
            },
        };

        let mut response_json = serde_json::to_string(&response)?;
        response_json.push('\n');
        writer.write_all(response_json.as_bytes()).await?;
    }

    Ok(())
}

async fn handle_request<S: PeerStore>(
    request: AgentRequest,
    state: &AgentState<S>,
    shutdown: &CancellationToken,
) -> AgentResponse {
    match request {
        AgentRequest::GetStatus => AgentResponse::Status(state.status()),

        AgentRequest::Establish { org } => match state.establish(&org).await {
            Ok(tunnel) => AgentResponse::Tunnel(tunnel),
            Err(e) => AgentResponse::Error {
                message: e.to_string(),
            },
        },

        AgentRequest::Reestablish { org } => match state.reestablish(&org).await {
            Ok(tunnel) => AgentResponse::Tunnel(tunnel),
            Err(e) => AgentResponse::Error {
                message: e.to_string(),
            },
        },

        AgentRequest::ListTunnels => AgentResponse::Tunnels {
            tunnels: state.tunnels(),
        },

        AgentRequest::Forget { org, peer_name } => AgentResponse::Forgotten {
            removed: state.forget(&org, &peer_name).await,
        },

        AgentRequest::Shutdown => {
            tracing::info!("Shutdown requested via IPC");
            shutdown.cancel();
            AgentResponse::Ok
        }

        // Answered in handle_client
        AgentRequest::Ping => AgentResponse::Pong,
        AgentRequest::Authenticate { .. } => AgentResponse::Authenticated,
    }
}
