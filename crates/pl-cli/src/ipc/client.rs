//! IPC client for communicating with the agent
//!
//! Uses TCP on localhost. The agent's address and authentication token come
//! from the lock file in the state directory; no lock file, a dead PID or a
//! refused connection all mean the agent is not running.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::Instant;

use pl_core::config::{self, AgentSettings};
use pl_core::ipc::{AgentRequest, AgentResponse, AgentStatus};
use pl_core::ipc_auth::read_live_lock;
use pl_core::{AgentConnection, AgentConnector, AgentError, AgentLink, OrgSlug, TunnelDescriptor};

/// Interval between pings while waiting for a new agent
const START_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Connection to a running agent
pub struct AgentClient {
    address: String,
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl AgentClient {
    /// Open a connection without authenticating (enough for `ping`)
    pub async fn connect(address: &str) -> Result<Self, AgentError> {
        tracing::debug!("Connecting to agent at {}", address);

        let stream = TcpStream::connect(address)
            .await
            .map_err(|e| AgentError::Unavailable(format!("{}: {}", address, e)))?;
        let (reader, writer) = stream.into_split();

        Ok(Self {
            address: address.to_string(),
            reader: BufReader::new(reader),
            writer,
        })
    }

    /// Authenticate with the token from the agent lock file
    pub async fn authenticate(&mut self, token: &str) -> Result<(), AgentError> {
        let request = AgentRequest::Authenticate {
            token: token.to_string(),
        };
        match self.send_request(request).await? {
            AgentResponse::Authenticated => {
                tracing::debug!("Authenticated with agent");
                Ok(())
            }
            other => Err(unexpected(other)),
        }
    }

    /// Send a request and read the single response line
    async fn send_request(&mut self, request: AgentRequest) -> Result<AgentResponse, AgentError> {
        let mut request_json = serde_json::to_string(&request)?;
        request_json.push('\n');
        self.writer.write_all(request_json.as_bytes()).await?;
        self.writer.flush().await?;

        let mut response_line = String::new();
        if self.reader.read_line(&mut response_line).await? == 0 {
            return Err(AgentError::Unavailable(format!(
                "agent at {} closed the connection",
                self.address
            )));
        }

        match serde_json::from_str::<AgentResponse>(&response_line)? {
            AgentResponse::Error { message } => Err(AgentError::Rejected(message)),
            response => Ok(response),
        }
    }
}

fn unexpected(response: AgentResponse) -> AgentError {
    AgentError::Protocol(format!("unexpected response: {:?}", response))
}

#[async_trait]
impl AgentConnection for AgentClient {
    async fn ping(&mut self) -> Result<bool, AgentError> {
        Ok(matches!(
            self.send_request(AgentRequest::Ping).await?,
            AgentResponse::Pong
        ))
    }

    async fn status(&mut self) -> Result<AgentStatus, AgentError> {
        match self.send_request(AgentRequest::GetStatus).await? {
            AgentResponse::Status(status) => Ok(status),
            other => Err(unexpected(other)),
        }
    }

    async fn establish(&mut self, org: &OrgSlug) -> Result<TunnelDescriptor, AgentError> {
        let request = AgentRequest::Establish { org: org.clone() };
        match self.send_request(request).await? {
            AgentResponse::Tunnel(tunnel) => Ok(tunnel),
            other => Err(unexpected(other)),
        }
    }

    async fn reestablish(&mut self, org: &OrgSlug) -> Result<TunnelDescriptor, AgentError> {
        let request = AgentRequest::Reestablish { org: org.clone() };
        match self.send_request(request).await? {
            AgentResponse::Tunnel(tunnel) => Ok(tunnel),
            other => Err(unexpected(other)),
        }
    }

    async fn tunnels(&mut self) -> Result<Vec<TunnelDescriptor>, AgentError> {
        match self.send_request(AgentRequest::ListTunnels).await? {
            AgentResponse::Tunnels { tunnels } => Ok(tunnels),
            other => Err(unexpected(other)),
        }
    }

    async fn forget(&mut self, org: &OrgSlug, peer_name: &str) -> Result<bool, AgentError> {
        let request = AgentRequest::Forget {
            org: org.clone(),
            peer_name: peer_name.to_string(),
        };
        match self.send_request(request).await? {
            AgentResponse::Forgotten { removed } => Ok(removed),
            other => Err(unexpected(other)),
        }
    }

    async fn kill(&mut self) -> Result<(), AgentError> {
        match self.send_request(AgentRequest::Shutdown).await {
            Ok(AgentResponse::Ok) => Ok(()),
            // The agent may exit before its answer reaches us
            Err(AgentError::Unavailable(reason)) => {
                tracing::debug!("Agent went away during shutdown: {}", reason);
                Ok(())
            }
            Ok(other) => Err(unexpected(other)),
            Err(e) => Err(e),
        }
    }
}

/// Finds the agent through its lock file and starts it on demand
#[derive(Debug, Clone)]
pub struct AgentLauncher {
    config_path: PathBuf,
    settings: AgentSettings,
}

impl AgentLauncher {
    pub fn new(config_path: PathBuf, settings: AgentSettings) -> Self {
        Self {
            config_path,
            settings,
        }
    }

    fn state_dir(&self) -> PathBuf {
        config::state_dir(&self.config_path)
    }

    /// PID of the live agent, if any
    pub fn running_pid(&self) -> Result<Option<u32>, AgentError> {
        Ok(read_live_lock(&self.state_dir())?.map(|lock| lock.pid))
    }

    /// Start `peerlink agent run --foreground` detached from this process
    pub fn spawn(&self) -> Result<u32, AgentError> {
        let exe = std::env::current_exe()?;
        let child = std::process::Command::new(exe)
            .args(["agent", "run", "--foreground", "--config"])
            .arg(&self.config_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        tracing::info!("Started agent (PID {})", child.id());
        Ok(child.id())
    }

    /// Wait until no live agent owns the lock file
    pub async fn wait_for_exit(&self) -> Result<(), AgentError> {
        let deadline = Instant::now() + self.settings.start_timeout;
        while self.running_pid()?.is_some() {
            if Instant::now() >= deadline {
                return Err(AgentError::Unavailable(format!(
                    "agent did not exit within {:?}",
                    self.settings.start_timeout
                )));
            }
            tokio::time::sleep(START_POLL_INTERVAL).await;
        }
        Ok(())
    }
}

#[async_trait]
impl AgentConnector for AgentLauncher {
    type Conn = AgentClient;

    async fn connect(&self) -> Result<AgentLink<AgentClient>, AgentError> {
        let Some(lock) = read_live_lock(&self.state_dir())? else {
            tracing::debug!("No live agent lock file");
            return Ok(AgentLink::NotRunning);
        };

        let mut client = match AgentClient::connect(&lock.address).await {
            Ok(client) => client,
            Err(AgentError::Unavailable(reason)) => {
                tracing::debug!("Agent not reachable: {}", reason);
                return Ok(AgentLink::NotRunning);
            }
            Err(e) => return Err(e),
        };
        client.authenticate(&lock.token).await?;
        Ok(AgentLink::Connected(client))
    }

    async fn establish_connection(&self) -> Result<AgentClient, AgentError> {
        if let AgentLink::Connected(client) = self.connect().await? {
            return Ok(client);
        }

        // A live lock without a listener is an agent still starting up
        if self.running_pid()?.is_none() {
            self.spawn()?;
        }

        let deadline = Instant::now() + self.settings.start_timeout;
        loop {
            tokio::time::sleep(START_POLL_INTERVAL).await;

            if let AgentLink::Connected(mut client) = self.connect().await? {
                if client.ping().await.unwrap_or(false) {
                    return Ok(client);
                }
            }

            if Instant::now() >= deadline {
                return Err(AgentError::Unavailable(format!(
                    "agent did not start within {:?}",
                    self.settings.start_timeout
                )));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_no_lock_file_means_not_running() {
        let dir = tempdir().unwrap();
        let launcher = AgentLauncher::new(dir.path().join("config.toml"), AgentSettings::default());

        assert!(!launcher.connect().await.unwrap().is_running());
        assert_eq!(launcher.running_pid().unwrap(), None);
    }

    #[tokio::test]
    async fn test_refused_connection_means_not_running() {
        let dir = tempdir().unwrap();
        // Live PID (ours) but nothing listening
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);
        pl_core::ipc_auth::acquire_lock(dir.path(), &address).unwrap();

        let launcher = AgentLauncher::new(dir.path().join("config.toml"), AgentSettings::default());
        assert!(!launcher.connect().await.unwrap().is_running());
    }

    #[tokio::test]
    async fn test_unreachable_address_is_unavailable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = AgentClient::connect(&address).await.err().unwrap();
        assert!(matches!(err, AgentError::Unavailable(_)));
    }
}
