//! IPC integration tests
//!
//! Runs the agent server on an ephemeral port against an in-memory store
//! and talks to it over real TCP.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use pl_agent::ipc::AgentServer;
use pl_agent::AgentState;
use pl_core::config::Settings;
use pl_core::ipc::{AgentRequest, AgentResponse};
use pl_core::store::memory::MemoryPeerStore;
use pl_core::OrgSlug;

const TOKEN: &str = "test-token";

struct TestAgent {
    address: String,
    shutdown: CancellationToken,
    store: Arc<MemoryPeerStore>,
    _dir: tempfile::TempDir,
    handle: tokio::task::JoinHandle<()>,
}

async fn start_agent(store: MemoryPeerStore) -> TestAgent {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(store);
    let state = AgentState::load(Arc::clone(&store), dir.path(), &Settings::default()).unwrap();
    let shutdown = CancellationToken::new();
    let server = AgentServer::new(Arc::new(state), TOKEN.to_string(), shutdown.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let handle = tokio::spawn(async move {
        let _ = server.serve(listener).await;
    });

    TestAgent {
        address,
        shutdown,
        store,
        _dir: dir,
        handle,
    }
}

/// IPC test client wrapper
struct TestClient {
    reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
    writer: BufWriter<tokio::net::tcp::OwnedWriteHalf>,
}

impl TestClient {
    async fn connect(address: &str) -> Self {
        let stream = TcpStream::connect(address)
            .await
            .expect("Failed to connect to IPC server");
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::new(reader),
            writer: BufWriter::new(writer),
        }
    }

    async fn authenticated(address: &str) -> Self {
        let mut client = Self::connect(address).await;
        let response = client
            .send(AgentRequest::Authenticate {
                token: TOKEN.to_string(),
            })
            .await;
        assert!(matches!(response, AgentResponse::Authenticated));
        client
    }

    async fn send(&mut self, request: AgentRequest) -> AgentResponse {
        let mut json = serde_json::to_string(&request).expect("Failed to serialize request");
        json.push('\n');
        self.writer.write_all(json.as_bytes()).await.unwrap();
        self.writer.flush().await.unwrap();

        let mut line = String::new();
        timeout(Duration::from_secs(5), self.reader.read_line(&mut line))
            .await
            .expect("Timed out waiting for response")
            .unwrap();
        assert!(!line.is_empty(), "Server closed the connection");
        serde_json::from_str(&line).expect("Failed to parse response")
    }
}

#[tokio::test]
async fn test_ping_without_auth() {
    let agent = start_agent(MemoryPeerStore::new()).await;
    let mut client = TestClient::connect(&agent.address).await;

    assert!(matches!(client.send(AgentRequest::Ping).await, AgentResponse::Pong));
    agent.handle.abort();
}

#[tokio::test]
async fn test_requests_require_auth() {
    let agent = start_agent(MemoryPeerStore::new().with_org("acme")).await;
    let mut client = TestClient::connect(&agent.address).await;

    let response = client.send(AgentRequest::ListTunnels).await;
    assert!(matches!(response, AgentResponse::Error { message } if message.contains("not authenticated")));

    let response = client
        .send(AgentRequest::Authenticate {
            token: "wrong".to_string(),
        })
        .await;
    assert!(matches!(response, AgentResponse::Error { .. }));

    let response = client
        .send(AgentRequest::Establish {
            org: OrgSlug::from("acme"),
        })
        .await;
    assert!(matches!(response, AgentResponse::Error { .. }));
    assert_eq!(agent.store.create_calls(), 0);
    agent.handle.abort();
}

#[tokio::test]
async fn test_establish_then_forget() {
    let agent = start_agent(MemoryPeerStore::new().with_org("acme")).await;
    let mut client = TestClient::authenticated(&agent.address).await;
    let org = OrgSlug::from("acme");

    let tunnel = match client.send(AgentRequest::Establish { org: org.clone() }).await {
        AgentResponse::Tunnel(tunnel) => tunnel,
        other => panic!("Unexpected response: {:?}", other),
    };
    assert_eq!(tunnel.org, org);
    assert!(tunnel.endpoint.ends_with(":51820"));

    match client.send(AgentRequest::ListTunnels).await {
        AgentResponse::Tunnels { tunnels } => assert_eq!(tunnels, vec![tunnel.clone()]),
        other => panic!("Unexpected response: {:?}", other),
    }

    let response = client
        .send(AgentRequest::Forget {
            org: org.clone(),
            peer_name: tunnel.peer_name.clone(),
        })
        .await;
    assert!(matches!(response, AgentResponse::Forgotten { removed: true }));

    match client.send(AgentRequest::GetStatus).await {
        AgentResponse::Status(status) => assert_eq!(status.tunnel_count, 0),
        other => panic!("Unexpected response: {:?}", other),
    }
    agent.handle.abort();
}

#[tokio::test]
async fn test_responses_never_carry_private_key() {
    let agent = start_agent(MemoryPeerStore::new().with_org("acme")).await;
    let mut client = TestClient::authenticated(&agent.address).await;

    let response = client
        .send(AgentRequest::Establish {
            org: OrgSlug::from("acme"),
        })
        .await;
    let json = serde_json::to_string(&response).unwrap();
    assert!(!json.to_lowercase().contains("private"));
    agent.handle.abort();
}

#[tokio::test]
async fn test_establish_unknown_org_reports_error() {
    let agent = start_agent(MemoryPeerStore::new()).await;
    let mut client = TestClient::authenticated(&agent.address).await;

    let response = client
        .send(AgentRequest::Establish {
            org: OrgSlug::from("ghost"),
        })
        .await;
    assert!(matches!(response, AgentResponse::Error { message } if message.contains("ghost")));
    agent.handle.abort();
}

#[tokio::test]
async fn test_invalid_json_keeps_connection() {
    let agent = start_agent(MemoryPeerStore::new()).await;
    let mut client = TestClient::connect(&agent.address).await;

    client.writer.write_all(b"{ nope\n").await.unwrap();
    client.writer.flush().await.unwrap();
    let mut line = String::new();
    client.reader.read_line(&mut line).await.unwrap();
    assert!(line.contains("Invalid request"));

    assert!(matches!(client.send(AgentRequest::Ping).await, AgentResponse::Pong));
    agent.handle.abort();
}

#[tokio::test]
async fn test_shutdown_stops_server() {
    let agent = start_agent(MemoryPeerStore::new()).await;
    let mut client = TestClient::authenticated(&agent.address).await;

    assert!(matches!(client.send(AgentRequest::Shutdown).await, AgentResponse::Ok));
    assert!(agent.shutdown.is_cancelled());
    timeout(Duration::from_secs(5), agent.handle)
        .await
        .expect("Server did not stop")
        .unwrap();
}
