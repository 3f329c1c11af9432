//! Peer lifecycle orchestration
//!
//! [`PeerLifecycleManager`] is the only place that decides when to talk to
//! the remote [`PeerStore`] and when to the local agent. Commands call it
//! and render whatever it returns.
//!
//! Every remote or agent call runs under the invocation's cancellation
//! token and a timeout, so nothing here can hang forever.

mod prune;

pub use prune::PruneOutcome;

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use pl_core::config::Settings;
use pl_core::store::provision_peer;
use pl_core::wgconf::render_config;
use pl_core::{
    AgentConnection, AgentConnector, AgentError, AgentLink, OrgSlug, Peer, PeerError, PeerStatus,
    PeerStore, RemoteError, TunnelDescriptor,
};

use crate::deadline::bounded;
use crate::output::{OutputTarget, PreparedOutput};
use crate::select::PeerSelector;

/// Timeouts and settings the manager needs
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Settings file updated by the transport toggle
    pub config_path: PathBuf,
    /// Organization used when none is given
    pub default_org: Option<String>,
    /// Upper bound for a single remote call
    pub remote_timeout: Duration,
    /// Upper bound for a single agent request
    pub agent_timeout: Duration,
    /// Upper bound for starting the agent
    pub agent_start_timeout: Duration,
}

impl LifecycleOptions {
    pub fn from_settings(config_path: PathBuf, settings: &Settings) -> Self {
        Self {
            config_path,
            default_org: settings.default_org.clone(),
            remote_timeout: settings.api.timeout,
            agent_timeout: settings.agent.request_timeout,
            agent_start_timeout: settings.agent.start_timeout,
        }
    }
}

/// A peer created by [`PeerLifecycleManager::create`]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOutcome {
    pub org: OrgSlug,
    pub peer: Peer,
    pub written_to: OutputTarget,
}

/// Result of removing a peer
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveOutcome {
    pub org: OrgSlug,
    pub name: String,
    /// `None` when the follow-up prune failed
    pub pruned: Option<PruneOutcome>,
}

/// A peer's gateway status
#[derive(Debug, Clone, Serialize)]
pub struct StatusOutcome {
    pub org: OrgSlug,
    pub name: String,
    pub status: PeerStatus,
}

/// What happened to the agent after a transport change
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "agent", content = "reason", rename_all = "snake_case")]
pub enum TransportOutcome {
    /// No agent was running; the next one reads the new setting
    AgentNotRunning,
    /// The running agent was stopped
    AgentStopped,
    /// The agent could not be stopped and still uses the old transport
    RestartRequired(String),
}

/// Result of toggling the websocket transport
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportChange {
    pub websockets: bool,
    pub settings_version: u64,
    pub outcome: TransportOutcome,
}

/// Coordinates the remote peer store and the local agent
pub struct PeerLifecycleManager<S, C> {
    store: S,
    agent: C,
    selector: Box<dyn PeerSelector>,
    cancel: CancellationToken,
    options: LifecycleOptions,
}

impl<S, C> PeerLifecycleManager<S, C>
where
    S: PeerStore,
    C: AgentConnector,
{
    pub fn new(
        store: S,
        agent: C,
        selector: Box<dyn PeerSelector>,
        cancel: CancellationToken,
        options: LifecycleOptions,
    ) -> Self {
        Self {
            store,
            agent,
            selector,
            cancel,
            options,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn agent(&self) -> &C {
        &self.agent
    }

    /// Run `fut` under the cancellation token and `limit`
    async fn bounded<T, F>(&self, op: &'static str, limit: Duration, fut: F) -> Result<T, PeerError>
    where
        F: Future<Output = T>,
    {
        bounded(&self.cancel, op, limit, fut).await
    }

    async fn remote<T, F>(&self, op: &'static str, org: &str, fut: F) -> Result<T, PeerError>
    where
        F: Future<Output = Result<T, RemoteError>>,
    {
        self.bounded(op, self.options.remote_timeout, fut)
            .await?
            .map_err(|source| PeerError::Remote {
                op,
                org: org.to_string(),
                source,
            })
    }

    async fn agent_call<T, F>(&self, op: &'static str, org: &str, fut: F) -> Result<T, PeerError>
    where
        F: Future<Output = Result<T, AgentError>>,
    {
        self.bounded(op, self.options.agent_timeout, fut)
            .await?
            .map_err(|e| agent_error(op, org, e))
    }

    /// Connect to a running agent without starting one
    async fn connect_agent(&self, org: &str) -> Result<AgentLink<C::Conn>, PeerError> {
        self.agent_call("connect to agent", org, self.agent.connect())
            .await
    }

    /// Organization to operate on
    ///
    /// An explicit value wins, then the configured default, then a pick from
    /// the organizations visible to the user.
    pub async fn resolve_org(&self, explicit: Option<&str>) -> Result<OrgSlug, PeerError> {
        let configured = explicit
            .or(self.options.default_org.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty());
        if let Some(slug) = configured {
            return Ok(OrgSlug::from(slug));
        }

        let orgs = self
            .remote("list organizations", "*", self.store.organizations())
            .await?;
        if orgs.is_empty() {
            return Err(PeerError::SelectionAborted(
                "No organizations available".to_string(),
            ));
        }

        let options: Vec<String> = orgs
            .iter()
            .map(|o| format!("{} ({})", o.slug, o.name))
            .collect();
        match self.selector.select("Select organization", &options)? {
            Some(i) if i < orgs.len() => Ok(orgs[i].slug.clone()),
            _ => Err(PeerError::SelectionAborted(
                "No organization selected".to_string(),
            )),
        }
    }

    /// Peers registered in `org`
    pub async fn list(&self, org: &OrgSlug) -> Result<Vec<Peer>, PeerError> {
        self.remote("list peers", org.as_str(), self.store.list_peers(org))
            .await
    }

    /// Provision a peer and write its configuration to `output`
    ///
    /// `output` must already be prepared; the private key is generated only
    /// after that and is written exactly once.
    pub async fn create(
        &self,
        org: &OrgSlug,
        region: Option<&str>,
        name: Option<&str>,
        output: PreparedOutput,
    ) -> Result<CreateOutcome, PeerError> {
        let created = self
            .remote(
                "create peer",
                org.as_str(),
                provision_peer(&self.store, org, region, name),
            )
            .await?;

        let peer_name = created.peer.name.clone();
        let document = render_config(&created.peer, &created.private_key).map_err(|e| {
            tracing::warn!(%org, peer = %peer_name, "Peer created but its configuration is unusable");
            e
        })?;

        let written_to = output.commit(&document).map_err(|e| {
            tracing::warn!(
                %org,
                peer = %peer_name,
                "Peer created but its configuration could not be written; remove it and create a new one"
            );
            PeerError::Output(e)
        })?;

        Ok(CreateOutcome {
            org: org.clone(),
            peer: created.peer.to_peer(&created.local_public_key),
            written_to,
        })
    }

    /// Remove a peer, then prune the agent's cache for `org`
    pub async fn remove(&self, org: &OrgSlug, name: Option<&str>) -> Result<RemoveOutcome, PeerError> {
        let name = self
            .resolve_peer(org, name, "Select WireGuard peer to remove")
            .await?;

        tracing::info!(%org, peer = %name, "Removing WireGuard peer");
        self.remote(
            "remove peer",
            org.as_str(),
            self.store.remove_peer(org, &name),
        )
        .await?;

        let pruned = match self.prune(org).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                tracing::warn!(%org, "Peer removed but pruning the agent cache failed: {}", e);
                None
            }
        };

        Ok(RemoveOutcome {
            org: org.clone(),
            name,
            pruned,
        })
    }

    /// Gateway status of a peer
    pub async fn status(&self, org: &OrgSlug, name: Option<&str>) -> Result<StatusOutcome, PeerError> {
        let name = self
            .resolve_peer(org, name, "Select WireGuard peer")
            .await?;
        let status = self
            .remote(
                "get peer status",
                org.as_str(),
                self.store.peer_status(org, &name),
            )
            .await?;

        Ok(StatusOutcome {
            org: org.clone(),
            name,
            status,
        })
    }

    /// Have the agent replace its tunnel for `org` with a new peer
    ///
    /// Starts the agent if needed. The previous peer stays registered.
    pub async fn reset(&self, org: &OrgSlug) -> Result<TunnelDescriptor, PeerError> {
        let limit = self.options.agent_start_timeout + self.options.agent_timeout;
        let mut conn = self
            .bounded("start agent", limit, self.agent.establish_connection())
            .await?
            .map_err(|e| agent_error("start agent", org.as_str(), e))?;

        self.agent_call("reestablish tunnel", org.as_str(), conn.reestablish(org))
            .await
    }

    /// Persist the websocket flag, then stop the agent so it picks it up
    pub async fn toggle_transport(&self, enable: bool) -> Result<TransportChange, PeerError> {
        let settings = Settings::update(&self.options.config_path, |s| {
            s.wire_guard_websockets = enable;
        })?;
        tracing::info!(
            websockets = enable,
            version = settings.version,
            "Updated WireGuard transport"
        );

        let outcome = match self.connect_agent("*").await {
            Ok(AgentLink::NotRunning) => TransportOutcome::AgentNotRunning,
            Ok(AgentLink::Connected(mut conn)) => {
                match self.agent_call("stop agent", "*", conn.kill()).await {
                    Ok(()) => TransportOutcome::AgentStopped,
                    Err(e) => {
                        tracing::debug!("Error stopping the agent: {}", e);
                        TransportOutcome::RestartRequired(e.to_string())
                    }
                }
            }
            Err(e) => {
                tracing::debug!("Error reaching the agent: {}", e);
                TransportOutcome::RestartRequired(e.to_string())
            }
        };

        Ok(TransportChange {
            websockets: settings.wire_guard_websockets,
            settings_version: settings.version,
            outcome,
        })
    }

    /// Use `name` if given, else let the selector pick from the org's peers
    async fn resolve_peer(
        &self,
        org: &OrgSlug,
        name: Option<&str>,
        prompt: &str,
    ) -> Result<String, PeerError> {
        if let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) {
            return Ok(name.to_string());
        }

        let peers = self.list(org).await?;
        if peers.is_empty() {
            return Err(PeerError::SelectionAborted(format!(
                "No WireGuard peers in organization '{}'",
                org
            )));
        }

        let names: Vec<String> = peers.into_iter().map(|p| p.name).collect();
        match self.selector.select(prompt, &names)? {
            Some(i) if i < names.len() => Ok(names[i].clone()),
            _ => Err(PeerError::SelectionAborted("No peer selected".to_string())),
        }
    }
}

fn agent_error(op: &'static str, org: &str, e: AgentError) -> PeerError {
    match e {
        AgentError::Unavailable(reason) => PeerError::AgentUnavailable(reason),
        AgentError::Rejected(message) | AgentError::Protocol(message) => PeerError::Agent {
            op,
            org: org.to_string(),
            message,
        },
    }
}
