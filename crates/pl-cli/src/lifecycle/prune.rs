//! Reconcile the agent's cache with the remote peer list

use std::collections::HashSet;

use serde::Serialize;

use pl_core::{AgentConnection, AgentConnector, AgentLink, OrgSlug, PeerError, PeerStore};

use super::PeerLifecycleManager;

/// What a prune did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PruneOutcome {
    /// Whether an agent was reachable at all
    pub agent_running: bool,
    /// Peer names whose cached tunnels were dropped
    pub removed: Vec<String>,
}

impl<S, C> PeerLifecycleManager<S, C>
where
    S: PeerStore,
    C: AgentConnector,
{
    /// Drop cached tunnels for `org` whose peer no longer exists remotely
    ///
    /// Does nothing without a running agent. Each entry is forgotten only if
    /// it still names the stale peer, so a tunnel re-established meanwhile
    /// survives. Running it twice changes nothing the second time.
    pub async fn prune(&self, org: &OrgSlug) -> Result<PruneOutcome, PeerError> {
        match self.prune_inner(org).await {
            Err(PeerError::AgentUnavailable(reason)) => {
                tracing::info!(%org, "Agent unavailable, skipping prune: {}", reason);
                Ok(PruneOutcome::default())
            }
            other => other,
        }
    }

    async fn prune_inner(&self, org: &OrgSlug) -> Result<PruneOutcome, PeerError> {
        let mut conn = match self.connect_agent(org.as_str()).await? {
            AgentLink::Connected(conn) => conn,
            AgentLink::NotRunning => {
                tracing::debug!(%org, "Agent not running, nothing to prune");
                return Ok(PruneOutcome::default());
            }
        };

        let cached: Vec<String> = self
            .agent_call("list tunnels", org.as_str(), conn.tunnels())
            .await?
            .into_iter()
            .filter(|t| &t.org == org)
            .map(|t| t.peer_name)
            .collect();

        let mut outcome = PruneOutcome {
            agent_running: true,
            removed: Vec::new(),
        };
        if cached.is_empty() {
            return Ok(outcome);
        }

        let live: HashSet<String> = self
            .list(org)
            .await?
            .into_iter()
            .map(|p| p.name)
            .collect();

        for name in cached.into_iter().filter(|n| !live.contains(n)) {
            let removed = self
                .agent_call("forget tunnel", org.as_str(), conn.forget(org, &name))
                .await?;
            if removed {
                tracing::info!(%org, peer = %name, "Pruned stale agent tunnel");
                outcome.removed.push(name);
            }
        }

        Ok(outcome)
    }
}
