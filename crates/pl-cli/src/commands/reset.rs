//! Reset command implementation

use anyhow::Result;

use pl_core::{AgentConnector, PeerStore};

use crate::lifecycle::PeerLifecycleManager;
use crate::output::{print_json, print_success};

/// Replace the agent's peer for an organization with a new one
pub async fn reset_command<S, C>(
    manager: &PeerLifecycleManager<S, C>,
    org: Option<&str>,
    json: bool,
) -> Result<()>
where
    S: PeerStore,
    C: AgentConnector,
{
    let org = manager.resolve_org(org).await?;
    let tunnel = manager.reset(&org).await?;

    if json {
        return print_json(&tunnel);
    }

    print_success(&format!(
        "New WireGuard peer for organization '{}': '{}'",
        org, tunnel.peer_name
    ));
    Ok(())
}
