//! List command implementation

use anyhow::Result;

use pl_core::{AgentConnector, PeerStore};

use crate::lifecycle::PeerLifecycleManager;
use crate::output::{format_peers, print_json};

/// List the WireGuard peers of an organization
pub async fn list_command<S, C>(
    manager: &PeerLifecycleManager<S, C>,
    org: Option<&str>,
    json: bool,
) -> Result<()>
where
    S: PeerStore,
    C: AgentConnector,
{
    let org = manager.resolve_org(org).await?;
    let peers = manager.list(&org).await?;

    if json {
        return print_json(&peers);
    }

    println!("{}", format_peers(&peers));
    Ok(())
}
