//! Status command implementation

use anyhow::Result;

use pl_core::{AgentConnector, PeerStore};

use crate::lifecycle::PeerLifecycleManager;
use crate::output::{format_peer_status, print_json};

/// Show a peer's status on its gateway
pub async fn status_command<S, C>(
    manager: &PeerLifecycleManager<S, C>,
    org: Option<&str>,
    name: Option<&str>,
    json: bool,
) -> Result<()>
where
    S: PeerStore,
    C: AgentConnector,
{
    let org = manager.resolve_org(org).await?;
    let outcome = manager.status(&org, name).await?;

    if json {
        return print_json(&outcome);
    }

    print!("{}", format_peer_status(&outcome.status));
    Ok(())
}
