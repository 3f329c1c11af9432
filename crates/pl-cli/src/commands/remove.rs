//! Remove command implementation

use anyhow::Result;

use pl_core::{AgentConnector, PeerStore};

use crate::lifecycle::PeerLifecycleManager;
use crate::output::{print_info, print_json, print_success, print_warning};

/// Remove a peer and drop any agent tunnel that used it
pub async fn remove_command<S, C>(
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
    let outcome = manager.remove(&org, name).await?;

    if json {
        return print_json(&outcome);
    }

    print_success(&format!(
        "Removed WireGuard peer \"{}\" from organization {}",
        outcome.name, outcome.org
    ));
    match &outcome.pruned {
        Some(pruned) => {
            for name in &pruned.removed {
                print_info(&format!("Dropped the agent's tunnel for {}", name));
            }
        }
        None => print_warning(
            "Could not update the agent; run `peerlink agent restart` if tunnels misbehave",
        ),
    }
    Ok(())
}
