//! Websockets command implementation

use anyhow::Result;

use pl_core::{AgentConnector, PeerStore};

use crate::lifecycle::{PeerLifecycleManager, TransportOutcome};
use crate::output::{print_info, print_json, print_success};

/// Enable or disable carrying WireGuard over websockets
pub async fn websockets_command<S, C>(
    manager: &PeerLifecycleManager<S, C>,
    enable: bool,
    json: bool,
) -> Result<()>
where
    S: PeerStore,
    C: AgentConnector,
{
    let change = manager.toggle_transport(enable).await?;

    if json {
        return print_json(&change);
    }

    print_success(&format!(
        "WireGuard websockets {}",
        if change.websockets { "enabled" } else { "disabled" }
    ));
    match change.outcome {
        TransportOutcome::AgentNotRunning => {}
        TransportOutcome::AgentStopped => {
            print_info("Stopped the agent; it restarts with the new setting when needed");
        }
        TransportOutcome::RestartRequired(_) => {
            println!("Run `peerlink agent restart` to make changes take effect.");
        }
    }
    Ok(())
}
