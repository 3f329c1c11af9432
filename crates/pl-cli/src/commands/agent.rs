//! Agent management commands
//!
//! Every request to the agent is bounded by `agent.request_timeout` (start
//! and stop waits by `agent.start_timeout` on top) and by the invocation's
//! cancellation token, so a wedged agent cannot hang the CLI.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use pl_core::config::{AgentSettings, Settings};
use pl_core::ipc::AgentStatus;
use pl_core::{AgentConnection, AgentConnector, AgentError, AgentLink, TunnelDescriptor};

use crate::deadline::bounded;
use crate::ipc::AgentLauncher;
use crate::output::{
    format_agent_status, format_tunnels, print_info, print_json, print_success, print_warning,
};

fn load(config_path: &Path) -> Result<(Settings, AgentLauncher)> {
    let settings = Settings::load_or_default(config_path)
        .with_context(|| format!("Failed to load settings from {:?}", config_path))?;
    let launcher = AgentLauncher::new(config_path.to_path_buf(), settings.agent.clone());
    Ok((settings, launcher))
}

/// One agent call under `cancel` and `limit`
async fn agent_call<T, F>(
    cancel: &CancellationToken,
    op: &'static str,
    limit: Duration,
    fut: F,
) -> Result<T>
where
    F: Future<Output = Result<T, AgentError>>,
{
    bounded(cancel, op, limit, fut)
        .await?
        .with_context(|| format!("Failed to {}", op))
}

/// Budget for waiting on the agent process to come up or go away
fn lifecycle_limit(settings: &AgentSettings) -> Duration {
    settings.start_timeout + settings.request_timeout
}

/// Run the agent, in this process when `foreground`
pub async fn agent_run_command(
    config_path: &Path,
    foreground: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    if !foreground {
        return agent_start_command(config_path, cancel).await;
    }

    let shutdown = CancellationToken::new();
    pl_agent::daemon::spawn_signal_handler(shutdown.clone());
    pl_agent::run_agent(config_path, shutdown).await
}

/// Start the agent in the background unless it is already running
pub async fn agent_start_command(config_path: &Path, cancel: &CancellationToken) -> Result<()> {
    let (settings, launcher) = load(config_path)?;
    let limit = settings.agent.request_timeout;

    if let AgentLink::Connected(mut client) =
        agent_call(cancel, "connect to agent", limit, launcher.connect()).await?
    {
        let status = agent_call(cancel, "get agent status", limit, client.status()).await?;
        print_info(&format!("Agent is already running (PID {})", status.pid));
        return Ok(());
    }

    let mut client = agent_call(
        cancel,
        "start the agent",
        lifecycle_limit(&settings.agent),
        launcher.establish_connection(),
    )
    .await?;
    let status = agent_call(cancel, "get agent status", limit, client.status()).await?;
    print_success(&format!("Agent started (PID {})", status.pid));
    Ok(())
}

/// Ask a running agent to exit
pub async fn agent_stop_command(config_path: &Path, cancel: &CancellationToken) -> Result<()> {
    let (settings, launcher) = load(config_path)?;
    let limit = settings.agent.request_timeout;

    match agent_call(cancel, "connect to agent", limit, launcher.connect()).await? {
        AgentLink::NotRunning => print_warning("Agent is not running"),
        AgentLink::Connected(mut client) => {
            agent_call(cancel, "stop the agent", limit, client.kill()).await?;
            agent_call(
                cancel,
                "wait for the agent to exit",
                lifecycle_limit(&settings.agent),
                launcher.wait_for_exit(),
            )
            .await?;
            print_success("Agent stopped");
        }
    }
    Ok(())
}

/// Stop the agent if it runs, then start a fresh one
pub async fn agent_restart_command(config_path: &Path, cancel: &CancellationToken) -> Result<()> {
    agent_stop_command(config_path, cancel).await?;
    agent_start_command(config_path, cancel).await
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AgentReport {
    running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<AgentStatus>,
    tunnels: Vec<TunnelDescriptor>,
    settings_version: u64,
}

/// Show whether the agent runs, what it caches and which settings it uses
pub async fn agent_status_command(
    config_path: &Path,
    json: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    let (settings, launcher) = load(config_path)?;
    let limit = settings.agent.request_timeout;

    let report = match agent_call(cancel, "connect to agent", limit, launcher.connect()).await? {
        AgentLink::NotRunning => AgentReport {
            running: false,
            status: None,
            tunnels: Vec::new(),
            settings_version: settings.version,
        },
        AgentLink::Connected(mut client) => {
            let status = agent_call(cancel, "get agent status", limit, client.status()).await?;
            let tunnels = agent_call(cancel, "list tunnels", limit, client.tunnels()).await?;
            AgentReport {
                running: true,
                status: Some(status),
                tunnels,
                settings_version: settings.version,
            }
        }
    };

    if json {
        return print_json(&report);
    }

    match &report.status {
        None => print_warning("Agent is not running"),
        Some(status) => {
            print!("{}", format_agent_status(status, report.settings_version));
            println!();
            println!("{}", format_tunnels(&report.tunnels));
            if status.settings_version < report.settings_version {
                print_info("Run `peerlink agent restart` to apply the current settings.");
            }
        }
    }
    Ok(())
}
