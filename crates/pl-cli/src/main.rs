//! peerlink CLI
//!
//! Single binary for WireGuard peer management:
//! - Peer lifecycle (list, create, remove, status, reset)
//! - Transport setting (websockets)
//! - The local agent that caches tunnels (run, start, stop, restart, status)

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use peerlink::commands;
use peerlink::ipc::AgentLauncher;
use peerlink::output::print_info;
use peerlink::select::StdinSelector;
use peerlink::{LifecycleOptions, PeerLifecycleManager};
use pl_core::config::{self, Settings};
use pl_core::store::HttpPeerStore;
use pl_core::PeerError;

#[derive(Parser)]
#[command(name = "peerlink")]
#[command(author, version, about = "WireGuard peer management for your organizations")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Organization to operate on (defaults to default_org)
    #[arg(short, long, global = true)]
    org: Option<String>,

    /// Print JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage WireGuard peers
    /// Alias: wg
    #[command(alias = "wg")]
    Wireguard {
        #[command(subcommand)]
        action: WireguardAction,
    },

    /// Manage the local agent
    Agent {
        #[command(subcommand)]
        action: AgentAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum WireguardAction {
    /// List WireGuard peers
    List,

    /// Create a WireGuard peer and write its configuration
    Create {
        /// Gateway region (server default when omitted)
        region: Option<String>,
        /// Peer name (server default when omitted)
        name: Option<String>,
        /// File to write the configuration to, or 'stdout'
        file: Option<String>,
    },

    /// Remove a WireGuard peer
    Remove {
        /// Peer name (prompts when omitted)
        name: Option<String>,
    },

    /// Show a WireGuard peer's gateway status
    Status {
        /// Peer name (prompts when omitted)
        name: Option<String>,
    },

    /// Replace the agent's peer for the organization with a new one
    Reset,

    /// Carry WireGuard over websockets
    Websockets {
        #[command(subcommand)]
        mode: WebsocketsMode,
    },
}

#[derive(Subcommand)]
enum WebsocketsMode {
    /// Use websockets
    Enable,
    /// Use plain UDP
    Disable,
}

#[derive(Subcommand)]
enum AgentAction {
    /// Run the agent
    Run {
        /// Run in this process instead of in the background
        #[arg(short, long)]
        foreground: bool,
    },
    /// Start the agent in the background
    Start,
    /// Stop the agent
    Stop,
    /// Restart the agent
    Restart,
    /// Show agent status and cached tunnels
    Status,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let foreground_agent = matches!(
        cli.command,
        Commands::Agent {
            action: AgentAction::Run { foreground: true }
        }
    );

    // Setup logging based on verbosity
    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) if foreground_agent => "debug",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match run(cli).await {
        Err(e) => match e.downcast_ref::<PeerError>() {
            Some(peer_error) if peer_error.is_aborted() => {
                print_info(&peer_error.to_string());
                Ok(())
            }
            _ => Err(e),
        },
        ok => ok,
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);
    let org = cli.org.as_deref();
    let json = cli.json;

    // The foreground agent installs its own signal handling
    let cancel = CancellationToken::new();
    if !matches!(
        cli.command,
        Commands::Agent {
            action: AgentAction::Run { foreground: true }
        }
    ) {
        let cancel_on_ctrl_c = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received Ctrl+C, cancelling...");
                cancel_on_ctrl_c.cancel();
            }
        });
    }

    match cli.command {
        Commands::Wireguard { action } => {
            let settings = Settings::load_or_default(&config_path)
                .with_context(|| format!("Failed to load settings from {:?}", config_path))?;
            let store = HttpPeerStore::new(&settings.api).context("Failed to create API client")?;
            let launcher = AgentLauncher::new(config_path.clone(), settings.agent.clone());

            let manager = PeerLifecycleManager::new(
                store,
                launcher,
                Box::new(StdinSelector),
                cancel,
                LifecycleOptions::from_settings(config_path, &settings),
            );

            match action {
                WireguardAction::List => commands::list_command(&manager, org, json).await?,
                WireguardAction::Create { region, name, file } => {
                    commands::create_command(
                        &manager,
                        org,
                        region.as_deref(),
                        name.as_deref(),
                        file.as_deref(),
                    )
                    .await?
                }
                WireguardAction::Remove { name } => {
                    commands::remove_command(&manager, org, name.as_deref(), json).await?
                }
                WireguardAction::Status { name } => {
                    commands::status_command(&manager, org, name.as_deref(), json).await?
                }
                WireguardAction::Reset => commands::reset_command(&manager, org, json).await?,
                WireguardAction::Websockets { mode } => {
                    let enable = matches!(mode, WebsocketsMode::Enable);
                    commands::websockets_command(&manager, enable, json).await?
                }
            }
        }

        Commands::Agent { action } => match action {
            AgentAction::Run { foreground } => {
                commands::agent_run_command(&config_path, foreground, &cancel).await?
            }
            AgentAction::Start => commands::agent_start_command(&config_path, &cancel).await?,
            AgentAction::Stop => commands::agent_stop_command(&config_path, &cancel).await?,
            AgentAction::Restart => {
                commands::agent_restart_command(&config_path, &cancel).await?
            }
            AgentAction::Status => {
                commands::agent_status_command(&config_path, json, &cancel).await?
            }
        },

        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_show_command(&config_path, json)?,
            ConfigAction::Path => commands::config_path_command(&config_path),
        },
    }

    Ok(())
}
