//! Output formatting utilities for the CLI
//!
//! Tables for peers and cached tunnels, status displays, JSON output and
//! colored status messages. Commands hand structured results to these
//! functions; nothing here decides anything.

pub mod artifact;

use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use pl_core::ipc::AgentStatus;
use pl_core::time::elapsed_secs;
use pl_core::{Peer, PeerStatus, TunnelDescriptor};

pub use artifact::{OutputTarget, PreparedOutput};

/// Printed before a configuration containing a private key is produced
pub const PRIVATE_KEY_WARNING: &str = "\
!!!! WARNING: Output includes private key. Private keys cannot be recovered !!!!
!!!! after creating the peer; if you lose the key, you'll need to remove    !!!!
!!!! and re-add the peering connection.                                     !!!!";

/// Format WireGuard peers as a table
///
/// Returns "No WireGuard peers" when the list is empty.
pub fn format_peers(peers: &[Peer]) -> String {
    if peers.is_empty() {
        return "No WireGuard peers".to_string();
    }

    #[derive(Tabled)]
    struct PeerRow {
        #[tabled(rename = "NAME")]
        name: String,
        #[tabled(rename = "REGION")]
        region: String,
        #[tabled(rename = "PEER IP")]
        peer_ip: String,
    }

    let rows: Vec<PeerRow> = peers
        .iter()
        .map(|p| PeerRow {
            name: p.name.clone(),
            region: p.region.clone(),
            peer_ip: p.peer_ip.clone(),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Format the agent's cached tunnels as a table
pub fn format_tunnels(tunnels: &[TunnelDescriptor]) -> String {
    if tunnels.is_empty() {
        return "No cached tunnels".to_string();
    }

    #[derive(Tabled)]
    struct TunnelRow {
        #[tabled(rename = "ORG")]
        org: String,
        #[tabled(rename = "PEER")]
        peer: String,
        #[tabled(rename = "REGION")]
        region: String,
        #[tabled(rename = "ENDPOINT")]
        endpoint: String,
        #[tabled(rename = "TRANSPORT")]
        transport: String,
        #[tabled(rename = "AGE")]
        age: String,
    }

    let rows: Vec<TunnelRow> = tunnels
        .iter()
        .map(|t| TunnelRow {
            org: t.org.to_string(),
            peer: t.peer_name.clone(),
            region: t.region.clone(),
            endpoint: t.endpoint.clone(),
            transport: transport_name(t.websockets).to_string(),
            age: format_duration(elapsed_secs(t.established_at)),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Format a peer's gateway status
///
/// Handshake, address and traffic lines only appear for a live peer.
pub fn format_peer_status(status: &PeerStatus) -> String {
    let mut output = String::new();

    output.push_str(&format!("Alive: {}\n", status.live));
    if let Some(error) = status.gateway_error.as_deref().filter(|e| !e.is_empty()) {
        output.push_str(&format!("Gateway error: {}\n", error));
    }

    if !status.live {
        return output;
    }

    if let Some(addr) = status.source_address.as_deref().filter(|a| !a.is_empty()) {
        output.push_str(&format!("Last Source Address: {}\n", addr));
    }
    if let Some(at) = status.last_handshake_at.as_deref().filter(|a| !a.is_empty()) {
        output.push_str(&format!(
            "Last Handshake At: {}{}\n",
            at,
            ago(status.last_handshake_ago.as_deref())
        ));
    }
    output.push_str(&format!(
        "Installed On Gateway At: {}{}\n",
        status.installed_at.as_deref().unwrap_or("-"),
        ago(status.installed_ago.as_deref())
    ));
    output.push_str(&format!(
        "Traffic: rx:{} tx:{}\n",
        status.rx_bytes, status.tx_bytes
    ));

    output
}

fn ago(value: Option<&str>) -> String {
    match value {
        Some(v) if !v.is_empty() => format!(" ({} ago)", v),
        _ => String::new(),
    }
}

/// Format agent status as a human-readable string
///
/// `current_settings_version` is the version on disk now; a lower version
/// in the agent means it runs with outdated settings.
pub fn format_agent_status(status: &AgentStatus, current_settings_version: u64) -> String {
    let mut output = String::new();

    output.push_str("Agent Status: Running\n");
    output.push_str(&format!("Version: {}\n", status.version));
    output.push_str(&format!("PID: {}\n", status.pid));
    output.push_str(&format!("Uptime: {}\n", format_duration(status.uptime_secs)));
    output.push_str(&format!("Cached Tunnels: {}\n", status.tunnel_count));
    output.push_str(&format!(
        "Transport: {}\n",
        transport_name(status.websockets)
    ));
    if status.settings_version < current_settings_version {
        output.push_str(&format!(
            "Settings: outdated (agent loaded v{}, current v{})\n",
            status.settings_version, current_settings_version
        ));
    }

    output
}

fn transport_name(websockets: bool) -> &'static str {
    if websockets {
        "websockets"
    } else {
        "udp"
    }
}

/// Format duration in human-readable form
fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}

/// Print a value as pretty JSON on stdout
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow to stderr
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an informational message in cyan
pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_peer_table() {
        assert_eq!(format_peers(&[]), "No WireGuard peers");
    }

    #[test]
    fn test_peer_table_columns() {
        let table = format_peers(&[Peer {
            name: "laptop".into(),
            region: "iad".into(),
            peer_ip: "fdaa:0:1:a7b:1:0:a:2".into(),
            public_key: "pub".into(),
        }]);
        assert!(table.contains("NAME"));
        assert!(table.contains("PEER IP"));
        assert!(table.contains("laptop"));
        assert!(!table.contains("pub"));
    }

    #[test]
    fn test_dead_peer_status() {
        let out = format_peer_status(&PeerStatus {
            live: false,
            gateway_error: Some("no route".into()),
            rx_bytes: 5,
            ..Default::default()
        });
        assert_eq!(out, "Alive: false\nGateway error: no route\n");
    }

    #[test]
    fn test_live_peer_status() {
        let out = format_peer_status(&PeerStatus {
            live: true,
            source_address: Some("203.0.113.9:51000".into()),
            last_handshake_at: Some("2026-01-02T03:04:05Z".into()),
            last_handshake_ago: Some("12s".into()),
            installed_at: Some("2026-01-01T00:00:00Z".into()),
            installed_ago: Some("1d".into()),
            rx_bytes: 10,
            tx_bytes: 20,
            gateway_error: None,
        });
        assert!(out.contains("Last Source Address: 203.0.113.9:51000\n"));
        assert!(out.contains("Last Handshake At: 2026-01-02T03:04:05Z (12s ago)\n"));
        assert!(out.contains("Installed On Gateway At: 2026-01-01T00:00:00Z (1d ago)\n"));
        assert!(out.ends_with("Traffic: rx:10 tx:20\n"));
    }

    #[test]
    fn test_agent_status_flags_outdated_settings() {
        let status = AgentStatus {
            version: "0.1.0".into(),
            pid: 7,
            uptime_secs: 3700,
            tunnel_count: 1,
            websockets: false,
            settings_version: 2,
        };
        let out = format_agent_status(&status, 3);
        assert!(out.contains("Uptime: 1h 1m"));
        assert!(out.contains("Transport: udp"));
        assert!(out.contains("outdated"));
        assert!(!format_agent_status(&status, 2).contains("outdated"));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(59), "59s");
        assert_eq!(format_duration(61), "1m 1s");
        assert_eq!(format_duration(90_000), "1d 1h");
    }
}
