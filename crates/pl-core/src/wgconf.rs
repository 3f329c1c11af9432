//! WireGuard configuration documents
//!
//! Renders the `[Interface]`/`[Peer]` document a WireGuard client loads. The
//! document is produced as a whole `String` so callers can write it in one
//! go; nothing is emitted until every field is known to be valid.

use std::net::Ipv6Addr;

use serde::{Deserialize, Serialize};

use crate::error::PeerError;
use crate::keys::PrivateKey;
use crate::types::{CreatedPeer, OrgSlug, PeerCreateResult, TunnelDescriptor};

/// Default WireGuard listen port on the gateways
pub const GATEWAY_PORT: u16 = 51820;

/// Keepalive interval written into the `[Peer]` section
pub const PERSISTENT_KEEPALIVE_SECS: u32 = 15;

/// A peer established by the agent, including its private key
///
/// This is what the agent caches per organization. It is converted to a
/// [`TunnelDescriptor`] before it ever crosses the IPC boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireGuardState {
    pub org: OrgSlug,
    pub name: String,
    pub region: String,
    pub local_public_key: String,
    pub private_key: PrivateKey,
    pub peer: CreatedPeer,
    pub websockets: bool,
    /// Unix timestamp (seconds)
    pub established_at: u64,
}

impl WireGuardState {
    /// Build agent state from a fresh provisioning result
    pub fn from_created(created: PeerCreateResult, websockets: bool, established_at: u64) -> Self {
        Self {
            org: created.org,
            name: created.peer.name.clone(),
            region: created.peer.region.clone(),
            local_public_key: created.local_public_key,
            private_key: created.private_key,
            peer: created.peer,
            websockets,
            established_at,
        }
    }

    /// The key-free projection sent to clients
    pub fn descriptor(&self) -> TunnelDescriptor {
        TunnelDescriptor {
            org: self.org.clone(),
            peer_name: self.name.clone(),
            region: self.region.clone(),
            peer_ip: self.peer.peer_ip.clone(),
            endpoint: endpoint_with_port(&self.peer.endpoint_ip),
            local_public_key: self.local_public_key.clone(),
            websockets: self.websockets,
            established_at: self.established_at,
        }
    }

    /// Render this state as a configuration document
    pub fn render(&self) -> Result<String, PeerError> {
        render_config(&self.peer, &self.private_key)
    }
}

/// Render a WireGuard configuration document for a created peer
pub fn render_config(peer: &CreatedPeer, private_key: &PrivateKey) -> Result<String, PeerError> {
    let private_key = non_empty("PrivateKey", private_key.expose())?;
    let peer_ip = non_empty("peer address", &peer.peer_ip)?;
    let public_key = non_empty("gateway PublicKey", &peer.gateway_public_key)?;
    let endpoint = non_empty("Endpoint", &peer.endpoint_ip)?;

    let dns = match &peer.dns {
        Some(dns) if !dns.trim().is_empty() => dns.trim().to_string(),
        _ => network_dns(peer_ip)?.to_string(),
    };
    let allowed_ips = match &peer.allowed_ips {
        Some(ranges) if !ranges.is_empty() => ranges.join(", "),
        _ => format!("{}/48", network_prefix(peer_ip)?),
    };

    Ok(format!(
        "[Interface]\n\
         PrivateKey = {private_key}\n\
         Address = {peer_ip}/120\n\
         DNS = {dns}\n\
         \n\
         [Peer]\n\
         PublicKey = {public_key}\n\
         AllowedIPs = {allowed_ips}\n\
         Endpoint = {endpoint}\n\
         PersistentKeepalive = {keepalive}\n",
        endpoint = endpoint_with_port(endpoint),
        keepalive = PERSISTENT_KEEPALIVE_SECS,
    ))
}

/// Append the gateway port unless the endpoint already carries one
pub fn endpoint_with_port(endpoint: &str) -> String {
    let endpoint = endpoint.trim();
    if endpoint.parse::<std::net::SocketAddr>().is_ok() {
        return endpoint.to_string();
    }
    match endpoint.parse::<Ipv6Addr>() {
        Ok(_) => format!("[{}]:{}", endpoint, GATEWAY_PORT),
        Err(_) if endpoint.contains(':') => endpoint.to_string(),
        Err(_) => format!("{}:{}", endpoint, GATEWAY_PORT),
    }
}

/// The organization's /48 network: the peer address with bytes 6..16 zeroed
fn network_prefix(peer_ip: &str) -> Result<Ipv6Addr, PeerError> {
    let addr: Ipv6Addr = peer_ip.parse().map_err(|_| {
        PeerError::InvalidConfig(format!(
            "peer address {} is not IPv6 and the server sent no DNS/AllowedIPs",
            peer_ip
        ))
    })?;
    let mut octets = addr.octets();
    octets[6..].fill(0);
    Ok(Ipv6Addr::from(octets))
}

/// The organization's DNS server: the network prefix ending in `::3`
fn network_dns(peer_ip: &str) -> Result<Ipv6Addr, PeerError> {
    let mut octets = network_prefix(peer_ip)?.octets();
    octets[15] = 3;
    Ok(Ipv6Addr::from(octets))
}

fn non_empty<'a>(field: &str, value: &'a str) -> Result<&'a str, PeerError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(PeerError::InvalidConfig(format!("{} is empty", field)));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generate_keypair;

    fn created(peer_ip: &str) -> CreatedPeer {
        CreatedPeer {
            name: "laptop".into(),
            region: "iad".into(),
            peer_ip: peer_ip.into(),
            endpoint_ip: "145.40.89.1".into(),
            gateway_public_key: "Z2F0ZXdheS1wdWJsaWMta2V5LWZvci10ZXN0cy0wMDA=".into(),
            dns: None,
            allowed_ips: None,
        }
    }

    #[test]
    fn test_render_derives_dns_and_allowed_ips() {
        let (_, private) = generate_keypair();
        let doc = render_config(&created("fdaa:0:1:a7b:8c1:0:a:2"), &private).unwrap();

        assert!(doc.starts_with("[Interface]\n"));
        assert!(doc.contains(&format!("PrivateKey = {}\n", private.expose())));
        assert!(doc.contains("Address = fdaa:0:1:a7b:8c1:0:a:2/120\n"));
        assert!(doc.contains("DNS = fdaa:0:1::3\n"));
        assert!(doc.contains("AllowedIPs = fdaa:0:1::/48\n"));
        assert!(doc.contains("Endpoint = 145.40.89.1:51820\n"));
        assert!(doc.contains("PersistentKeepalive = 15\n"));
        assert!(doc.contains("\n[Peer]\n"));
    }

    #[test]
    fn test_render_full_document() {
        let (_, private) = generate_keypair();
        let doc = render_config(&created("fdaa:0:1:a7b:8c1:0:a:2"), &private).unwrap();

        let expected = format!(
            "[Interface]\n\
             PrivateKey = {}\n\
             Address = fdaa:0:1:a7b:8c1:0:a:2/120\n\
             DNS = fdaa:0:1::3\n\
             \n\
             [Peer]\n\
             PublicKey = Z2F0ZXdheS1wdWJsaWMta2V5LWZvci10ZXN0cy0wMDA=\n\
             AllowedIPs = fdaa:0:1::/48\n\
             Endpoint = 145.40.89.1:51820\n\
             PersistentKeepalive = 15\n",
            private.expose()
        );
        assert_eq!(doc, expected);
    }

    #[test]
    fn test_render_prefers_server_supplied_ranges() {
        let (_, private) = generate_keypair();
        let mut peer = created("10.0.0.2");
        peer.dns = Some("10.0.0.3".into());
        peer.allowed_ips = Some(vec!["10.0.0.0/16".into(), "10.1.0.0/16".into()]);

        let doc = render_config(&peer, &private).unwrap();
        assert!(doc.contains("DNS = 10.0.0.3\n"));
        assert!(doc.contains("AllowedIPs = 10.0.0.0/16, 10.1.0.0/16\n"));
    }

    #[test]
    fn test_render_rejects_ipv4_without_ranges() {
        let (_, private) = generate_keypair();
        let err = render_config(&created("10.0.0.2"), &private).unwrap_err();
        assert!(matches!(err, PeerError::InvalidConfig(_)));
    }

    #[test]
    fn test_render_rejects_empty_fields() {
        let (_, private) = generate_keypair();
        let mut peer = created("fdaa:0:1:a7b:8c1:0:a:2");
        peer.endpoint_ip = "  ".into();
        let err = render_config(&peer, &private).unwrap_err();
        assert!(err.to_string().contains("Endpoint"));
    }

    #[test]
    fn test_error_never_contains_private_key() {
        let (_, private) = generate_keypair();
        let mut peer = created("fdaa:0:1:a7b:8c1:0:a:2");
        peer.gateway_public_key = String::new();
        let err = render_config(&peer, &private).unwrap_err();
        assert!(!err.to_string().contains(private.expose()));
    }

    #[test]
    fn test_endpoint_with_port() {
        assert_eq!(endpoint_with_port("1.2.3.4"), "1.2.3.4:51820");
        assert_eq!(endpoint_with_port("1.2.3.4:443"), "1.2.3.4:443");
        assert_eq!(endpoint_with_port("2604:1380::1"), "[2604:1380::1]:51820");
        assert_eq!(endpoint_with_port("gw.example.net"), "gw.example.net:51820");
    }

    #[test]
    fn test_descriptor_drops_private_key() {
        let (public, private) = generate_keypair();
        let state = WireGuardState::from_created(
            PeerCreateResult {
                org: OrgSlug::from("acme"),
                peer: created("fdaa:0:1:a7b:8c1:0:a:2"),
                local_public_key: public.clone(),
                private_key: private.clone(),
            },
            false,
            1_700_000_000,
        );
        let descriptor = state.descriptor();
        let json = serde_json::to_string(&descriptor).unwrap();
        assert!(!json.contains(private.expose()));
        assert_eq!(descriptor.local_public_key, public);
        assert_eq!(descriptor.endpoint, "145.40.89.1:51820");
    }
}
