//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::keys::PrivateKey;

/// Organization slug, the scoping key for peers
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrgSlug(pub String);

impl OrgSlug {
    /// Create a new organization slug
    pub fn new(slug: impl Into<String>) -> Self {
        Self(slug.into())
    }

    /// Get the raw slug
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrgSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for OrgSlug {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrgSlug {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// An organization visible to the authenticated user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub slug: OrgSlug,
    pub name: String,
}

/// A registered WireGuard peer as listed by the remote store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Peer {
    /// Unique within the organization
    pub name: String,
    /// Gateway region the peer is attached to
    pub region: String,
    /// Address assigned to the peer inside the organization network
    pub peer_ip: String,
    /// The peer's own public key
    #[serde(default)]
    pub public_key: String,
}

/// The server's answer to a peer creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedPeer {
    pub name: String,
    pub region: String,
    pub peer_ip: String,
    /// Gateway address to use as the WireGuard endpoint
    pub endpoint_ip: String,
    /// Gateway public key for the `[Peer]` section
    pub gateway_public_key: String,
    /// DNS server, derived from `peer_ip` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns: Option<String>,
    /// Routed ranges, derived from `peer_ip` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_ips: Option<Vec<String>>,
}

impl CreatedPeer {
    /// The listing view of this peer
    pub fn to_peer(&self, local_public_key: &str) -> Peer {
        Peer {
            name: self.name.clone(),
            region: self.region.clone(),
            peer_ip: self.peer_ip.clone(),
            public_key: local_public_key.to_string(),
        }
    }
}

/// Everything produced by provisioning a new peer
///
/// This is the only place the private key ever exists outside the agent's
/// own cache. Callers must persist it before dropping the value.
#[derive(Debug)]
pub struct PeerCreateResult {
    pub org: OrgSlug,
    pub peer: CreatedPeer,
    pub local_public_key: String,
    pub private_key: PrivateKey,
}

/// Live status of a peer on its gateway, fetched fresh per query
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PeerStatus {
    pub live: bool,
    pub last_handshake_at: Option<String>,
    pub last_handshake_ago: Option<String>,
    /// Last address the gateway saw traffic from
    pub source_address: Option<String>,
    pub installed_at: Option<String>,
    pub installed_ago: Option<String>,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub gateway_error: Option<String>,
}

/// Public view of a tunnel cached by the agent
///
/// Never carries key material; the agent keeps the private key to itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TunnelDescriptor {
    pub org: OrgSlug,
    pub peer_name: String,
    pub region: String,
    pub peer_ip: String,
    pub endpoint: String,
    pub local_public_key: String,
    /// Transport the agent used when it established this tunnel
    pub websockets: bool,
    /// Unix timestamp (seconds)
    pub established_at: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_org_slug_display() {
        let org = OrgSlug::from("acme");
        assert_eq!(org.to_string(), "acme");
        assert_eq!(org.as_str(), "acme");
    }

    #[test]
    fn test_org_slug_serializes_as_plain_string() {
        let json = serde_json::to_string(&OrgSlug::new("acme")).unwrap();
        assert_eq!(json, "\"acme\"");
    }

    #[test]
    fn test_peer_status_tolerates_sparse_payload() {
        let status: PeerStatus = serde_json::from_str(r#"{"live":true,"rxBytes":12}"#).unwrap();
        assert!(status.live);
        assert_eq!(status.rx_bytes, 12);
        assert_eq!(status.gateway_error, None);
    }

    #[test]
    fn test_created_peer_to_peer() {
        let created = CreatedPeer {
            name: "laptop".into(),
            region: "iad".into(),
            peer_ip: "fdaa:0:1:a7b:8c1:0:a:2".into(),
            endpoint_ip: "1.2.3.4".into(),
            gateway_public_key: "gw".into(),
            dns: None,
            allowed_ips: None,
        };
        let peer = created.to_peer("local-pub");
        assert_eq!(peer.name, "laptop");
        assert_eq!(peer.public_key, "local-pub");
    }
}
