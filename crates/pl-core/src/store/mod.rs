//! The remote peer registry
//!
//! [`PeerStore`] is the authoritative source of peers per organization.
//! [`HttpPeerStore`] talks to the platform API; calls are never retried
//! because peer creation is not idempotent.

mod http;
#[cfg(any(test, feature = "testing"))]
pub mod memory;

pub use http::HttpPeerStore;

use async_trait::async_trait;

use crate::error::RemoteError;
use crate::keys::generate_keypair;
use crate::types::{CreatedPeer, OrgSlug, Organization, Peer, PeerCreateResult, PeerStatus};

/// Remote registry of WireGuard peers
#[async_trait]
pub trait PeerStore: Send + Sync {
    /// Organizations visible to the caller
    async fn organizations(&self) -> Result<Vec<Organization>, RemoteError>;

    /// Peers registered in an organization
    async fn list_peers(&self, org: &OrgSlug) -> Result<Vec<Peer>, RemoteError>;

    /// Register a peer for `public_key`; `None` lets the server pick
    async fn create_peer(
        &self,
        org: &OrgSlug,
        region: Option<&str>,
        name: Option<&str>,
        public_key: &str,
    ) -> Result<CreatedPeer, RemoteError>;

    /// Remove a peer by name
    async fn remove_peer(&self, org: &OrgSlug, name: &str) -> Result<(), RemoteError>;

    /// Current gateway status of a peer
    async fn peer_status(&self, org: &OrgSlug, name: &str) -> Result<PeerStatus, RemoteError>;
}

/// Generate a key pair locally and register its public half
///
/// The private key never leaves this process; it is handed back inside the
/// result and is the only copy that will ever exist. Blank `region`/`name`
/// are treated as absent so the server's defaults apply.
pub async fn provision_peer<S>(
    store: &S,
    org: &OrgSlug,
    region: Option<&str>,
    name: Option<&str>,
) -> Result<PeerCreateResult, RemoteError>
where
    S: PeerStore + ?Sized,
{
    let region = region.map(str::trim).filter(|r| !r.is_empty());
    let name = name.map(str::trim).filter(|n| !n.is_empty());

    let (public_key, private_key) = generate_keypair();
    tracing::debug!(%org, ?region, ?name, "Registering WireGuard peer");

    let peer = store.create_peer(org, region, name, &public_key).await?;
    tracing::info!(
        %org,
        peer = %peer.name,
        region = %peer.region,
        "Created WireGuard peer"
    );

    Ok(PeerCreateResult {
        org: org.clone(),
        peer,
        local_public_key: public_key,
        private_key,
    })
}
