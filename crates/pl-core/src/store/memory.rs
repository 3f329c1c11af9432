//! In-memory peer store for tests
//!
//! Behaves like the platform API for the calls peerlink makes: unknown
//! organizations and peers are `NotFound`, names are unique per
//! organization and omitted names/regions get server-side defaults.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::PeerStore;
use crate::error::RemoteError;
use crate::types::{CreatedPeer, OrgSlug, Organization, Peer, PeerStatus};

#[derive(Debug, Default)]
struct OrgPeers {
    peers: BTreeMap<String, Peer>,
    statuses: BTreeMap<String, PeerStatus>,
}

/// Peer store backed by a map, with knobs for failure injection
#[derive(Debug, Default)]
pub struct MemoryPeerStore {
    orgs: Mutex<BTreeMap<OrgSlug, OrgPeers>>,
    next_id: AtomicUsize,
    stalled: AtomicBool,
    failing: Mutex<Option<u16>>,
    create_calls: AtomicUsize,
    remove_calls: AtomicUsize,
}

impl MemoryPeerStore {
    /// Region assigned when the caller does not pick one
    pub const DEFAULT_REGION: &'static str = "iad";

    pub fn new() -> Self {
        Self::default()
    }

    /// Add an organization
    pub fn with_org(self, slug: &str) -> Self {
        self.lock().entry(OrgSlug::from(slug)).or_default();
        self
    }

    /// Add an existing peer to an organization
    pub fn with_peer(self, org: &str, name: &str, region: &str) -> Self {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.lock().entry(OrgSlug::from(org)).or_default().peers.insert(
            name.to_string(),
            Peer {
                name: name.to_string(),
                region: region.to_string(),
                peer_ip: peer_ip(id),
                public_key: format!("existing-key-{}", id),
            },
        );
        self
    }

    /// Set the gateway status reported for a peer
    pub fn set_status(&self, org: &str, name: &str, status: PeerStatus) {
        self.lock()
            .entry(OrgSlug::from(org))
            .or_default()
            .statuses
            .insert(name.to_string(), status);
    }

    /// Make every subsequent call hang until dropped
    pub fn set_stalled(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }

    /// Make every subsequent call fail with `status`
    pub fn set_failing(&self, status: Option<u16>) {
        *self.failing.lock().unwrap_or_else(|e| e.into_inner()) = status;
    }

    /// Number of `create_peer` calls seen
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Number of `remove_peer` calls seen
    pub fn remove_calls(&self) -> usize {
        self.remove_calls.load(Ordering::SeqCst)
    }

    /// Names of the peers currently registered in `org`
    pub fn peer_names(&self, org: &str) -> Vec<String> {
        self.lock()
            .get(&OrgSlug::from(org))
            .map(|o| o.peers.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<OrgSlug, OrgPeers>> {
        self.orgs.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn gate(&self) -> Result<(), RemoteError> {
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let failing = *self.failing.lock().unwrap_or_else(|e| e.into_inner());
        match failing {
            Some(status) => Err(RemoteError::Status {
                status,
                message: "injected failure".to_string(),
            }),
            None => Ok(()),
        }
    }
}

fn peer_ip(id: usize) -> String {
    format!("fdaa:0:1:a7b:{:x}:0:a:2", id + 1)
}

fn unknown_org(org: &OrgSlug) -> RemoteError {
    RemoteError::NotFound(format!("organization {}", org))
}

#[async_trait]
impl PeerStore for MemoryPeerStore {
    async fn organizations(&self) -> Result<Vec<Organization>, RemoteError> {
        self.gate().await?;
        Ok(self
            .lock()
            .keys()
            .map(|slug| Organization {
                slug: slug.clone(),
                name: slug.to_string(),
            })
            .collect())
    }

    async fn list_peers(&self, org: &OrgSlug) -> Result<Vec<Peer>, RemoteError> {
        self.gate().await?;
        let orgs = self.lock();
        let entry = orgs.get(org).ok_or_else(|| unknown_org(org))?;
        Ok(entry.peers.values().cloned().collect())
    }

    async fn create_peer(
        &self,
        org: &OrgSlug,
        region: Option<&str>,
        name: Option<&str>,
        public_key: &str,
    ) -> Result<CreatedPeer, RemoteError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.gate().await?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut orgs = self.lock();
        let entry = orgs.get_mut(org).ok_or_else(|| unknown_org(org))?;

        let name = name
            .map(str::to_string)
            .unwrap_or_else(|| format!("peer-{}", id));
        if entry.peers.contains_key(&name) {
            return Err(RemoteError::Status {
                status: 409,
                message: format!("peer {} already exists", name),
            });
        }

        let created = CreatedPeer {
            name: name.clone(),
            region: region.unwrap_or(Self::DEFAULT_REGION).to_string(),
            peer_ip: peer_ip(id),
            endpoint_ip: format!("198.51.100.{}", id % 250 + 1),
            gateway_public_key: "Z2F0ZXdheS1wdWJsaWMta2V5LWZvci10ZXN0cy0wMDA=".to_string(),
            dns: None,
            allowed_ips: None,
        };
        entry.peers.insert(name, created.to_peer(public_key));
        Ok(created)
    }

    async fn remove_peer(&self, org: &OrgSlug, name: &str) -> Result<(), RemoteError> {
        self.remove_calls.fetch_add(1, Ordering::SeqCst);
        self.gate().await?;

        let mut orgs = self.lock();
        let entry = orgs.get_mut(org).ok_or_else(|| unknown_org(org))?;
        entry.statuses.remove(name);
        entry
            .peers
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| RemoteError::NotFound(format!("peer {} in {}", name, org)))
    }

    async fn peer_status(&self, org: &OrgSlug, name: &str) -> Result<PeerStatus, RemoteError> {
        self.gate().await?;
        let orgs = self.lock();
        let entry = orgs.get(org).ok_or_else(|| unknown_org(org))?;
        if !entry.peers.contains_key(name) {
            return Err(RemoteError::NotFound(format!("peer {} in {}", name, org)));
        }
        Ok(entry.statuses.get(name).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_org_is_not_found() {
        let store = MemoryPeerStore::new();
        let err = store.list_peers(&OrgSlug::from("nope")).await.unwrap_err();
        assert!(matches!(err, RemoteError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_duplicate_name_conflicts() {
        let store = MemoryPeerStore::new().with_peer("acme", "laptop", "ord");
        let err = store
            .create_peer(&OrgSlug::from("acme"), None, Some("laptop"), "k")
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Status { status: 409, .. }));
    }

    #[tokio::test]
    async fn test_remove_unknown_peer() {
        let store = MemoryPeerStore::new().with_org("acme");
        let err = store
            .remove_peer(&OrgSlug::from("acme"), "ghost")
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::NotFound(_)));
        assert_eq!(store.remove_calls(), 1);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let store = MemoryPeerStore::new().with_org("acme");
        store.set_failing(Some(503));
        assert!(store.organizations().await.is_err());
        store.set_failing(None);
        assert_eq!(store.organizations().await.unwrap().len(), 1);
    }
}
