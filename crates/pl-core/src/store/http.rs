//! HTTP implementation of the peer store

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::PeerStore;
use crate::config::ApiSettings;
use crate::error::RemoteError;
use crate::types::{CreatedPeer, OrgSlug, Organization, Peer, PeerStatus};

/// JSON client for the platform's WireGuard endpoints
#[derive(Debug, Clone)]
pub struct HttpPeerStore {
    client: Client,
    base: Url,
}

#[derive(Debug, Deserialize)]
struct OrganizationsBody {
    organizations: Vec<Organization>,
}

#[derive(Debug, Deserialize)]
struct PeersBody {
    peers: Vec<Peer>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatePeerBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    region: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    public_key: &'a str,
}

impl HttpPeerStore {
    /// Build a client from API settings
    pub fn new(settings: &ApiSettings) -> Result<Self, RemoteError> {
        let base = Url::parse(&settings.base_url)
            .map_err(|e| RemoteError::Decode(format!("invalid API base URL: {}", e)))?;

        let mut headers = HeaderMap::new();
        if let Some(token) = settings.access_token() {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| RemoteError::Decode("access token is not a valid header".into()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        } else {
            tracing::warn!("No API access token configured; requests will be anonymous");
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(settings.timeout)
            .user_agent(concat!("peerlink/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, base })
    }

    fn url(&self, segments: &[&str]) -> Result<Url, RemoteError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteError::Decode("API base URL cannot have a path".into()))?
            .pop_if_empty()
            .push("v1")
            .push("organizations")
            .extend(segments);
        Ok(url)
    }

    fn peers_url(&self, org: &OrgSlug, rest: &[&str]) -> Result<Url, RemoteError> {
        let mut segments = vec![org.as_str(), "wireguard", "peers"];
        segments.extend_from_slice(rest);
        self.url(&segments)
    }
}

/// Map a response to `T`, turning non-success statuses into errors
async fn decode<T: DeserializeOwned>(response: Response, what: &str) -> Result<T, RemoteError> {
    let response = check(response, what).await?;
    response
        .json::<T>()
        .await
        .map_err(|e| RemoteError::Decode(format!("{}: {}", what, e)))
}

async fn check(response: Response, what: &str) -> Result<Response, RemoteError> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(RemoteError::NotFound(what.to_string()));
    }
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(RemoteError::Status {
            status: status.as_u16(),
            message: message.trim().to_string(),
        });
    }
    Ok(response)
}

#[async_trait]
impl PeerStore for HttpPeerStore {
    async fn organizations(&self) -> Result<Vec<Organization>, RemoteError> {
        let url = self.url(&[])?;
        let response = self.client.get(url).send().await?;
        let body: OrganizationsBody = decode(response, "organizations").await?;
        Ok(body.organizations)
    }

    async fn list_peers(&self, org: &OrgSlug) -> Result<Vec<Peer>, RemoteError> {
        let url = self.peers_url(org, &[])?;
        tracing::debug!(%org, "Listing WireGuard peers");
        let response = self.client.get(url).send().await?;
        let body: PeersBody = decode(response, &format!("organization {}", org)).await?;
        Ok(body.peers)
    }

    async fn create_peer(
        &self,
        org: &OrgSlug,
        region: Option<&str>,
        name: Option<&str>,
        public_key: &str,
    ) -> Result<CreatedPeer, RemoteError> {
        let url = self.peers_url(org, &[])?;
        let body = CreatePeerBody {
            region,
            name,
            public_key,
        };
        let response = self.client.post(url).json(&body).send().await?;
        decode(response, &format!("organization {}", org)).await
    }

    async fn remove_peer(&self, org: &OrgSlug, name: &str) -> Result<(), RemoteError> {
        let url = self.peers_url(org, &[name])?;
        let response = self.client.delete(url).send().await?;
        check(response, &format!("peer {} in {}", name, org)).await?;
        Ok(())
    }

    async fn peer_status(&self, org: &OrgSlug, name: &str) -> Result<PeerStatus, RemoteError> {
        let url = self.peers_url(org, &[name, "status"])?;
        let response = self.client.get(url).send().await?;
        decode(response, &format!("peer {} in {}", name, org)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(base_url: &str) -> HttpPeerStore {
        HttpPeerStore::new(&ApiSettings {
            base_url: base_url.to_string(),
            access_token: Some("secret".to_string()),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_peers_url() {
        let store = store("https://api.example.test");
        let url = store
            .peers_url(&OrgSlug::from("acme"), &["laptop", "status"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.test/v1/organizations/acme/wireguard/peers/laptop/status"
        );
    }

    #[test]
    fn test_url_escapes_segments() {
        let store = store("https://api.example.test/");
        let url = store.peers_url(&OrgSlug::from("acme"), &["my peer/1"]).unwrap();
        assert!(url.as_str().ends_with("/peers/my%20peer%2F1"));
    }

    #[test]
    fn test_create_body_omits_defaults() {
        let body = CreatePeerBody {
            region: None,
            name: None,
            public_key: "pub",
        };
        assert_eq!(serde_json::to_string(&body).unwrap(), r#"{"publicKey":"pub"}"#);
    }

    #[test]
    fn test_invalid_base_url() {
        let err = HttpPeerStore::new(&ApiSettings {
            base_url: "not a url".to_string(),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, RemoteError::Decode(_)));
    }
}
