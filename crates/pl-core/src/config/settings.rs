//! Persisted CLI and agent settings

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::serde_utils::duration_secs;
use super::{load_config, save_config};
use crate::error::ConfigError;

/// Environment variable that overrides `api.access_token`
pub const ACCESS_TOKEN_ENV: &str = "PEERLINK_ACCESS_TOKEN";

/// Top-level settings record
///
/// Written by the CLI and read by the agent process at its own startup, so
/// every write bumps `version`. An agent reports the version it loaded,
/// which tells whether it is running on stale settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Incremented on every write through [`Settings::update`]
    pub version: u64,

    /// Organization used when `--org` is not given
    pub default_org: Option<String>,

    /// Whether the agent should carry WireGuard over websockets
    pub wire_guard_websockets: bool,

    /// Remote API access
    pub api: ApiSettings,

    /// Local agent process
    pub agent: AgentSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: 1,
            default_org: None,
            wire_guard_websockets: false,
            api: ApiSettings::default(),
            agent: AgentSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings, falling back to defaults when the file doesn't exist
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match load_config(path) {
            Ok(settings) => Ok(settings),
            Err(ConfigError::NotFound(_)) => {
                tracing::debug!("No settings at {:?}, using defaults", path);
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Read-modify-write the settings file, bumping the version
    pub fn update<F>(path: &Path, apply: F) -> Result<Self, ConfigError>
    where
        F: FnOnce(&mut Settings),
    {
        let mut settings = Self::load_or_default(path)?;
        apply(&mut settings);
        settings.version += 1;
        save_config(path, &settings)?;
        tracing::debug!(version = settings.version, "Saved settings to {:?}", path);
        Ok(settings)
    }
}

/// Remote API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    /// Base URL of the platform API
    pub base_url: String,

    /// Bearer token; the environment variable takes precedence
    pub access_token: Option<String>,

    /// Per-request timeout
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.peerlink.dev".to_string(),
            access_token: None,
            timeout: Duration::from_secs(30),
        }
    }
}

impl ApiSettings {
    /// Resolve the access token, preferring the environment
    pub fn access_token(&self) -> Option<String> {
        std::env::var(ACCESS_TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| self.access_token.clone())
    }
}

/// Local agent settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// IPC port (localhost only)
    pub ipc_port: u16,

    /// Upper bound for a single agent request
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,

    /// How long to wait for a freshly spawned agent to answer
    #[serde(with = "duration_secs")]
    pub start_timeout: Duration,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            ipc_port: 22240,
            request_timeout: Duration::from_secs(30),
            start_timeout: Duration::from_secs(10),
        }
    }
}

impl AgentSettings {
    /// Get the IPC address (localhost:port)
    pub fn ipc_address(&self) -> String {
        format!("127.0.0.1:{}", self.ipc_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_when_missing() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::load_or_default(&dir.path().join("config.toml")).unwrap();
        assert!(!settings.wire_guard_websockets);
        assert_eq!(settings.agent.ipc_address(), "127.0.0.1:22240");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "default_org = \"acme\"\n[agent]\nipc_port = 40000\n").unwrap();

        let settings = Settings::load_or_default(&path).unwrap();
        assert_eq!(settings.default_org.as_deref(), Some("acme"));
        assert_eq!(settings.agent.ipc_port, 40000);
        assert_eq!(settings.agent.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_update_bumps_version() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let first = Settings::update(&path, |s| s.wire_guard_websockets = true).unwrap();
        let second = Settings::update(&path, |s| s.wire_guard_websockets = false).unwrap();

        assert_eq!(second.version, first.version + 1);
        let on_disk = Settings::load_or_default(&path).unwrap();
        assert_eq!(on_disk.version, second.version);
        assert!(!on_disk.wire_guard_websockets);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "version = [").unwrap();
        assert!(matches!(
            Settings::load_or_default(&path),
            Err(ConfigError::Parse(_))
        ));
    }
}
