//! Configuration management for peerlink

pub mod serde_utils;
mod settings;

pub use settings::{AgentSettings, ApiSettings, Settings, ACCESS_TOKEN_ENV};

use crate::error::ConfigError;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("peerlink")
}

/// Get the default configuration file path
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

/// Directory holding runtime state (agent lock file, tunnel cache)
///
/// This is the directory of the config file in use, so `--config` also
/// isolates the agent.
pub fn state_dir(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let config: T = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to a file
///
/// The file is replaced atomically: a reader (such as an agent starting up)
/// sees either the old or the new document, never a torn one.
pub fn save_config<T: serde::Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;
    let io_err = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };

    let dir = state_dir(path);
    std::fs::create_dir_all(&dir).map_err(io_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(io_err)?;
    tmp.write_all(content.as_bytes()).map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;

    Ok(())
}
