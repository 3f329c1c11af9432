//! Agent lock file and IPC authentication token
//!
//! The agent writes `agent.json` into the state directory on startup:
//! a random token, its PID and the address it listens on. The file is
//! mode 0600, so only the owning user can read the token. Clients read it
//! to find the agent and to authenticate; a missing file or a dead PID
//! means the agent is not running.
//!
//! Only one live agent may own the file. A new agent takes over a file left
//! behind by a dead process and refuses to start while the owner lives.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::process::is_process_alive;

/// Length of the authentication token in bytes (before hex encoding)
const TOKEN_BYTES: usize = 32;

/// Lock file name inside the state directory
pub const LOCK_FILENAME: &str = "agent.json";

/// Lock file contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentLock {
    /// The authentication token (hex-encoded)
    pub token: String,
    /// PID of the agent process
    pub pid: u32,
    /// IPC address the agent is listening on
    pub address: String,
}

/// Result of attempting to acquire the lock file
#[derive(Debug)]
pub enum LockOwnership {
    /// We own the lock; serve with this token
    Acquired { token: String },
    /// Another live agent owns it
    Held { pid: u32, address: String },
}

/// Path of the lock file in a state directory
pub fn lock_path(state_dir: &Path) -> PathBuf {
    state_dir.join(LOCK_FILENAME)
}

/// Generate a new random authentication token
///
/// Returns a 64-character hex string (32 random bytes)
pub fn generate_token() -> String {
    use rand::Rng;
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}

/// Acquire the agent lock for `address`
pub fn acquire_lock(state_dir: &Path, address: &str) -> io::Result<LockOwnership> {
    let our_pid = std::process::id();

    if let Some(lock) = read_lock(state_dir)? {
        if lock.pid != our_pid && is_process_alive(lock.pid) {
            return Ok(LockOwnership::Held {
                pid: lock.pid,
                address: lock.address,
            });
        }
        tracing::info!(
            "Previous agent (PID {}) is no longer running, taking over lock",
            lock.pid
        );
    }

    let token = generate_token();
    write_lock(
        state_dir,
        &AgentLock {
            token: token.clone(),
            pid: our_pid,
            address: address.to_string(),
        },
    )?;
    tracing::info!("Acquired agent lock (PID {})", our_pid);

    Ok(LockOwnership::Acquired { token })
}

/// Read the lock file, `Ok(None)` if absent or unreadable as JSON
pub fn read_lock(state_dir: &Path) -> io::Result<Option<AgentLock>> {
    match fs::read_to_string(lock_path(state_dir)) {
        Ok(contents) => match serde_json::from_str::<AgentLock>(&contents) {
            Ok(lock) => Ok(Some(lock)),
            Err(_) => {
                tracing::debug!("Agent lock file is not valid JSON, ignoring it");
                Ok(None)
            }
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Read the lock file only if its owner is still alive
pub fn read_live_lock(state_dir: &Path) -> io::Result<Option<AgentLock>> {
    Ok(read_lock(state_dir)?.filter(|lock| is_process_alive(lock.pid)))
}

fn write_lock(state_dir: &Path, lock: &AgentLock) -> io::Result<()> {
    fs::create_dir_all(state_dir)?;
    let path = lock_path(state_dir);

    let json = serde_json::to_string_pretty(lock)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    fs::write(&path, json)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
    }

    Ok(())
}

/// Remove the lock file if this process owns it
pub fn release_lock(state_dir: &Path) -> io::Result<()> {
    let our_pid = std::process::id();

    if let Some(lock) = read_lock(state_dir)? {
        if lock.pid != our_pid {
            tracing::debug!(
                "Not removing agent lock - owned by PID {}, we are PID {}",
                lock.pid,
                our_pid
            );
            return Ok(());
        }
    }

    match fs::remove_file(lock_path(state_dir)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Compare two tokens in constant time
pub fn validate_token(provided: &str, expected: &str) -> bool {
    if provided.len() != expected.len() {
        return false;
    }

    let mut result = 0u8;
    for (a, b) in provided.bytes().zip(expected.bytes()) {
        result |= a ^ b;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_generate_token() {
        let token = generate_token();
        assert_eq!(token.len(), TOKEN_BYTES * 2);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_token());
    }

    #[test]
    fn test_validate_token() {
        assert!(validate_token("abc123", "abc123"));
        assert!(!validate_token("abc123", "abc124"));
        assert!(!validate_token("abc123", "abc12"));
    }

    #[test]
    fn test_acquire_and_release() {
        let dir = tempdir().unwrap();

        let token = match acquire_lock(dir.path(), "127.0.0.1:40000").unwrap() {
            LockOwnership::Acquired { token } => token,
            other => panic!("expected to acquire, got {:?}", other),
        };

        let lock = read_live_lock(dir.path()).unwrap().unwrap();
        assert_eq!(lock.token, token);
        assert_eq!(lock.pid, std::process::id());

        release_lock(dir.path()).unwrap();
        assert!(read_lock(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_dead_owner_is_taken_over() {
        let dir = tempdir().unwrap();
        write_lock(
            dir.path(),
            &AgentLock {
                token: "stale".into(),
                pid: 999_999_999,
                address: "127.0.0.1:1".into(),
            },
        )
        .unwrap();

        assert!(read_live_lock(dir.path()).unwrap().is_none());
        assert!(matches!(
            acquire_lock(dir.path(), "127.0.0.1:40001").unwrap(),
            LockOwnership::Acquired { .. }
        ));
    }

    #[test]
    fn test_release_leaves_foreign_lock() {
        let dir = tempdir().unwrap();
        let foreign = AgentLock {
            token: "theirs".into(),
            pid: 999_999_999,
            address: "127.0.0.1:1".into(),
        };
        write_lock(dir.path(), &foreign).unwrap();

        release_lock(dir.path()).unwrap();
        assert_eq!(read_lock(dir.path()).unwrap(), Some(foreign));
    }

    #[test]
    fn test_garbage_lock_is_ignored() {
        let dir = tempdir().unwrap();
        fs::write(lock_path(dir.path()), "not json").unwrap();
        assert!(read_lock(dir.path()).unwrap().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_lock_file_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        acquire_lock(dir.path(), "127.0.0.1:40002").unwrap();
        let mode = fs::metadata(lock_path(dir.path()))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
