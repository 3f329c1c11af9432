//! Destination for a generated WireGuard configuration
//!
//! The destination is prepared before a peer is provisioned so a bad path
//! fails before any key exists, and the document is then written in one
//! piece. Files are never overwritten and end up with mode 0600.

use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;

/// Where a configuration document goes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum OutputTarget {
    File(PathBuf),
    Stdout,
}

impl OutputTarget {
    /// `stdout` (or `-`) selects standard output, anything else is a path
    pub fn parse(arg: &str) -> Self {
        match arg.trim() {
            "stdout" | "-" => OutputTarget::Stdout,
            path => OutputTarget::File(PathBuf::from(path)),
        }
    }
}

impl fmt::Display for OutputTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputTarget::File(path) => write!(f, "{}", path.display()),
            OutputTarget::Stdout => write!(f, "stdout"),
        }
    }
}

/// An output target checked and ready for a single write
#[derive(Debug)]
pub struct PreparedOutput {
    target: OutputTarget,
    staged: Option<NamedTempFile>,
}

impl PreparedOutput {
    /// Check the target and stage a temp file next to it
    pub fn prepare(target: OutputTarget) -> io::Result<Self> {
        let staged = match &target {
            OutputTarget::Stdout => None,
            OutputTarget::File(path) => {
                if path.exists() {
                    return Err(io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        format!("{} already exists", path.display()),
                    ));
                }
                // Fails here if the directory is missing or not writable
                Some(NamedTempFile::new_in(parent_dir(path))?)
            }
        };
        Ok(Self { target, staged })
    }

    pub fn target(&self) -> &OutputTarget {
        &self.target
    }

    /// Write `document` and return where it went
    pub fn commit(self, document: &str) -> io::Result<OutputTarget> {
        match (self.staged, &self.target) {
            (Some(mut staged), OutputTarget::File(path)) => {
                staged.write_all(document.as_bytes())?;
                staged.as_file().sync_all()?;
                staged.persist_noclobber(path).map_err(|e| e.error)?;
                restrict_permissions(path)?;
                tracing::debug!("Wrote WireGuard configuration to {:?}", path);
            }
            _ => {
                let stdout = io::stdout();
                let mut out = stdout.lock();
                out.write_all(document.as_bytes())?;
                out.flush()?;
            }
        }
        Ok(self.target)
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}
