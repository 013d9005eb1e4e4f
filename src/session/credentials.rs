//! On-disk credential storage for the paired device.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

/// Where credentials live unless configured otherwise.
pub const DEFAULT_CREDENTIALS_DIR: &str = ".wwebjs_auth/session-inventory-wa";

/// Directory holding the transport's persisted login state.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    dir: PathBuf,
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new(DEFAULT_CREDENTIALS_DIR)
    }
}

impl CredentialStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Remove the stored credentials so the next session starts a fresh
    /// pairing.
    ///
    /// Returns whether anything was removed.
    pub async fn purge(&self) -> crate::Result<bool> {
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => {
                info!("Cleared stored session at {}", self.dir.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No stored session at {}", self.dir.display());
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}
