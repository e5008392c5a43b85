//! Persistence port for the token slot.
//!
//! The broker is fully functional without persistence; these backends only
//! let a restarted process pick up where it left off.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::types::TokenPair;
use crate::error::BrokerError;

/// Durable storage for the single token pair.
#[async_trait]
pub trait TokenPersistence: Send + Sync {
    /// Read the stored pair. `Ok(None)` means nothing has been stored.
    async fn load(&self) -> Result<Option<TokenPair>, BrokerError>;

    async fn save(&self, pair: &TokenPair) -> Result<(), BrokerError>;

    /// Remove the stored pair. Removing an absent pair succeeds.
    async fn delete(&self) -> Result<(), BrokerError>;

    /// Short description for log lines.
    fn describe(&self) -> String;
}

/// Keeps nothing. Used when the filesystem is read-only or ephemeral.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPersistence;

#[async_trait]
impl TokenPersistence for NoPersistence {
    async fn load(&self) -> Result<Option<TokenPair>, BrokerError> {
        Ok(None)
    }

    async fn save(&self, _pair: &TokenPair) -> Result<(), BrokerError> {
        Ok(())
    }

    async fn delete(&self) -> Result<(), BrokerError> {
        Ok(())
    }

    fn describe(&self) -> String {
        "memory only".into()
    }
}

/// JSON file holding one token pair, written with 0600 permissions.
#[derive(Debug, Clone)]
pub struct FilePersistence {
    path: PathBuf,
}

impl FilePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "tokens.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn unavailable(action: &str, path: &Path, e: impl std::fmt::Display) -> BrokerError {
    BrokerError::PersistenceUnavailable(format!("{action} {}: {e}", path.display()))
}

#[async_trait]
impl TokenPersistence for FilePersistence {
    async fn load(&self) -> Result<Option<TokenPair>, BrokerError> {
        let data = match tokio::fs::read_to_string(&self.path).await {
            Ok(d) => d,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(unavailable("read", &self.path, e)),
        };

        serde_json::from_str(&data)
            .map(Some)
            .map_err(|e| unavailable("parse", &self.path, e))
    }

    async fn save(&self, pair: &TokenPair) -> Result<(), BrokerError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| unavailable("create directory for", &self.path, e))?;
        }

        let data = serde_json::to_string_pretty(pair)
            .map_err(|e| unavailable("serialize", &self.path, e))?;

        // Write beside the target and rename so a crash never leaves half a file.
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, data)
            .await
            .map_err(|e| unavailable("write", &tmp, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(|e| unavailable("set permissions on", &tmp, e))?;
        }

        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| unavailable("replace", &self.path, e))
    }

    async fn delete(&self) -> Result<(), BrokerError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(unavailable("remove", &self.path, e)),
        }
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
