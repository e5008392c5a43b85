use std::sync::Arc;

use chrono::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use super::persist::{NoPersistence, TokenPersistence};
use super::types::{TokenPair, TokenStatus};

/// The single token slot for the connected CRM account.
///
/// The in-memory copy is authoritative. Persistence is best effort: failures
/// are logged and never undo an in-memory change.
pub struct TokenStore {
    slot: RwLock<Option<TokenPair>>,
    persistence: Arc<dyn TokenPersistence>,
    // Serializes writers so the durable copy is written in the same order as memory.
    write_gate: Mutex<()>,
}

impl TokenStore {
    pub fn new(persistence: Arc<dyn TokenPersistence>) -> Self {
        Self {
            slot: RwLock::new(None),
            persistence,
            write_gate: Mutex::new(()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(NoPersistence))
    }

    pub async fn get(&self) -> Option<TokenPair> {
        self.slot.read().await.clone()
    }

    /// Replace the held token and persist it.
    pub async fn set(&self, pair: TokenPair) {
        let _gate = self.write_gate.lock().await;
        *self.slot.write().await = Some(pair.clone());

        if let Err(e) = self.persistence.save(&pair).await {
            warn!("Token kept in memory only: {e}");
        }
    }

    /// Swap in `next` only if the slot still holds `previous`.
    ///
    /// Returns what the slot holds afterwards. A refresh that races a logout or
    /// a new authorization must not resurrect or clobber that newer state.
    pub async fn replace(&self, previous: &TokenPair, next: TokenPair) -> Option<TokenPair> {
        let _gate = self.write_gate.lock().await;
        {
            let mut slot = self.slot.write().await;
            if slot.as_ref() != Some(previous) {
                return slot.clone();
            }
            *slot = Some(next.clone());
        }

        if let Err(e) = self.persistence.save(&next).await {
            warn!("Token kept in memory only: {e}");
        }
        Some(next)
    }

    /// Drop the held token and its durable copy.
    pub async fn clear(&self) {
        let _gate = self.write_gate.lock().await;
        *self.slot.write().await = None;

        if let Err(e) = self.persistence.delete().await {
            warn!("Failed to remove persisted token: {e}");
        }
    }

    /// Restore a previously persisted token. Called once at startup.
    pub async fn load(&self) -> Option<TokenPair> {
        let _gate = self.write_gate.lock().await;
        match self.persistence.load().await {
            Ok(Some(pair)) => {
                info!(
                    "Restored token from {} (expires {})",
                    self.persistence.describe(),
                    pair.expires_at
                );
                *self.slot.write().await = Some(pair.clone());
                Some(pair)
            }
            Ok(None) => {
                info!("No persisted token at {}", self.persistence.describe());
                None
            }
            Err(e) => {
                warn!("Ignoring persisted token: {e}");
                None
            }
        }
    }

    pub async fn status(&self, margin: Duration) -> TokenStatus {
        TokenStatus::of(self.slot.read().await.as_ref(), margin)
    }
}
