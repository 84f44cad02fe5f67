//! Cancellation manager (C8)
//!
//! A process-wide registry mapping `syncId -> CancellationToken`. Engines
//! receive a token by `syncId` and check it cooperatively at page/record
//! boundaries; cancelling is idempotent.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub struct CancellationManager {
    tokens: Mutex<HashMap<String, CancellationToken>>,
}

impl CancellationManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a new run, returning the token engines should watch.
    pub async fn register(&self, sync_id: &str) -> CancellationToken {
        let token = CancellationToken::new();
        self.tokens.lock().await.insert(sync_id.to_string(), token.clone());
        token
    }

    /// Cancel a run by `syncId`. A no-op if the run is unknown or already
    /// cancelled.
    pub async fn cancel(&self, sync_id: &str) -> bool {
        match self.tokens.lock().await.get(sync_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Drop a run's token once it has finished, successfully or not.
    pub async fn unregister(&self, sync_id: &str) {
        self.tokens.lock().await.remove(sync_id);
    }

    pub async fn is_cancelled(&self, sync_id: &str) -> bool {
        self.tokens
            .lock()
            .await
            .get(sync_id)
            .map(|t| t.is_cancelled())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_is_idempotent_and_observed_through_token() {
        let manager = CancellationManager::new();
        let token = manager.register("sync-1").await;
        assert!(!token.is_cancelled());

        assert!(manager.cancel("sync-1").await);
        assert!(manager.cancel("sync-1").await);
        assert!(token.is_cancelled());
        assert!(manager.is_cancelled("sync-1").await);
    }

    #[tokio::test]
    async fn cancel_unknown_run_is_a_no_op() {
        let manager = CancellationManager::new();
        assert!(!manager.cancel("missing").await);
    }

    #[tokio::test]
    async fn unregister_clears_state() {
        let manager = CancellationManager::new();
        manager.register("sync-1").await;
        manager.unregister("sync-1").await;
        assert!(!manager.is_cancelled("sync-1").await);
    }
}
