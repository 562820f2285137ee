//! PIN gate in front of the couple dashboard.
//!
//! A verified PIN is remembered on the device, scoped per wedding, so later
//! visits skip the prompt. Failures never say whether the wedding exists.

use std::sync::Arc;

use log::{info, warn};

use crate::{
    db::Database,
    device::LocalStore,
    error::{RegistryError, RegistryResult},
};

const PIN_KEY: &str = "pin";

#[derive(Clone)]
pub struct AccessGuard {
    db: Database,
    store: Arc<dyn LocalStore>,
}

impl AccessGuard {
    pub fn new(db: Database, store: Arc<dyn LocalStore>) -> Self {
        Self { db, store }
    }

    /// Verify a PIN attempt and remember it on success.
    pub async fn authenticate(&self, wedding_id: &str, pin_attempt: &str) -> RegistryResult<bool> {
        if !self.db.verify_credential(wedding_id, pin_attempt).await? {
            warn!("Dashboard PIN rejected for wedding {wedding_id}");
            return Ok(false);
        }

        self.remember(wedding_id, pin_attempt);
        info!("Dashboard unlocked for wedding {wedding_id}");
        Ok(true)
    }

    /// Re-check a remembered PIN. A stale one (rotated elsewhere) is dropped.
    pub async fn resume(&self, wedding_id: &str) -> RegistryResult<bool> {
        let Some(pin) = self.store.get(wedding_id, PIN_KEY) else {
            return Ok(false);
        };

        if self.db.verify_credential(wedding_id, &pin).await? {
            return Ok(true);
        }

        self.forget(wedding_id);
        Ok(false)
    }

    pub async fn ensure_unlocked(&self, wedding_id: &str) -> RegistryResult<()> {
        if self.resume(wedding_id).await? {
            Ok(())
        } else {
            Err(RegistryError::Unauthorized)
        }
    }

    pub fn remember(&self, wedding_id: &str, pin: &str) {
        if let Err(err) = self.store.set(wedding_id, PIN_KEY, pin) {
            warn!("Failed to remember dashboard PIN for wedding {wedding_id}: {err:#}");
        }
    }

    pub fn forget(&self, wedding_id: &str) {
        if let Err(err) = self.store.remove(wedding_id, PIN_KEY) {
            warn!("Failed to forget dashboard PIN for wedding {wedding_id}: {err:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemoryLocalStore;

    async fn setup() -> (AccessGuard, Database, String) {
        let db = Database::open_in_memory().unwrap();
        let wedding = db.create_wedding("A & B".into(), "1234".into()).await.unwrap();
        let guard = AccessGuard::new(db.clone(), Arc::new(MemoryLocalStore::new()));
        (guard, db, wedding.id)
    }

    #[tokio::test]
    async fn wrong_pin_is_not_remembered() {
        let (guard, _db, wedding_id) = setup().await;

        assert!(!guard.authenticate(&wedding_id, "0000").await.unwrap());
        assert!(!guard.resume(&wedding_id).await.unwrap());
        assert!(matches!(
            guard.ensure_unlocked(&wedding_id).await,
            Err(RegistryError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn correct_pin_skips_the_next_prompt() {
        let (guard, _db, wedding_id) = setup().await;

        assert!(guard.authenticate(&wedding_id, "1234").await.unwrap());
        assert!(guard.resume(&wedding_id).await.unwrap());
        guard.ensure_unlocked(&wedding_id).await.unwrap();
    }

    #[tokio::test]
    async fn unknown_wedding_looks_like_wrong_pin() {
        let (guard, _db, _wedding_id) = setup().await;
        assert!(!guard.authenticate("missing", "1234").await.unwrap());
    }

    #[tokio::test]
    async fn rotated_pin_invalidates_remembered_one() {
        let (guard, db, wedding_id) = setup().await;
        assert!(guard.authenticate(&wedding_id, "1234").await.unwrap());

        assert!(db
            .rotate_credential(&wedding_id, "1234", "5678".into())
            .await
            .unwrap());

        assert!(!guard.resume(&wedding_id).await.unwrap());
        assert!(guard.authenticate(&wedding_id, "5678").await.unwrap());
    }
}
