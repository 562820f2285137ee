//! Which claims this device made.
//!
//! Guests have no accounts, so the only notion of "mine" is this local
//! record. It decides whether a device is offered the undo control. It is
//! never consulted for whether a gift is taken; the store's `claimed` flag
//! is the source of truth for that.

use std::{
    collections::BTreeSet,
    sync::{Arc, Mutex},
};

use log::warn;

use crate::device::LocalStore;

const CLAIMS_KEY: &str = "claims";

#[derive(Clone)]
pub struct OwnershipLedger {
    store: Arc<dyn LocalStore>,
    // Serialises read-modify-write cycles on the stored set.
    write_lock: Arc<Mutex<()>>,
}

impl OwnershipLedger {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self {
            store,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Gift ids this device claimed for the wedding. Missing or malformed
    /// state reads as an empty set.
    pub fn claims(&self, wedding_id: &str) -> BTreeSet<String> {
        let Some(raw) = self.store.get(wedding_id, CLAIMS_KEY) else {
            return BTreeSet::new();
        };
        serde_json::from_str(&raw).unwrap_or_else(|err| {
            warn!("Discarding malformed claim ledger for wedding {wedding_id}: {err}");
            BTreeSet::new()
        })
    }

    pub fn is_mine(&self, wedding_id: &str, gift_id: &str) -> bool {
        self.claims(wedding_id).contains(gift_id)
    }

    pub fn record_claim(&self, wedding_id: &str, gift_id: &str) {
        self.update(wedding_id, |claims| claims.insert(gift_id.to_string()));
    }

    pub fn forget_claim(&self, wedding_id: &str, gift_id: &str) {
        self.update(wedding_id, |claims| claims.remove(gift_id));
    }

    fn update<F>(&self, wedding_id: &str, change: F)
    where
        F: FnOnce(&mut BTreeSet<String>) -> bool,
    {
        let _guard = match self.write_lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut claims = self.claims(wedding_id);
        if !change(&mut claims) {
            return;
        }

        let result = serde_json::to_string(&claims)
            .map_err(anyhow::Error::from)
            .and_then(|serialized| self.store.set(wedding_id, CLAIMS_KEY, &serialized));
        if let Err(err) = result {
            warn!("Failed to persist claim ledger for wedding {wedding_id}: {err:#}");
        }
    }
}
