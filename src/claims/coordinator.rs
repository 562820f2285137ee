use chrono::{DateTime, Utc};
use log::info;
use rand::Rng;
use serde::Serialize;

use crate::{
    db::{Database, Gift, GiftInput},
    error::RegistryResult,
};

const TOKEN_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const TOKEN_LEN: usize = 9;

/// Proof of a successful claim handed back to the winning caller.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClaimReceipt {
    pub gift_id: String,
    pub claimer_name: String,
    pub claim_token: String,
    pub claimed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ClaimOutcome {
    Claimed(ClaimReceipt),
    /// Someone else holds the gift. Expected, not an error.
    Rejected,
}

impl ClaimOutcome {
    pub fn is_claimed(&self) -> bool {
        matches!(self, ClaimOutcome::Claimed(_))
    }
}

/// Claim state machine over the registry store: `Available -> Claimed ->
/// Available -> ...`.
///
/// Unclaiming performs no ownership check. Anyone holding the guest link may
/// release any gift; the device ledger only hides the control from guests
/// who did not make the claim.
#[derive(Clone)]
pub struct ClaimCoordinator {
    db: Database,
    anonymous_name: String,
}

impl ClaimCoordinator {
    pub fn new(db: Database, anonymous_name: impl Into<String>) -> Self {
        Self {
            db,
            anonymous_name: anonymous_name.into(),
        }
    }

    pub async fn claim(
        &self,
        wedding_id: &str,
        gift_id: &str,
        guest_name: Option<&str>,
    ) -> RegistryResult<ClaimOutcome> {
        let claimer_name = guest_name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(self.anonymous_name.as_str())
            .to_string();
        let claim_token = new_claim_token();
        let claimed_at = Utc::now();

        let won = self
            .db
            .try_claim_gift(
                wedding_id,
                gift_id,
                claimer_name.clone(),
                claim_token.clone(),
                claimed_at,
            )
            .await?;

        match won {
            Some(_) => {
                info!("Gift {gift_id} claimed ({claim_token})");
                Ok(ClaimOutcome::Claimed(ClaimReceipt {
                    gift_id: gift_id.to_string(),
                    claimer_name,
                    claim_token,
                    claimed_at,
                }))
            }
            None => {
                info!("Claim on gift {gift_id} rejected: already taken");
                Ok(ClaimOutcome::Rejected)
            }
        }
    }

    pub async fn unclaim(&self, wedding_id: &str, gift_id: &str) -> RegistryResult<Gift> {
        let gift = self.db.reset_claim(wedding_id, gift_id).await?;
        info!("Gift {gift_id} released");
        Ok(gift)
    }

    /// Guest-submitted items start out available.
    pub async fn add_guest_gift(
        &self,
        wedding_id: &str,
        name: &str,
        description: Option<String>,
    ) -> RegistryResult<Gift> {
        self.db
            .add_gift(wedding_id, GiftInput::from_guest(name, description))
            .await
    }
}

fn new_claim_token() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..TOKEN_LEN)
        .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
        .collect();
    format!("guest_{suffix}")
}
