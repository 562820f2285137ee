//! Display state derived from a wedding snapshot.
//!
//! Guests never see who claimed what. The couple sees claimer names only
//! with reveal mode on.

use serde::Serialize;

use crate::{
    db::{Gift, WeddingDetails},
    ledger::OwnershipLedger,
};

const ANONYMOUS_GUEST: &str = "Anonymous Guest";
const HIDDEN_CLAIMER: &str = "guest bringing this";

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum GuestAction {
    Claim,
    /// Claimed from this device; it may release the gift.
    Undo,
    TakenByOther,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GuestGiftView {
    pub id: String,
    pub item_name: String,
    pub description: Option<String>,
    pub guest_submitted: bool,
    pub action: GuestAction,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GuestView {
    pub wedding_id: String,
    pub couple_name: String,
    pub gifts: Vec<GuestGiftView>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CoupleGiftView {
    pub id: String,
    pub item_name: String,
    pub description: Option<String>,
    pub guest_submitted: bool,
    pub claimed: bool,
    /// `None` while available.
    pub claimer: Option<String>,
    /// Only present for claimed gifts in reveal mode.
    pub thank_you_sent: Option<bool>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CoupleView {
    pub wedding_id: String,
    pub couple_name: String,
    pub reveal: bool,
    pub claimed_count: usize,
    pub gifts: Vec<CoupleGiftView>,
}

pub fn guest_view(details: &WeddingDetails, ledger: &OwnershipLedger) -> GuestView {
    let mine = ledger.claims(&details.wedding.id);

    let gifts = details
        .gifts
        .iter()
        .map(|gift| {
            let action = match (gift.claimed, mine.contains(&gift.id)) {
                (false, _) => GuestAction::Claim,
                (true, true) => GuestAction::Undo,
                (true, false) => GuestAction::TakenByOther,
            };
            GuestGiftView {
                id: gift.id.clone(),
                item_name: gift.item_name.clone(),
                description: gift.description.clone(),
                guest_submitted: gift.guest_submitted,
                action,
            }
        })
        .collect();

    GuestView {
        wedding_id: details.wedding.id.clone(),
        couple_name: details.wedding.couple_name.clone(),
        gifts,
    }
}

pub fn couple_view(details: &WeddingDetails, reveal: bool) -> CoupleView {
    let gifts: Vec<CoupleGiftView> = details
        .gifts
        .iter()
        .map(|gift| couple_gift(gift, reveal))
        .collect();

    CoupleView {
        wedding_id: details.wedding.id.clone(),
        couple_name: details.wedding.couple_name.clone(),
        reveal,
        claimed_count: gifts.iter().filter(|gift| gift.claimed).count(),
        gifts,
    }
}

fn couple_gift(gift: &Gift, reveal: bool) -> CoupleGiftView {
    let (claimer, thank_you_sent) = match (gift.claimed, reveal) {
        (false, _) => (None, None),
        (true, true) => (
            Some(
                gift.claimer_name
                    .clone()
                    .unwrap_or_else(|| ANONYMOUS_GUEST.to_string()),
            ),
            Some(gift.thank_you_sent),
        ),
        (true, false) => (Some(HIDDEN_CLAIMER.to_string()), None),
    };

    CoupleGiftView {
        id: gift.id.clone(),
        item_name: gift.item_name.clone(),
        description: gift.description.clone(),
        guest_submitted: gift.guest_submitted,
        claimed: gift.claimed,
        claimer,
        thank_you_sent,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use super::*;
    use crate::{db::Wedding, device::MemoryLocalStore};

    fn gift(id: &str, claimed: bool, claimer: Option<&str>) -> Gift {
        Gift {
            id: id.into(),
            wedding_id: "w1".into(),
            item_name: format!("Item {id}"),
            description: None,
            claimed,
            claimer_name: claimer.map(str::to_string),
            claimer_token: None,
            claimed_at: claimed.then(Utc::now),
            thank_you_sent: claimed,
            guest_submitted: false,
            created_at: Utc::now(),
        }
    }

    fn details() -> WeddingDetails {
        WeddingDetails {
            wedding: Wedding {
                id: "w1".into(),
                couple_name: "A & B".into(),
                created_at: Utc::now(),
            },
            gifts: vec![
                gift("g1", false, None),
                gift("g2", true, Some("Sam")),
                gift("g3", true, None),
            ],
        }
    }

    #[test]
    fn guest_actions_follow_the_ledger() {
        let ledger = OwnershipLedger::new(Arc::new(MemoryLocalStore::new()));
        ledger.record_claim("w1", "g2");

        let view = guest_view(&details(), &ledger);
        let actions: Vec<_> = view.gifts.iter().map(|gift| gift.action).collect();
        assert_eq!(
            actions,
            vec![GuestAction::Claim, GuestAction::Undo, GuestAction::TakenByOther]
        );
    }

    #[test]
    fn guest_view_never_carries_names() {
        let ledger = OwnershipLedger::new(Arc::new(MemoryLocalStore::new()));
        let json = serde_json::to_string(&guest_view(&details(), &ledger)).unwrap();
        assert!(!json.contains("Sam"));
    }

    #[test]
    fn ledger_entry_for_released_gift_offers_claim() {
        let ledger = OwnershipLedger::new(Arc::new(MemoryLocalStore::new()));
        ledger.record_claim("w1", "g1");

        let view = guest_view(&details(), &ledger);
        assert_eq!(view.gifts[0].action, GuestAction::Claim);
    }

    #[test]
    fn reveal_mode_shows_claimers() {
        let view = couple_view(&details(), true);
        assert_eq!(view.claimed_count, 2);
        assert_eq!(view.gifts[0].claimer, None);
        assert_eq!(view.gifts[1].claimer.as_deref(), Some("Sam"));
        assert_eq!(view.gifts[1].thank_you_sent, Some(true));
        assert_eq!(view.gifts[2].claimer.as_deref(), Some(ANONYMOUS_GUEST));
    }

    #[test]
    fn hidden_mode_masks_claimers() {
        let view = couple_view(&details(), false);
        for gift in view.gifts.iter().filter(|gift| gift.claimed) {
            assert_eq!(gift.claimer.as_deref(), Some(HIDDEN_CLAIMER));
            assert_eq!(gift.thank_you_sent, None);
        }
    }
}
