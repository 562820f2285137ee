use log::info;

use crate::{
    claims::ClaimOutcome,
    config::GuestGiftPolicy,
    db::Gift,
    error::RegistryResult,
    view::{guest_view, GuestView},
    AppState,
};

pub async fn load_registry(state: &AppState, wedding_id: &str) -> RegistryResult<GuestView> {
    let details = state.db.get_wedding(wedding_id).await?;
    Ok(guest_view(&details, &state.ledger))
}

/// Claim a gift and, only once the store confirms, remember it as ours.
pub async fn claim_gift(
    state: &AppState,
    wedding_id: &str,
    gift_id: &str,
    guest_name: Option<&str>,
) -> RegistryResult<ClaimOutcome> {
    let outcome = state.claims.claim(wedding_id, gift_id, guest_name).await?;
    if outcome.is_claimed() {
        state.ledger.record_claim(wedding_id, gift_id);
    }
    Ok(outcome)
}

pub async fn unclaim_gift(state: &AppState, wedding_id: &str, gift_id: &str) -> RegistryResult<Gift> {
    let gift = state.claims.unclaim(wedding_id, gift_id).await?;
    state.ledger.forget_claim(wedding_id, gift_id);
    Ok(gift)
}

/// Add a bring-your-own item. Under [`GuestGiftPolicy::ClaimBySubmitter`]
/// the new item is claimed for the poster straight away.
pub async fn post_gift(
    state: &AppState,
    wedding_id: &str,
    name: &str,
    description: Option<String>,
    guest_name: Option<&str>,
) -> RegistryResult<Gift> {
    let gift = state
        .claims
        .add_guest_gift(wedding_id, name, description)
        .await?;
    info!("Guest posted gift {} to wedding {wedding_id}", gift.id);

    if state.config.guest_gifts == GuestGiftPolicy::LeaveOpen {
        return Ok(gift);
    }

    // Someone may beat the poster to it; the item is then simply theirs.
    if claim_gift(state, wedding_id, &gift.id, guest_name)
        .await?
        .is_claimed()
    {
        if let Some(current) = state.db.get_gift(wedding_id, &gift.id).await? {
            return Ok(current);
        }
    }
    Ok(gift)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::RegistryConfig,
        db::{Database, GiftInput},
        device::MemoryLocalStore,
        error::RegistryError,
        view::GuestAction,
    };

    async fn setup(policy: GuestGiftPolicy) -> (AppState, String) {
        let db = Database::open_in_memory().unwrap();
        let config = RegistryConfig {
            guest_gifts: policy,
            ..RegistryConfig::default()
        };
        let state = AppState::with_parts(db, Arc::new(MemoryLocalStore::new()), config);
        let wedding = state
            .db
            .create_wedding("A & B".into(), "1234".into())
            .await
            .unwrap();
        (state, wedding.id)
    }

    #[tokio::test]
    async fn claim_then_undo_round_trip() {
        let (state, wedding_id) = setup(GuestGiftPolicy::LeaveOpen).await;
        let gift = state
            .db
            .add_gift(&wedding_id, GiftInput::new("Blender", None))
            .await
            .unwrap();

        let outcome = claim_gift(&state, &wedding_id, &gift.id, Some("Sam"))
            .await
            .unwrap();
        assert!(outcome.is_claimed());
        let view = load_registry(&state, &wedding_id).await.unwrap();
        assert_eq!(view.gifts[0].action, GuestAction::Undo);

        let released = unclaim_gift(&state, &wedding_id, &gift.id).await.unwrap();
        assert!(!released.claimed);
        let view = load_registry(&state, &wedding_id).await.unwrap();
        assert_eq!(view.gifts[0].action, GuestAction::Claim);
    }

    #[tokio::test]
    async fn lost_race_leaves_ledger_untouched() {
        let (state, wedding_id) = setup(GuestGiftPolicy::LeaveOpen).await;
        let gift = state
            .db
            .add_gift(&wedding_id, GiftInput::new("Blender", None))
            .await
            .unwrap();
        state
            .claims
            .claim(&wedding_id, &gift.id, Some("Other device"))
            .await
            .unwrap();

        let outcome = claim_gift(&state, &wedding_id, &gift.id, Some("Sam"))
            .await
            .unwrap();
        assert_eq!(outcome, ClaimOutcome::Rejected);
        assert!(!state.ledger.is_mine(&wedding_id, &gift.id));

        let view = load_registry(&state, &wedding_id).await.unwrap();
        assert_eq!(view.gifts[0].action, GuestAction::TakenByOther);
    }

    #[tokio::test]
    async fn failed_claim_is_not_recorded() {
        let (state, wedding_id) = setup(GuestGiftPolicy::LeaveOpen).await;
        let result = claim_gift(&state, &wedding_id, "missing", Some("Sam")).await;
        assert!(matches!(result, Err(RegistryError::NotFound(_))));
        assert!(state.ledger.claims(&wedding_id).is_empty());
    }

    #[tokio::test]
    async fn posted_gift_stays_open_by_default() {
        let (state, wedding_id) = setup(GuestGiftPolicy::LeaveOpen).await;
        let gift = post_gift(&state, &wedding_id, "Picnic basket", None, Some("Sam"))
            .await
            .unwrap();
        assert!(gift.guest_submitted);
        assert!(!gift.claimed);
        assert!(!state.ledger.is_mine(&wedding_id, &gift.id));
    }

    #[tokio::test]
    async fn posted_gift_can_be_claimed_by_submitter() {
        let (state, wedding_id) = setup(GuestGiftPolicy::ClaimBySubmitter).await;
        let gift = post_gift(&state, &wedding_id, "Picnic basket", None, Some("Sam"))
            .await
            .unwrap();
        assert!(gift.claimed);
        assert_eq!(gift.claimer_name.as_deref(), Some("Sam"));
        assert!(state.ledger.is_mine(&wedding_id, &gift.id));
    }

    #[tokio::test]
    async fn posting_a_listed_name_is_a_duplicate() {
        let (state, wedding_id) = setup(GuestGiftPolicy::LeaveOpen).await;
        state
            .db
            .add_gift(&wedding_id, GiftInput::new("Blender", None))
            .await
            .unwrap();

        let result = post_gift(&state, &wedding_id, "blender", None, None).await;
        assert!(matches!(result, Err(RegistryError::DuplicateItem { .. })));
    }
}
