use log::info;

use crate::{
    db::{Gift, GiftInput, Wedding},
    error::{RegistryError, RegistryResult},
    view::{couple_view, CoupleView},
    AppState,
};

/// Register a wedding and unlock its dashboard on this device.
pub async fn create_wedding(state: &AppState, couple_name: &str, pin: &str) -> RegistryResult<Wedding> {
    let wedding = state
        .db
        .create_wedding(couple_name.to_string(), pin.to_string())
        .await?;
    state.access.remember(&wedding.id, pin);
    Ok(wedding)
}

pub async fn unlock_dashboard(state: &AppState, wedding_id: &str, pin: &str) -> RegistryResult<bool> {
    state.access.authenticate(wedding_id, pin).await
}

pub async fn load_dashboard(state: &AppState, wedding_id: &str, reveal: bool) -> RegistryResult<CoupleView> {
    state.access.ensure_unlocked(wedding_id).await?;
    let details = state.db.get_wedding(wedding_id).await?;
    Ok(couple_view(&details, reveal))
}

pub async fn add_wish(
    state: &AppState,
    wedding_id: &str,
    name: &str,
    description: Option<String>,
) -> RegistryResult<Gift> {
    state.access.ensure_unlocked(wedding_id).await?;
    state
        .db
        .add_gift(wedding_id, GiftInput::new(name, description))
        .await
}

/// Returns `false` when the gift is gone, belongs to another wedding, or is
/// not claimed.
pub async fn set_thank_you(
    state: &AppState,
    wedding_id: &str,
    gift_id: &str,
    value: bool,
) -> RegistryResult<bool> {
    state.access.ensure_unlocked(wedding_id).await?;
    if state.db.get_gift(wedding_id, gift_id).await?.is_none() {
        return Ok(false);
    }
    state.db.set_thank_you(gift_id, value).await
}

pub async fn remove_gift(state: &AppState, wedding_id: &str, gift_id: &str) -> RegistryResult<bool> {
    state.access.ensure_unlocked(wedding_id).await?;
    state.db.remove_gift(wedding_id, gift_id).await
}

pub async fn rotate_pin(
    state: &AppState,
    wedding_id: &str,
    current_pin: &str,
    new_pin: &str,
) -> RegistryResult<()> {
    state.access.ensure_unlocked(wedding_id).await?;
    if !state
        .db
        .rotate_credential(wedding_id, current_pin, new_pin.to_string())
        .await?
    {
        return Err(RegistryError::Unauthorized);
    }

    state.access.remember(wedding_id, new_pin);
    info!("Dashboard PIN rotated for wedding {wedding_id}");
    Ok(())
}

pub fn lock_dashboard(state: &AppState, wedding_id: &str) {
    state.access.forget(wedding_id);
}
