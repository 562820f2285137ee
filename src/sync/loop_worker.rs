use tokio::sync::{
    broadcast::{
        self,
        error::{RecvError, TryRecvError},
    },
    watch,
};
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    db::{Database, GiftChange, WeddingDetails},
    error::RegistryError,
};

use super::SyncMode;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

pub async fn sync_loop(
    db: Database,
    wedding_id: String,
    mode: SyncMode,
    fetch_timeout: Duration,
    snapshot_tx: watch::Sender<Option<WeddingDetails>>,
    cancel_token: CancellationToken,
) {
    // Subscribe before the first fetch so no change slips between the two.
    let changes = match mode {
        SyncMode::Notify => Some(db.subscribe_changes()),
        SyncMode::Poll { .. } => None,
    };

    if !refresh(&db, &wedding_id, fetch_timeout, &snapshot_tx).await {
        return;
    }

    match (mode, changes) {
        (SyncMode::Poll { interval }, _) => {
            poll(&db, &wedding_id, interval, fetch_timeout, &snapshot_tx, &cancel_token).await
        }
        (SyncMode::Notify, Some(changes)) => {
            listen(&db, &wedding_id, changes, fetch_timeout, &snapshot_tx, &cancel_token).await
        }
        (SyncMode::Notify, None) => {}
    }

    log_info!("sync loop for wedding {} shutting down", wedding_id);
}

async fn poll(
    db: &Database,
    wedding_id: &str,
    interval: Duration,
    fetch_timeout: Duration,
    snapshot_tx: &watch::Sender<Option<WeddingDetails>>,
    cancel_token: &CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately and the initial fetch already ran.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            _ = ticker.tick() => {
                if !refresh(db, wedding_id, fetch_timeout, snapshot_tx).await {
                    break;
                }
            }
        }
    }
}

async fn listen(
    db: &Database,
    wedding_id: &str,
    mut changes: broadcast::Receiver<GiftChange>,
    fetch_timeout: Duration,
    snapshot_tx: &watch::Sender<Option<WeddingDetails>>,
    cancel_token: &CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel_token.cancelled() => break,
            event = changes.recv() => event,
        };

        match event {
            Ok(change) if change.wedding_id == wedding_id => {
                log_debug!("{:?} on gift {} triggers refresh", change.kind, change.gift_id);
            }
            Ok(_) => continue,
            Err(RecvError::Lagged(skipped)) => {
                log_warn!("sync listener lagged by {} changes; refreshing", skipped);
            }
            Err(RecvError::Closed) => break,
        }

        // One fetch covers a burst of queued changes.
        loop {
            match changes.try_recv() {
                Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }

        if !refresh(db, wedding_id, fetch_timeout, snapshot_tx).await {
            break;
        }
    }
}

/// Fetch the wedding and publish it if it differs from the last snapshot.
/// Returns `false` once nobody is watching any more.
async fn refresh(
    db: &Database,
    wedding_id: &str,
    fetch_timeout: Duration,
    snapshot_tx: &watch::Sender<Option<WeddingDetails>>,
) -> bool {
    match tokio::time::timeout(fetch_timeout, db.get_wedding(wedding_id)).await {
        Ok(Ok(details)) => {
            snapshot_tx.send_if_modified(|current| {
                if current.as_ref() == Some(&details) {
                    false
                } else {
                    *current = Some(details);
                    true
                }
            });
        }
        Ok(Err(RegistryError::NotFound(_))) => {
            log_warn!("wedding {} no longer exists", wedding_id);
            snapshot_tx.send_if_modified(|current| current.take().is_some());
        }
        Ok(Err(err)) => log_error!("refresh of wedding {} failed: {err}", wedding_id),
        Err(_) => log_warn!(
            "refresh of wedding {} timed out (> {}ms)",
            wedding_id,
            fetch_timeout.as_millis()
        ),
    }

    !snapshot_tx.is_closed()
}
