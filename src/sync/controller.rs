use std::time::Duration;

use anyhow::{bail, Context, Result};
use log::info;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::db::{Database, WeddingDetails};

use super::{loop_worker::sync_loop, SyncMode};

/// Owns at most one background sync loop for one viewer.
///
/// Dropping the controller cancels the loop, so a torn-down viewer leaves no
/// listener behind.
pub struct SyncController {
    fetch_timeout: Duration,
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl SyncController {
    pub fn new(fetch_timeout: Duration) -> Self {
        Self {
            fetch_timeout,
            handle: None,
            cancel_token: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Start following a wedding. The receiver holds `None` until the first
    /// fetch lands (or if the wedding disappears), then the latest snapshot.
    pub fn subscribe(
        &mut self,
        db: Database,
        wedding_id: String,
        mode: SyncMode,
    ) -> Result<watch::Receiver<Option<WeddingDetails>>> {
        if self.handle.is_some() {
            bail!("sync already active");
        }

        info!("Following wedding {wedding_id} ({mode:?})");

        let cancel_token = CancellationToken::new();
        let (snapshot_tx, snapshot_rx) = watch::channel(None);

        let handle = tokio::spawn(sync_loop(
            db,
            wedding_id,
            mode,
            self.fetch_timeout,
            snapshot_tx,
            cancel_token.clone(),
        ));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(snapshot_rx)
    }

    pub async fn unsubscribe(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("sync loop task failed to join")
                .map(|_| ())
        } else {
            Ok(())
        }
    }
}

impl Drop for SyncController {
    fn drop(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::GiftInput;

    const WAIT: Duration = Duration::from_secs(5);

    async fn setup() -> (Database, String) {
        let db = Database::open_in_memory().unwrap();
        let wedding = db.create_wedding("A & B".into(), "1234".into()).await.unwrap();
        (db, wedding.id)
    }

    async fn next_snapshot(
        rx: &mut watch::Receiver<Option<WeddingDetails>>,
    ) -> Option<WeddingDetails> {
        tokio::time::timeout(WAIT, rx.changed())
            .await
            .expect("no snapshot within timeout")
            .expect("sync loop stopped");
        rx.borrow_and_update().clone()
    }

    async fn wait_for<F>(rx: &mut watch::Receiver<Option<WeddingDetails>>, predicate: F) -> WeddingDetails
    where
        F: Fn(&WeddingDetails) -> bool,
    {
        loop {
            if let Some(details) = rx.borrow_and_update().clone() {
                if predicate(&details) {
                    return details;
                }
            }
            tokio::time::timeout(WAIT, rx.changed())
                .await
                .expect("condition not reached within timeout")
                .expect("sync loop stopped");
        }
    }

    #[tokio::test]
    async fn notify_mode_follows_gift_changes() {
        let (db, wedding_id) = setup().await;
        let mut sync = SyncController::new(WAIT);
        let mut rx = sync
            .subscribe(db.clone(), wedding_id.clone(), SyncMode::Notify)
            .unwrap();

        let initial = next_snapshot(&mut rx).await.expect("wedding exists");
        assert!(initial.gifts.is_empty());

        let gift = db
            .add_gift(&wedding_id, GiftInput::new("Blender", None))
            .await
            .unwrap();
        let details = wait_for(&mut rx, |d| d.gifts.len() == 1).await;
        assert_eq!(details.gifts[0].id, gift.id);

        db.try_claim_gift(&wedding_id, &gift.id, "Sam".into(), "t".into(), chrono::Utc::now())
            .await
            .unwrap();
        wait_for(&mut rx, |d| d.gifts[0].claimed).await;

        sync.unsubscribe().await.unwrap();
        assert!(!sync.is_active());
    }

    #[tokio::test]
    async fn notify_mode_ignores_other_weddings() {
        let (db, wedding_id) = setup().await;
        let other = db.create_wedding("C & D".into(), "9999".into()).await.unwrap();

        let mut sync = SyncController::new(WAIT);
        let mut rx = sync
            .subscribe(db.clone(), wedding_id.clone(), SyncMode::Notify)
            .unwrap();
        next_snapshot(&mut rx).await;

        db.add_gift(&other.id, GiftInput::new("Blender", None))
            .await
            .unwrap();
        let outcome = tokio::time::timeout(Duration::from_millis(200), rx.changed()).await;
        assert!(outcome.is_err(), "unrelated wedding must not publish");

        sync.unsubscribe().await.unwrap();
    }

    #[tokio::test]
    async fn poll_mode_picks_up_changes() {
        let (db, wedding_id) = setup().await;
        let mut sync = SyncController::new(WAIT);
        let mut rx = sync
            .subscribe(
                db.clone(),
                wedding_id.clone(),
                SyncMode::Poll {
                    interval: Duration::from_millis(20),
                },
            )
            .unwrap();
        next_snapshot(&mut rx).await;

        db.add_gift(&wedding_id, GiftInput::new("Kettle", None))
            .await
            .unwrap();
        let details = wait_for(&mut rx, |d| !d.gifts.is_empty()).await;
        assert_eq!(details.gifts[0].item_name, "Kettle");

        sync.unsubscribe().await.unwrap();
    }

    #[tokio::test]
    async fn missing_wedding_yields_none() {
        let db = Database::open_in_memory().unwrap();
        let mut sync = SyncController::new(WAIT);
        let rx = sync
            .subscribe(
                db,
                "missing".into(),
                SyncMode::Poll {
                    interval: Duration::from_millis(20),
                },
            )
            .unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(rx.borrow().is_none());
        sync.unsubscribe().await.unwrap();
    }

    #[tokio::test]
    async fn double_subscribe_is_refused() {
        let (db, wedding_id) = setup().await;
        let mut sync = SyncController::new(WAIT);
        let _rx = sync
            .subscribe(db.clone(), wedding_id.clone(), SyncMode::Notify)
            .unwrap();
        assert!(sync.subscribe(db, wedding_id, SyncMode::Notify).is_err());
        sync.unsubscribe().await.unwrap();
    }

    #[tokio::test]
    async fn dropping_the_receiver_ends_the_loop() {
        let (db, wedding_id) = setup().await;
        let mut sync = SyncController::new(WAIT);
        let rx = sync
            .subscribe(db.clone(), wedding_id.clone(), SyncMode::Notify)
            .unwrap();
        drop(rx);

        db.add_gift(&wedding_id, GiftInput::new("Blender", None))
            .await
            .unwrap();
        tokio::time::timeout(WAIT, async {
            while sync.is_active() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("loop should exit once nobody watches");
    }
}
