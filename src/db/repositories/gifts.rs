use chrono::{DateTime, Utc};
use log::{info, warn};
use rusqlite::{ffi, params, Connection, OptionalExtension, Row, TransactionBehavior};
use uuid::Uuid;

use crate::{
    db::{
        connection::Database,
        helpers::{format_datetime, name_key, parse_datetime, parse_optional_datetime},
        models::{ChangeKind, Gift, GiftChange, GiftInput},
    },
    error::{RegistryError, RegistryResult},
};

const GIFT_COLUMNS: &str = "id, wedding_id, item_name, description, claimed, claimer_name,
     claimer_token, claimed_at, thank_you_sent, guest_submitted, created_at";

fn row_to_gift(row: &Row) -> anyhow::Result<Gift> {
    let created_at: String = row.get("created_at")?;
    let claimed_at: Option<String> = row.get("claimed_at")?;

    Ok(Gift {
        id: row.get("id")?,
        wedding_id: row.get("wedding_id")?,
        item_name: row.get("item_name")?,
        description: row.get("description")?,
        claimed: row.get("claimed")?,
        claimer_name: row.get("claimer_name")?,
        claimer_token: row.get("claimer_token")?,
        claimed_at: parse_optional_datetime(claimed_at, "claimed_at")?,
        thank_you_sent: row.get("thank_you_sent")?,
        guest_submitted: row.get("guest_submitted")?,
        created_at: parse_datetime(&created_at, "created_at")?,
    })
}

pub(crate) fn load_gifts(conn: &Connection, wedding_id: &str) -> anyhow::Result<Vec<Gift>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {GIFT_COLUMNS}
         FROM gifts
         WHERE wedding_id = ?1
         ORDER BY created_at ASC, rowid ASC"
    ))?;

    let mut rows = stmt.query(params![wedding_id])?;
    let mut gifts = Vec::new();
    while let Some(row) = rows.next()? {
        gifts.push(row_to_gift(row)?);
    }

    Ok(gifts)
}

fn load_gift(conn: &Connection, wedding_id: &str, gift_id: &str) -> anyhow::Result<Option<Gift>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {GIFT_COLUMNS}
         FROM gifts
         WHERE id = ?1 AND wedding_id = ?2"
    ))?;

    let mut rows = stmt.query(params![gift_id, wedding_id])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_gift(row)?)),
        None => Ok(None),
    }
}

fn wedding_exists(conn: &Connection, wedding_id: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM weddings WHERE id = ?1)",
        params![wedding_id],
        |row| row.get(0),
    )
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

impl Database {
    /// Insert a gift unless the wedding already lists one with the same
    /// case-insensitive name.
    ///
    /// The lookup before the insert only saves a round of constraint
    /// handling; the unique index on `(wedding_id, name_key)` is what stops
    /// two identical concurrent submissions.
    pub async fn add_gift(&self, wedding_id: &str, input: GiftInput) -> RegistryResult<Gift> {
        let item_name = input.name.trim().to_string();
        if item_name.is_empty() {
            return Err(RegistryError::InvalidInput("gift name must not be empty".into()));
        }
        let description = input
            .description
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());

        let gift = Gift {
            id: Uuid::new_v4().to_string(),
            wedding_id: wedding_id.to_string(),
            item_name,
            description,
            claimed: false,
            claimer_name: None,
            claimer_token: None,
            claimed_at: None,
            thank_you_sent: false,
            guest_submitted: input.guest_submitted,
            created_at: Utc::now(),
        };
        let record = gift.clone();

        self.execute(move |conn| {
            if !wedding_exists(conn, &record.wedding_id)? {
                return Err(RegistryError::not_found(format!(
                    "wedding {}",
                    record.wedding_id
                )));
            }

            let key = name_key(&record.item_name);
            let already_listed: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM gifts WHERE wedding_id = ?1 AND name_key = ?2)",
                params![record.wedding_id, key],
                |row| row.get(0),
            )?;
            if already_listed {
                return Err(RegistryError::DuplicateItem {
                    name: record.item_name,
                });
            }

            let result = conn.execute(
                "INSERT INTO gifts (id, wedding_id, item_name, name_key, description, guest_submitted, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.id,
                    record.wedding_id,
                    record.item_name,
                    key,
                    record.description,
                    record.guest_submitted,
                    format_datetime(&record.created_at),
                ],
            );
            match result {
                Ok(_) => Ok(()),
                Err(err) if is_unique_violation(&err) => Err(RegistryError::DuplicateItem {
                    name: record.item_name,
                }),
                Err(err) => Err(err.into()),
            }
        })
        .await
        .map_err(|err| {
            if let RegistryError::DuplicateItem { name } = &err {
                warn!("Rejected duplicate gift \"{name}\" for wedding {wedding_id}");
            }
            err
        })?;

        self.publish_change(GiftChange::new(&gift.wedding_id, &gift.id, ChangeKind::Insert));
        Ok(gift)
    }

    pub async fn get_gift(&self, wedding_id: &str, gift_id: &str) -> RegistryResult<Option<Gift>> {
        let wedding_id = wedding_id.to_string();
        let gift_id = gift_id.to_string();
        self.execute(move |conn| Ok(load_gift(conn, &wedding_id, &gift_id)?))
            .await
    }

    /// Compare-and-set `claimed: false -> true` evaluated by SQLite itself.
    ///
    /// Returns the claimed gift when this call won, `None` when the gift was
    /// already taken. Concurrent callers (including other processes on the
    /// same file) can never both observe it as free.
    pub async fn try_claim_gift(
        &self,
        wedding_id: &str,
        gift_id: &str,
        claimer_name: String,
        claimer_token: String,
        claimed_at: DateTime<Utc>,
    ) -> RegistryResult<Option<Gift>> {
        let wedding_id = wedding_id.to_string();
        let gift_id = gift_id.to_string();
        let outcome = self
            .execute(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let rows_affected = tx.execute(
                    "UPDATE gifts
                     SET claimed = 1,
                         claimer_name = ?1,
                         claimer_token = ?2,
                         claimed_at = ?3,
                         thank_you_sent = 0
                     WHERE id = ?4 AND wedding_id = ?5 AND claimed = 0",
                    params![
                        claimer_name,
                        claimer_token,
                        format_datetime(&claimed_at),
                        gift_id,
                        wedding_id,
                    ],
                )?;

                let gift = load_gift(&tx, &wedding_id, &gift_id)?
                    .ok_or_else(|| RegistryError::not_found(format!("gift {gift_id}")))?;
                tx.commit()?;

                Ok((rows_affected == 1).then_some(gift))
            })
            .await?;

        if let Some(gift) = &outcome {
            self.publish_change(GiftChange::new(&gift.wedding_id, &gift.id, ChangeKind::Update));
        }
        Ok(outcome)
    }

    /// Unconditionally return a gift to the available state.
    pub async fn reset_claim(&self, wedding_id: &str, gift_id: &str) -> RegistryResult<Gift> {
        let wedding_id = wedding_id.to_string();
        let gift_id = gift_id.to_string();
        let gift = self
            .execute(move |conn| {
                let rows_affected = conn.execute(
                    "UPDATE gifts
                     SET claimed = 0,
                         claimer_name = NULL,
                         claimer_token = NULL,
                         claimed_at = NULL,
                         thank_you_sent = 0
                     WHERE id = ?1 AND wedding_id = ?2",
                    params![gift_id, wedding_id],
                )?;
                if rows_affected == 0 {
                    return Err(RegistryError::not_found(format!("gift {gift_id}")));
                }

                load_gift(conn, &wedding_id, &gift_id)?
                    .ok_or_else(|| RegistryError::not_found(format!("gift {gift_id}")))
            })
            .await?;

        self.publish_change(GiftChange::new(&gift.wedding_id, &gift.id, ChangeKind::Update));
        Ok(gift)
    }

    /// Toggle the thank-you flag of a claimed gift. Returns `false` when the
    /// gift is gone or not claimed; nothing is written in that case.
    pub async fn set_thank_you(&self, gift_id: &str, value: bool) -> RegistryResult<bool> {
        let gift_id = gift_id.to_string();
        let changed_id = gift_id.clone();
        let wedding_id = self
            .execute(move |conn| {
                let wedding_id: Option<String> = conn
                    .query_row(
                        "UPDATE gifts
                         SET thank_you_sent = ?1
                         WHERE id = ?2 AND claimed = 1
                         RETURNING wedding_id",
                        params![value, gift_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(wedding_id)
            })
            .await?;

        match wedding_id {
            Some(wedding_id) => {
                self.publish_change(GiftChange::new(wedding_id, changed_id, ChangeKind::Update));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Delete a wish-list line. Returns `false` if it was already gone.
    pub async fn remove_gift(&self, wedding_id: &str, gift_id: &str) -> RegistryResult<bool> {
        let owned_wedding_id = wedding_id.to_string();
        let owned_gift_id = gift_id.to_string();
        let removed = self
            .execute(move |conn| {
                let rows_affected = conn.execute(
                    "DELETE FROM gifts WHERE id = ?1 AND wedding_id = ?2",
                    params![owned_gift_id, owned_wedding_id],
                )?;
                Ok(rows_affected > 0)
            })
            .await?;

        if removed {
            info!("Removed gift {gift_id} from wedding {wedding_id}");
            self.publish_change(GiftChange::new(wedding_id, gift_id, ChangeKind::Delete));
        }
        Ok(removed)
    }
}
