use chrono::Utc;
use log::{info, warn};
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use crate::{
    db::{
        connection::Database,
        helpers::{constant_time_eq, format_datetime, hash_pin, parse_datetime},
        models::{Wedding, WeddingDetails},
        repositories::gifts::load_gifts,
    },
    error::{RegistryError, RegistryResult},
};

fn row_to_wedding(row: &Row) -> anyhow::Result<Wedding> {
    let created_at: String = row.get("created_at")?;

    Ok(Wedding {
        id: row.get("id")?,
        couple_name: row.get("couple_name")?,
        created_at: parse_datetime(&created_at, "created_at")?,
    })
}

fn require_pin(pin: &str) -> RegistryResult<()> {
    if pin.trim().is_empty() {
        return Err(RegistryError::InvalidInput("PIN must not be empty".into()));
    }
    Ok(())
}

impl Database {
    /// Register a new wedding. The PIN is stored only as a salted digest.
    pub async fn create_wedding(&self, couple_name: String, pin: String) -> RegistryResult<Wedding> {
        let couple_name = couple_name.trim().to_string();
        if couple_name.is_empty() {
            return Err(RegistryError::InvalidInput(
                "couple name must not be empty".into(),
            ));
        }
        require_pin(&pin)?;

        let wedding = Wedding {
            id: Uuid::new_v4().to_string(),
            couple_name,
            created_at: Utc::now(),
        };
        let record = wedding.clone();

        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO weddings (id, couple_name, pin_hash, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.id,
                    record.couple_name,
                    hash_pin(&record.id, &pin),
                    format_datetime(&record.created_at),
                ],
            )?;
            Ok(())
        })
        .await?;

        info!("Created wedding {}", wedding.id);
        Ok(wedding)
    }

    /// Wedding plus every gift, oldest first.
    pub async fn get_wedding(&self, wedding_id: &str) -> RegistryResult<WeddingDetails> {
        let wedding_id = wedding_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, couple_name, created_at
                 FROM weddings
                 WHERE id = ?1",
            )?;
            let mut rows = stmt.query(params![wedding_id])?;
            let wedding = match rows.next()? {
                Some(row) => row_to_wedding(row)?,
                None => return Err(RegistryError::not_found(format!("wedding {wedding_id}"))),
            };

            let gifts = load_gifts(conn, &wedding.id)?;
            Ok(WeddingDetails { wedding, gifts })
        })
        .await
    }

    /// Check a PIN attempt. A missing wedding and a wrong PIN both yield
    /// `false`, and so does a wedding without a stored credential.
    pub async fn verify_credential(&self, wedding_id: &str, pin: &str) -> RegistryResult<bool> {
        let wedding_id = wedding_id.to_string();
        let attempt = hash_pin(&wedding_id, pin);
        self.execute(move |conn| {
            let stored: Option<Option<String>> = conn
                .query_row(
                    "SELECT pin_hash FROM weddings WHERE id = ?1",
                    params![wedding_id],
                    |row| row.get(0),
                )
                .optional()?;

            let verified = match stored.flatten() {
                Some(hash) => constant_time_eq(hash.as_bytes(), attempt.as_bytes()),
                None => false,
            };
            Ok(verified)
        })
        .await
    }

    /// Replace the PIN, provided the current one checks out.
    pub async fn rotate_credential(
        &self,
        wedding_id: &str,
        current_pin: &str,
        new_pin: String,
    ) -> RegistryResult<bool> {
        require_pin(&new_pin)?;
        if !self.verify_credential(wedding_id, current_pin).await? {
            warn!("Rejected credential rotation for wedding {wedding_id}");
            return Ok(false);
        }

        let wedding_id = wedding_id.to_string();
        let expected = hash_pin(&wedding_id, current_pin);
        self.execute(move |conn| {
            // Guarded on the old digest so two concurrent rotations cannot both win.
            let rows_affected = conn.execute(
                "UPDATE weddings SET pin_hash = ?1 WHERE id = ?2 AND pin_hash = ?3",
                params![hash_pin(&wedding_id, &new_pin), wedding_id, expected],
            )?;
            Ok(rows_affected == 1)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;
    use crate::error::RegistryError;

    #[tokio::test]
    async fn create_and_fetch_wedding() {
        let db = Database::open_in_memory().unwrap();
        let wedding = db
            .create_wedding("  A & B ".into(), "1234".into())
            .await
            .unwrap();
        assert_eq!(wedding.couple_name, "A & B");

        let details = db.get_wedding(&wedding.id).await.unwrap();
        assert_eq!(details.wedding, wedding);
        assert!(details.gifts.is_empty());
    }

    #[tokio::test]
    async fn missing_wedding_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        let err = db.get_wedding("nope").await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
    }

    #[tokio::test]
    async fn empty_inputs_are_rejected() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.create_wedding("   ".into(), "1234".into()).await,
            Err(RegistryError::InvalidInput(_))
        ));
        assert!(matches!(
            db.create_wedding("A & B".into(), "".into()).await,
            Err(RegistryError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn credential_check_does_not_leak_existence() {
        let db = Database::open_in_memory().unwrap();
        let wedding = db.create_wedding("A & B".into(), "1234".into()).await.unwrap();

        assert!(db.verify_credential(&wedding.id, "1234").await.unwrap());
        assert!(!db.verify_credential(&wedding.id, "0000").await.unwrap());
        assert!(!db.verify_credential("missing", "1234").await.unwrap());
    }

    #[tokio::test]
    async fn rotation_requires_current_pin() {
        let db = Database::open_in_memory().unwrap();
        let wedding = db.create_wedding("A & B".into(), "1234".into()).await.unwrap();

        assert!(!db
            .rotate_credential(&wedding.id, "9999", "5678".into())
            .await
            .unwrap());
        assert!(db
            .rotate_credential(&wedding.id, "1234", "5678".into())
            .await
            .unwrap());
        assert!(!db.verify_credential(&wedding.id, "1234").await.unwrap());
        assert!(db.verify_credential(&wedding.id, "5678").await.unwrap());
    }
}
