//! Wedding registry models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Gift;

/// A registry owned by one couple. The access credential lives in the
/// store only and is never loaded into this struct.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Wedding {
    pub id: String,
    pub couple_name: String,
    pub created_at: DateTime<Utc>,
}

/// A wedding together with all of its gifts in creation order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WeddingDetails {
    #[serde(flatten)]
    pub wedding: Wedding,
    pub gifts: Vec<Gift>,
}

impl WeddingDetails {
    pub fn gift(&self, gift_id: &str) -> Option<&Gift> {
        self.gifts.iter().find(|gift| gift.id == gift_id)
    }
}
