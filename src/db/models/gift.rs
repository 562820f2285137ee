//! Gift line items and their claim state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Gift {
    pub id: String,
    pub wedding_id: String,
    pub item_name: String,
    pub description: Option<String>,
    pub claimed: bool,
    /// Set only while `claimed` is true.
    pub claimer_name: Option<String>,
    /// Audit token minted per claim; never used as an identity.
    #[serde(default, skip_serializing)]
    pub claimer_token: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    /// Meaningful only while `claimed` is true.
    pub thank_you_sent: bool,
    pub guest_submitted: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for adding a gift, from either the couple or a guest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiftInput {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub guest_submitted: bool,
}

impl GiftInput {
    pub fn new(name: impl Into<String>, description: Option<String>) -> Self {
        Self {
            name: name.into(),
            description,
            guest_submitted: false,
        }
    }

    pub fn from_guest(name: impl Into<String>, description: Option<String>) -> Self {
        Self {
            guest_submitted: true,
            ..Self::new(name, description)
        }
    }
}
