use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Notification that one gift of one wedding was written.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GiftChange {
    pub wedding_id: String,
    pub gift_id: String,
    pub kind: ChangeKind,
}

impl GiftChange {
    pub fn new(wedding_id: impl Into<String>, gift_id: impl Into<String>, kind: ChangeKind) -> Self {
        Self {
            wedding_id: wedding_id.into(),
            gift_id: gift_id.into(),
            kind,
        }
    }
}
