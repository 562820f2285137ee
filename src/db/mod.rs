//! Registry store: SQLite persistence for weddings and gifts.

pub mod connection;
pub mod helpers;
mod migrations;
pub mod models;
mod repositories;

pub use connection::Database;
pub use models::{ChangeKind, Gift, GiftChange, GiftInput, Wedding, WeddingDetails};
