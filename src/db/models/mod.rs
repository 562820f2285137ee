pub mod change;
pub mod gift;
pub mod wedding;

pub use change::{ChangeKind, GiftChange};
pub use gift::{Gift, GiftInput};
pub use wedding::{Wedding, WeddingDetails};
