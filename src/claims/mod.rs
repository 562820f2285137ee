pub mod coordinator;

pub use coordinator::{ClaimCoordinator, ClaimOutcome, ClaimReceipt};
