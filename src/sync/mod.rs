//! Live sync: keeps a viewer's copy of one wedding converged with the store.
//!
//! Every trigger causes a full re-fetch of the wedding; nothing is patched
//! incrementally. Two interchangeable triggers exist, see [`SyncMode`].

use std::time::Duration;

pub mod controller;
pub mod loop_worker;

pub use controller::SyncController;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Re-fetch on each change notification for the wedding. Only sees
    /// writes made through the same `Database` handle.
    Notify,
    /// Re-fetch on a fixed interval. Sees writes from any process.
    Poll { interval: Duration },
}
