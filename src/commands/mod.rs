//! Consumer-facing operations. The CLI dispatches into these; each takes the
//! shared [`crate::AppState`] and returns typed results.

pub mod couple;
pub mod guest;
