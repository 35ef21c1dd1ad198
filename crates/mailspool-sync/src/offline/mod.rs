//! Offline mutation queue.
//!
//! Flag changes, copies, moves, and uploads made while disconnected
//! are recorded as [`OfflineJob`]s, merged with their neighbors where
//! possible, persisted to a binary log, and replayed in order once a
//! connection is back.

mod job;
mod log;
mod manager;

pub use job::{CopyEntry, OfflineJob};
pub use manager::OfflineJobManager;
