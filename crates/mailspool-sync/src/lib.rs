//! # mailspool-sync
//!
//! Session management and offline replay on top of `mailspool-imap`.
//!
//! This crate provides:
//! - **Session pooling** - authenticated connections are reused with
//!   folder affinity instead of reconnecting per operation
//! - **Retry on dead sessions** - commands that fail because a pooled
//!   connection died get one retry on a fresh one
//! - **Offline jobs** - mutations made while disconnected are queued
//!   in a durable log, merged where possible, and replayed in order
//! - **Swappable time** - pool aging runs against a [`Clock`] so
//!   tests control the passage of time

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod cache;
pub mod clock;
mod error;
pub mod offline;
pub mod retry;
pub mod store;
#[cfg(test)]
mod testing;

pub use cache::{
    ConnectFuture, Connector, PoolConfig, Session, SessionCache, folder_names_equal,
};
pub use clock::{BoxClock, Clock, MockClock, SystemClock};
pub use error::{Error, Result};
pub use offline::{CopyEntry, OfflineJob, OfflineJobManager};
pub use retry::with_session;
pub use store::MailStore;
