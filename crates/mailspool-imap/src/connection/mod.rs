//! Connections: settings, transports, and the client driver that
//! speaks the protocol over them.

mod client;
mod config;
mod stream;

pub use client::{ImapClient, SelectedMailbox, SessionState};
pub use config::{Config, ConfigBuilder, Security};
pub use stream::{ImapStream, connect_plain, connect_tls};
