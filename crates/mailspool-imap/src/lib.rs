//! # mailspool-imap
//!
//! A client-side IMAP4rev1 (RFC 3501) protocol engine: wire parsing,
//! command serialization, and a poolable session driver.
//!
//! ## What's here
//!
//! - **Streaming response parser**: a lazily-filled receive window
//!   ([`buffer::Buffer`]) under a tokenizer and a recursive
//!   interpreter, built to take literals of arbitrary size without
//!   re-reading
//! - **Typed responses**: FETCH items, BODYSTRUCTURE and ENVELOPE
//!   trees, LIST/STATUS/NAMESPACE data ([`parser`])
//! - **A session driver**: greeting, CAPABILITY, CRAM-MD5/LOGIN
//!   authentication, STARTTLS, and the full mailbox command set,
//!   with one observer seeing every response in wire order
//!   ([`connection::ImapClient`])
//! - **Message reconstruction**: fetch plans and reassembly that turn
//!   a BODYSTRUCTURE plus selected part fetches back into one
//!   RFC 822 message ([`rebuild`])
//! - **TLS via rustls**: implicit TLS and STARTTLS without OpenSSL
//!
//! ## Quick start
//!
//! ```ignore
//! use mailspool_imap::{Config, ImapClient, LoggingObserver, Range};
//!
//! #[tokio::main]
//! async fn main() -> mailspool_imap::Result<()> {
//!     let config = Config::new("imap.example.com");
//!     let mut client = ImapClient::connect(&config, Box::new(LoggingObserver)).await?;
//!
//!     let inbox = client.select("INBOX").await?;
//!     println!("{} messages", inbox.exists);
//!
//!     for fetched in client
//!         .fetch(&Range::continuous(1, inbox.exists, false), "(UID FLAGS)")
//!         .await?
//!     {
//!         println!("#{}: {:?}", fetched.number, fetched.flags());
//!     }
//!
//!     client.disconnect().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Lifecycle
//!
//! A connection moves through the states below; every operation
//! checks them, and a transport or parse failure drops the connection
//! into `Disconnected` for good:
//!
//! ```text
//! Init --greeting--> Connected --CAPABILITY--> CapabilityKnown
//!     [--STARTTLS--> Connected --CAPABILITY--> CapabilityKnown]
//!     --AUTHENTICATE/LOGIN--> Authenticated <--SELECT/CLOSE--> Selected
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod auth;
pub mod buffer;
pub mod command;
pub mod connection;
pub mod error;
mod leniency;
pub mod observer;
pub mod parser;
pub mod rebuild;
pub mod types;
mod utf7;

pub use command::{Command, StatusItem, StoreAction, TagGenerator};
pub use connection::{
    Config, ConfigBuilder, ImapClient, ImapStream, Security, SelectedMailbox, SessionState,
};
pub use error::{Error, Operation, Result};
pub use observer::{
    CollectingObserver, Credentials, LoggingObserver, NoopObserver, SessionObserver,
};
pub use parser::{
    BodyStructure, Envelope, FetchResponse, ListItem, Namespace, Response, State, StatusResponse,
};
pub use types::{AuthMethods, Capabilities, Flag, Flags, Range};

/// Protocol revision this engine targets.
pub const IMAP_VERSION: &str = "IMAP4rev1";
