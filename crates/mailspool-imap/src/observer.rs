//! Session observer: the callback surface a connection reports into.
//!
//! Every parsed response is delivered through [`SessionObserver`] in
//! wire order, including responses a command was not waiting for
//! (EXISTS after NOOP, flag changes made by another client, BYE).
//! The observer also supplies credentials on demand and receives
//! download progress for large literals.
//!
//! # Example
//!
//! ```ignore
//! use mailspool_imap::observer::{Credentials, SessionObserver};
//! use mailspool_imap::parser::Response;
//!
//! struct Prompting {
//!     username: String,
//! }
//!
//! impl SessionObserver for Prompting {
//!     fn credentials(&mut self) -> mailspool_imap::Result<Credentials> {
//!         Ok(Credentials::new(self.username.clone(), prompt_password()?))
//!     }
//!
//!     fn on_response(&mut self, response: &Response) {
//!         if let Response::Exists(count) = response {
//!             println!("mailbox now has {count} messages");
//!         }
//!     }
//! }
//! ```

use crate::parser::{Response, ResponseCode};
use crate::types::AuthMethods;
use crate::{Error, Result};

/// Username/password pair supplied by an observer.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Account name sent to the server.
    pub username: String,
    /// Secret; never logged.
    pub password: String,
}

impl Credentials {
    /// Creates a credentials pair.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Callbacks from a connection to its owner.
///
/// All methods have defaults: a do-nothing observer only refuses to
/// authenticate. Responses arrive strictly in wire order, before the
/// command call that triggered the receive returns.
pub trait SessionObserver: Send {
    /// Supplies the account credentials for LOGIN or AUTHENTICATE.
    ///
    /// The default refuses, which fails any command that needs to
    /// authenticate.
    fn credentials(&mut self) -> Result<Credentials> {
        Err(Error::Auth("no credentials available".to_string()))
    }

    /// Reports a password the server accepted, so the caller may
    /// persist it.
    fn store_password(&mut self, password: &str) {
        let _ = password;
    }

    /// Which authentication mechanisms the caller permits.
    ///
    /// The connection uses the strongest mechanism both permitted
    /// here and advertised by the server.
    fn auth_methods(&self) -> AuthMethods {
        AuthMethods::ALL
    }

    /// Called just before credentials are sent.
    fn on_authenticating(&mut self) {}

    /// A literal download of `total` bytes is starting.
    fn progress_start(&mut self, total: usize) {
        let _ = total;
    }

    /// `done` bytes of the announced literal have arrived.
    fn progress(&mut self, done: usize) {
        let _ = done;
    }

    /// Delivers one parsed response.
    fn on_response(&mut self, response: &Response) {
        let _ = response;
    }
}

/// An observer that ignores everything and cannot authenticate.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}

/// An observer that logs responses through `tracing`.
///
/// BYE and ALERT get user-visible levels; routine traffic stays at
/// trace.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl SessionObserver for LoggingObserver {
    fn on_authenticating(&mut self) {
        tracing::debug!("authenticating");
    }

    fn progress_start(&mut self, total: usize) {
        tracing::trace!(total, "literal download started");
    }

    fn progress(&mut self, done: usize) {
        tracing::trace!(done, "literal download progress");
    }

    fn on_response(&mut self, response: &Response) {
        match response {
            Response::State(state) if state.is_bye() => {
                tracing::info!(text = %state.text, "BYE");
            }
            Response::State(state) if matches!(state.code, Some(ResponseCode::Alert)) => {
                tracing::warn!(text = %state.text, "ALERT");
            }
            Response::State(state) if !state.is_ok() => {
                tracing::warn!(text = %state.text, "server reported failure");
            }
            other => tracing::trace!(response = ?other, "response"),
        }
    }
}

/// An observer that stores what it sees, for tests and batch
/// processing.
#[derive(Debug, Default, Clone)]
pub struct CollectingObserver {
    /// Responses in delivery order.
    pub responses: Vec<Response>,
    /// Progress reports as `(done, total)` pairs.
    pub progress: Vec<(usize, usize)>,
    credentials: Option<Credentials>,
    total: usize,
}

impl CollectingObserver {
    /// Creates an empty collector that refuses to authenticate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a collector that answers credential requests.
    #[must_use]
    pub fn with_credentials(username: &str, password: &str) -> Self {
        Self {
            credentials: Some(Credentials::new(username, password)),
            ..Self::default()
        }
    }

    /// Takes all collected responses, leaving the collector empty.
    pub fn take(&mut self) -> Vec<Response> {
        std::mem::take(&mut self.responses)
    }
}

impl SessionObserver for CollectingObserver {
    fn credentials(&mut self) -> Result<Credentials> {
        self.credentials
            .clone()
            .ok_or_else(|| Error::Auth("no credentials available".to_string()))
    }

    fn progress_start(&mut self, total: usize) {
        self.total = total;
    }

    fn progress(&mut self, done: usize) {
        self.progress.push((done, self.total));
    }

    fn on_response(&mut self, response: &Response) {
        self.responses.push(response.clone());
    }
}

/// A shared collector: the connection owns one handle, the caller
/// keeps another and reads the collected responses back out.
impl SessionObserver for std::sync::Arc<std::sync::Mutex<CollectingObserver>> {
    fn credentials(&mut self) -> Result<Credentials> {
        self.lock()
            .map_err(|_| Error::Auth("observer lock poisoned".to_string()))?
            .credentials()
    }

    fn store_password(&mut self, password: &str) {
        if let Ok(mut guard) = self.lock() {
            guard.store_password(password);
        }
    }

    fn progress_start(&mut self, total: usize) {
        if let Ok(mut guard) = self.lock() {
            guard.progress_start(total);
        }
    }

    fn progress(&mut self, done: usize) {
        if let Ok(mut guard) = self.lock() {
            guard.progress(done);
        }
    }

    fn on_response(&mut self, response: &Response) {
        if let Ok(mut guard) = self.lock() {
            guard.on_response(response);
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn noop_observer_refuses_credentials() {
        let mut observer = NoopObserver;
        assert!(matches!(observer.credentials(), Err(Error::Auth(_))));
        assert_eq!(observer.auth_methods(), AuthMethods::ALL);
    }

    #[test]
    fn collecting_observer_answers_credentials() {
        let mut observer = CollectingObserver::with_credentials("user", "secret");
        let creds = observer.credentials().unwrap();
        assert_eq!(creds.username, "user");
        assert_eq!(creds.password, "secret");
    }

    #[test]
    fn collecting_observer_records_responses() {
        let mut observer = CollectingObserver::new();
        observer.on_response(&Response::Exists(3));
        observer.on_response(&Response::Recent(1));
        let taken = observer.take();
        assert_eq!(taken.len(), 2);
        assert!(observer.responses.is_empty());
    }

    #[test]
    fn collecting_observer_pairs_progress_with_total() {
        let mut observer = CollectingObserver::new();
        observer.progress_start(2048);
        observer.progress(1024);
        observer.progress(2048);
        assert_eq!(observer.progress, vec![(1024, 2048), (2048, 2048)]);
    }

    #[test]
    fn credentials_debug_redacts_password() {
        let creds = Credentials::new("user", "secret");
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("user"));
        assert!(!rendered.contains("secret"));
    }
}
