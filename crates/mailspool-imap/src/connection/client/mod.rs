//! The IMAP client driver.
//!
//! One [`ImapClient`] owns one connection end to end: the socket, the
//! receive window, the tag counter and the lifecycle state. Commands
//! run strictly one at a time; every response parsed on the way to a
//! command's tagged status is handed to the session observer, so
//! unsolicited EXISTS/EXPUNGE/FETCH traffic between operations is
//! never lost.
//!
//! A failure that leaves the connection unusable (I/O, timeout, BYE,
//! or a response the parser could not make sense of) moves the client
//! to [`SessionState::Disconnected`] and drops the socket; the error
//! itself reports whether a retry on a fresh session is worthwhile.

#![allow(clippy::missing_errors_doc)]

mod ops;
mod state;

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

pub use self::state::{SelectedMailbox, SessionState};
use super::config::{Config, Security};
use super::stream::{ImapStream, connect_plain, connect_tls};
use crate::auth;
use crate::buffer::Buffer;
use crate::command::{Command, TagGenerator};
use crate::error::{Error, Operation, Result};
use crate::observer::{Credentials, SessionObserver};
use crate::parser::{Parser, Response};
use crate::types::{AuthMethods, Capabilities};

/// How long a courtesy LOGOUT may take before the socket is dropped
/// regardless.
const LOGOUT_TIMEOUT: Duration = Duration::from_secs(5);

/// A single IMAP connection and its protocol state.
///
/// Generic over the transport so tests can drive it from a scripted
/// stream; production code uses the [`ImapStream`] default and usually
/// enters through [`ImapClient::connect`].
pub struct ImapClient<S = ImapStream> {
    stream: Option<S>,
    buf: Buffer,
    tags: TagGenerator,
    capabilities: Capabilities,
    state: SessionState,
    observer: Box<dyn SessionObserver>,
    io_timeout: Duration,
}

impl<S> std::fmt::Debug for ImapClient<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapClient")
            .field("state", &self.state)
            .field("capabilities", &self.capabilities)
            .field("io_timeout", &self.io_timeout)
            .finish_non_exhaustive()
    }
}

impl<S> ImapClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps an already-connected transport.
    ///
    /// The greeting has not been read yet; drive the lifecycle with
    /// [`read_greeting`](Self::read_greeting),
    /// [`capability`](Self::capability) and
    /// [`authenticate`](Self::authenticate).
    pub fn from_stream(stream: S, io_timeout: Duration, observer: Box<dyn SessionObserver>) -> Self {
        Self {
            stream: Some(stream),
            buf: Buffer::new(),
            tags: TagGenerator::default(),
            capabilities: Capabilities::default(),
            state: SessionState::Init,
            observer,
            io_timeout,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> &SessionState {
        &self.state
    }

    /// What the server announced in its last CAPABILITY reply.
    #[must_use]
    pub const fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Name of the mailbox opened by the last SELECT, if any.
    #[must_use]
    pub fn selected_mailbox(&self) -> Option<&str> {
        self.state.selected_mailbox()
    }

    /// Whether commands can still be issued on this connection.
    #[must_use]
    pub const fn is_usable(&self) -> bool {
        self.stream.is_some() && !matches!(self.state, SessionState::Disconnected)
    }

    /// Consumes the server greeting.
    ///
    /// An OK or PREAUTH greeting moves the client to
    /// [`SessionState::Connected`]; a BYE greeting (or anything
    /// unreadable) tears the connection down.
    pub async fn read_greeting(&mut self) -> Result<()> {
        if self.state != SessionState::Init {
            return Err(Error::InvalidState(format!(
                "greeting already consumed, connection is {}",
                self.state
            )));
        }
        let greeting = {
            let Some(stream) = self.stream.as_mut() else {
                return Err(Error::Disconnected);
            };
            let mut parser = Parser::new(
                stream,
                &mut self.buf,
                self.io_timeout,
                self.observer.as_mut(),
            );
            parser.parse_greeting().await
        };
        match greeting {
            Ok(status) if status.is_ok() => {
                tracing::debug!(text = %status.text, "greeting accepted");
                self.state = SessionState::Connected;
                Ok(())
            }
            Ok(status) => {
                let err = status.as_error().unwrap_or_else(|| {
                    Error::Protocol("greeting was not a status line".to_string())
                });
                Err(self.fail(Operation::Greeting, err))
            }
            Err(err) => Err(self.fail(Operation::Greeting, err)),
        }
    }

    /// Asks the server what it can do and records the answer.
    ///
    /// The reply must announce IMAP4REV1. Runs once after the greeting
    /// and again after every STARTTLS upgrade, because the pre-TLS
    /// announcement is not trustworthy.
    pub async fn capability(&mut self) -> Result<()> {
        if matches!(self.state, SessionState::Init | SessionState::Disconnected) {
            return Err(Error::InvalidState(format!(
                "cannot read capabilities, connection is {}",
                self.state
            )));
        }
        let responses = self.run(Operation::Capability, &Command::Capability).await?;
        let atoms = responses.iter().find_map(|response| match response {
            Response::Capability(atoms) => Some(atoms.as_slice()),
            _ => None,
        });
        let Some(atoms) = atoms else {
            return Err(self.fail(
                Operation::Capability,
                Error::Protocol("reply carried no CAPABILITY data".to_string()),
            ));
        };
        if !atoms.iter().any(|atom| atom.eq_ignore_ascii_case("IMAP4REV1")) {
            return Err(self.fail(
                Operation::Capability,
                Error::Protocol("server does not announce IMAP4REV1".to_string()),
            ));
        }
        self.capabilities = Capabilities::parse(atoms);
        if self.state == SessionState::Connected {
            self.state = SessionState::CapabilityKnown;
        }
        tracing::debug!(capabilities = ?self.capabilities, "capabilities recorded");
        Ok(())
    }

    /// Authenticates with credentials supplied by the observer.
    ///
    /// Uses AUTHENTICATE CRAM-MD5 when both sides allow it, and falls
    /// back to LOGIN if the server rejects the digest and LOGIN is
    /// still permitted. The accepted password is reported back through
    /// [`SessionObserver::store_password`].
    pub async fn authenticate(&mut self) -> Result<()> {
        if self.state != SessionState::CapabilityKnown {
            return Err(Error::InvalidState(format!(
                "cannot authenticate, connection is {}",
                self.state
            )));
        }
        let credentials = self
            .observer
            .credentials()
            .map_err(|err| err.during(Operation::Authenticate))?;
        self.observer.on_authenticating();

        let usable = self.capabilities.auth() & self.observer.auth_methods();
        if usable.is_empty() {
            return Err(self.fail(
                Operation::Authenticate,
                Error::Auth("no authentication mechanism is both offered and permitted".to_string()),
            ));
        }

        let mut authenticated = false;
        if usable.contains(AuthMethods::CRAM_MD5) {
            match self.try_cram_md5(&credentials).await {
                Ok(None) => authenticated = true,
                Ok(Some(rejection)) => {
                    if !usable.contains(AuthMethods::LOGIN) {
                        return Err(self.fail(Operation::Authenticate, rejection));
                    }
                    tracing::debug!(error = %rejection, "CRAM-MD5 rejected, falling back to LOGIN");
                }
                Err(err) => return Err(self.fail(Operation::Authenticate, err)),
            }
        }
        if !authenticated {
            if let Err(err) = self.login(&credentials).await {
                return Err(self.fail(Operation::Login, err));
            }
        }

        self.observer.store_password(&credentials.password);
        self.state = SessionState::Authenticated;
        tracing::info!(username = %credentials.username, "authenticated");
        Ok(())
    }

    /// Runs the CRAM-MD5 exchange.
    ///
    /// `Ok(None)` means the server accepted the digest; `Ok(Some(_))`
    /// carries a NO/BAD ruling the caller may react to by falling back.
    async fn try_cram_md5(&mut self, credentials: &Credentials) -> Result<Option<Error>> {
        let command = Command::Authenticate {
            mechanism: "CRAM-MD5".to_string(),
        };
        let tag = self.tags.next();
        self.send_command(&command, &tag).await?;
        let mut responses = self.receive(&tag, true).await?;

        let challenge = match responses.last() {
            Some(Response::Continue { text }) => Some(text.clone().unwrap_or_default()),
            _ => None,
        };
        if let Some(challenge) = challenge {
            match auth::cram_md5_response(&credentials.username, &credentials.password, &challenge)
            {
                Ok(reply) => {
                    let mut line = reply.into_bytes();
                    line.extend_from_slice(b"\r\n");
                    self.send_secret(&line).await?;
                }
                Err(err) => {
                    // Abort the exchange so the connection stays in sync.
                    tracing::trace!("C: *");
                    self.write_all_timed(b"*\r\n").await?;
                    let _ = self.receive(&tag, false).await;
                    return Err(err);
                }
            }
            responses = self.receive(&tag, false).await?;
        }

        match Self::finish(responses) {
            Ok(_) => Ok(None),
            Err(err @ (Error::No(_) | Error::Bad(_))) => Ok(Some(err)),
            Err(err) => Err(err),
        }
    }

    /// Runs a plain LOGIN with quoted credentials.
    async fn login(&mut self, credentials: &Credentials) -> Result<()> {
        let command = Command::Login {
            username: credentials.username.clone(),
            password: credentials.password.clone(),
        };
        let tag = self.tags.next();
        self.send_command(&command, &tag).await?;
        let responses = self.receive(&tag, false).await?;
        Self::finish(responses)?;
        Ok(())
    }

    /// Probes the connection with a NOOP.
    ///
    /// Returns whether the server still answers; a failed probe leaves
    /// the client disconnected.
    pub async fn check_connection(&mut self) -> bool {
        if !self.is_usable() || self.state == SessionState::Init {
            return false;
        }
        self.run(Operation::Noop, &Command::Noop).await.is_ok()
    }

    /// Shuts the connection down, with a courtesy LOGOUT when the
    /// server is still believed to be listening.
    ///
    /// LOGOUT failures are logged and otherwise ignored; afterwards
    /// the client is [`SessionState::Disconnected`] either way.
    pub async fn disconnect(&mut self) {
        if self.is_usable() && self.state != SessionState::Init {
            let logout = self.run(Operation::Logout, &Command::Logout);
            match timeout(LOGOUT_TIMEOUT, logout).await {
                Ok(Ok(_)) => tracing::debug!("logged out"),
                Ok(Err(err)) => tracing::debug!(error = %err, "LOGOUT failed"),
                Err(_) => tracing::debug!("LOGOUT timed out"),
            }
        }
        self.stream = None;
        self.state = SessionState::Disconnected;
    }

    /// Runs one command to its tagged status.
    ///
    /// Failures are attributed to `op`; a failure that poisons the
    /// connection also tears it down.
    async fn run(&mut self, op: Operation, command: &Command) -> Result<Vec<Response>> {
        match self.try_run(command).await {
            Ok(responses) => Ok(responses),
            Err(err) => Err(self.fail(op, err)),
        }
    }

    async fn try_run(&mut self, command: &Command) -> Result<Vec<Response>> {
        let tag = self.tags.next();
        self.send_command(command, &tag).await?;
        let responses = self.receive(&tag, false).await?;
        Self::finish(responses)
    }

    /// Demands that the exchange ended in a tagged OK.
    ///
    /// On success the caller gets the full response list back for
    /// digestion; a NO/BAD/BYE ruling becomes the matching error.
    fn finish(responses: Vec<Response>) -> Result<Vec<Response>> {
        let Some(Response::State(status)) = responses.last() else {
            return Err(Error::Protocol(
                "exchange ended without a tagged status".to_string(),
            ));
        };
        match status.as_error() {
            None => Ok(responses),
            Some(err) => Err(err),
        }
    }

    /// Attributes `err` to `op` and tears the connection down when the
    /// failure poisons it.
    fn fail(&mut self, op: Operation, err: Error) -> Error {
        let err = err.during(op);
        if err.poisons_connection() {
            tracing::debug!(error = %err, state = %self.state, "connection poisoned");
            self.stream = None;
            self.state = SessionState::Disconnected;
        }
        err
    }

    fn require_authenticated(&self) -> Result<()> {
        if self.state.is_authenticated() {
            Ok(())
        } else {
            Err(Error::InvalidState(format!(
                "need an authenticated session, connection is {}",
                self.state
            )))
        }
    }

    fn require_selected(&self) -> Result<()> {
        if self.state.is_selected() {
            Ok(())
        } else {
            Err(Error::InvalidState(format!(
                "need a selected mailbox, connection is {}",
                self.state
            )))
        }
    }

    /// Serializes and sends one command line.
    async fn send_command(&mut self, command: &Command, tag: &str) -> Result<()> {
        let line = command.serialize(tag);
        if command.is_sensitive() {
            tracing::trace!(tag, verb = command.verb(), "C: <redacted>");
        } else {
            tracing::trace!(line = %String::from_utf8_lossy(&line).trim_end(), "C:");
        }
        self.write_all_timed(&line).await
    }

    /// Sends a line whose content must never reach the logs.
    async fn send_secret(&mut self, line: &[u8]) -> Result<()> {
        tracing::trace!("C: <redacted>");
        self.write_all_timed(line).await
    }

    /// Sends raw literal bytes, tracing only their length.
    async fn send_literal(&mut self, payload: &[u8]) -> Result<()> {
        tracing::trace!(bytes = payload.len(), "C: <literal>");
        self.write_all_timed(payload).await
    }

    async fn write_all_timed(&mut self, bytes: &[u8]) -> Result<()> {
        let io_timeout = self.io_timeout;
        let stream = self.stream.as_mut().ok_or(Error::Disconnected)?;
        let io = async {
            stream.write_all(bytes).await.map_err(Error::Send)?;
            stream.flush().await.map_err(Error::Send)
        };
        match timeout(io_timeout, io).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(io_timeout)),
        }
    }

    /// Parses responses until the line tagged `tag`, or until a `+`
    /// continuation when the command expects one.
    async fn receive(&mut self, tag: &str, allow_continuation: bool) -> Result<Vec<Response>> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(Error::Disconnected);
        };
        let mut parser = Parser::new(
            stream,
            &mut self.buf,
            self.io_timeout,
            self.observer.as_mut(),
        );
        parser.parse(tag, allow_continuation).await
    }
}

impl ImapClient<ImapStream> {
    /// Connects, reads the greeting, learns capabilities, upgrades to
    /// TLS when configured for STARTTLS, and authenticates.
    ///
    /// This is the whole login dance in one call; the returned client
    /// is [`SessionState::Authenticated`] and ready for mailbox work.
    pub async fn connect(config: &Config, observer: Box<dyn SessionObserver>) -> Result<Self> {
        tracing::info!(
            host = %config.host,
            port = config.port,
            security = ?config.security,
            "connecting"
        );
        let open = async {
            match config.security {
                Security::Implicit => connect_tls(&config.host, config.port).await,
                Security::None | Security::StartTls => {
                    connect_plain(&config.host, config.port).await
                }
            }
        };
        let stream = match timeout(config.connect_timeout, open).await {
            Ok(result) => result?,
            Err(_) => return Err(Error::Timeout(config.connect_timeout)),
        };

        let mut client = Self::from_stream(stream, config.io_timeout, observer);
        client.read_greeting().await?;
        client.capability().await?;
        if config.security == Security::StartTls {
            client.start_tls(&config.host).await?;
            client.capability().await?;
        }
        client.authenticate().await?;
        tracing::info!(host = %config.host, "session ready");
        Ok(client)
    }

    /// Upgrades the plaintext connection to TLS.
    ///
    /// The server must have announced STARTTLS; afterwards the client
    /// drops back to [`SessionState::Connected`] and the caller reads
    /// capabilities again over the encrypted channel.
    async fn start_tls(&mut self, host: &str) -> Result<()> {
        if !self.capabilities.has_starttls() {
            return Err(self.fail(
                Operation::StartTls,
                Error::Protocol("server does not offer STARTTLS".to_string()),
            ));
        }
        self.run(Operation::StartTls, &Command::StartTls).await?;

        let Some(plain) = self.stream.take() else {
            return Err(Error::Disconnected);
        };
        match timeout(self.io_timeout, plain.upgrade_to_tls(host)).await {
            Ok(Ok(tls)) => {
                self.stream = Some(tls);
                self.state = SessionState::Connected;
                tracing::debug!("TLS established");
                Ok(())
            }
            Ok(Err(err)) => Err(self.fail(Operation::StartTls, err)),
            Err(_) => {
                let err = Error::Timeout(self.io_timeout);
                Err(self.fail(Operation::StartTls, err))
            }
        }
    }
}
