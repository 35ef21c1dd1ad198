//! Error types for the IMAP engine.
//!
//! Failures carry two independent coordinates: the transport-level
//! *cause* (what went wrong on the wire) and the high-level
//! *operation* that was in flight. [`Error::code`] packs both into the
//! 32-bit value historically consumed by session-retry and diagnostic
//! layers: cause in the low byte, operation in the middle byte, and an
//! OS socket sub-code in the third byte when one is available.

use std::time::Duration;

use thiserror::Error;

/// High-level operation an error is attributed to.
///
/// Contributes the middle byte of [`Error::code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Operation {
    Greeting,
    Login,
    Capability,
    Fetch,
    Store,
    Select,
    Lsub,
    List,
    Copy,
    Append,
    Noop,
    Create,
    Delete,
    Rename,
    Subscribe,
    Unsubscribe,
    Close,
    Expunge,
    Authenticate,
    Search,
    Namespace,
    Logout,
    StartTls,
    Status,
}

impl Operation {
    /// Operation bits of the packed error code.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::Greeting => 0x0100,
            Self::Login => 0x0200,
            Self::Capability => 0x0300,
            Self::Fetch => 0x0400,
            Self::Store => 0x0500,
            Self::Select => 0x0600,
            Self::Lsub => 0x0700,
            Self::List => 0x0800,
            Self::Copy => 0x0900,
            Self::Append => 0x0a00,
            Self::Noop => 0x0b00,
            Self::Create => 0x0c00,
            Self::Delete => 0x0d00,
            Self::Rename => 0x0e00,
            Self::Subscribe => 0x0f00,
            Self::Unsubscribe => 0x1000,
            Self::Close => 0x1100,
            Self::Expunge => 0x1200,
            Self::Authenticate => 0x1300,
            Self::Search => 0x1400,
            Self::Namespace => 0x1500,
            Self::Logout => 0x1600,
            Self::StartTls => 0x1700,
            Self::Status => 0x1800,
        }
    }

    /// The wire verb, for diagnostics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Greeting => "greeting",
            Self::Login => "LOGIN",
            Self::Capability => "CAPABILITY",
            Self::Fetch => "FETCH",
            Self::Store => "STORE",
            Self::Select => "SELECT",
            Self::Lsub => "LSUB",
            Self::List => "LIST",
            Self::Copy => "COPY",
            Self::Append => "APPEND",
            Self::Noop => "NOOP",
            Self::Create => "CREATE",
            Self::Delete => "DELETE",
            Self::Rename => "RENAME",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Close => "CLOSE",
            Self::Expunge => "EXPUNGE",
            Self::Authenticate => "AUTHENTICATE",
            Self::Search => "SEARCH",
            Self::Namespace => "NAMESPACE",
            Self::Logout => "LOGOUT",
            Self::StartTls => "STARTTLS",
            Self::Status => "STATUS",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mask selecting the transport-cause bits of a packed code.
pub const CODE_MASK_CAUSE: u32 = 0x0000_00ff;
/// Mask selecting the operation bits of a packed code.
pub const CODE_MASK_OPERATION: u32 = 0x0000_ff00;
/// Mask selecting the OS socket sub-code bits of a packed code.
pub const CODE_MASK_SOCKET: u32 = 0x00ff_0000;

/// Errors that can occur during IMAP operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to establish the TCP connection.
    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),

    /// I/O error while receiving from the server.
    #[error("receive failed: {0}")]
    Receive(#[source] std::io::Error),

    /// I/O error while sending to the server.
    #[error("send failed: {0}")]
    Send(#[source] std::io::Error),

    /// A socket wait exceeded the configured timeout.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The peer closed the connection mid-exchange.
    #[error("connection closed by peer")]
    Disconnected,

    /// TLS handshake or record-layer error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Invalid DNS name for TLS.
    #[error("invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// Response grammar violation.
    #[error("parse error at position {position}: {message}")]
    Parse {
        /// Byte offset into the receive window where parsing failed.
        position: usize,
        /// Description of what went wrong.
        message: String,
    },

    /// Authentication could not be carried out (before the server
    /// ruled on it; a server rejection surfaces as [`Error::No`]).
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Server returned NO.
    #[error("server returned NO: {0}")]
    No(String),

    /// Server returned BAD.
    #[error("server returned BAD: {0}")]
    Bad(String),

    /// Server sent BYE (disconnecting).
    #[error("server sent BYE: {0}")]
    Bye(String),

    /// Operation not valid in the current connection state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Protocol violation or unexpected data.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A failure attributed to a specific command.
    ///
    /// Wraps the cause so that `Display` walks operation → cause →
    /// I/O detail, the three fragments a user-facing report is built
    /// from.
    #[error("{op} failed: {source}")]
    Command {
        /// Command the failure occurred under.
        op: Operation,
        /// Underlying cause.
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Attributes this error to `op`, unless already attributed.
    #[must_use]
    pub fn during(self, op: Operation) -> Self {
        match self {
            Self::Command { .. } => self,
            other => Self::Command {
                op,
                source: Box::new(other),
            },
        }
    }

    /// Transport-cause bits of the packed code.
    fn cause_code(&self) -> u32 {
        match self {
            Self::Connect(_) => 0x02,
            Self::Timeout(_) => 0x04,
            Self::Disconnected => 0x05,
            Self::Receive(_) => 0x06,
            Self::Parse { .. } => 0x07,
            Self::Auth(_) | Self::Protocol(_) => 0x08,
            Self::InvalidState(_) => 0x09,
            Self::Send(_) => 0x0a,
            Self::No(_) | Self::Bad(_) | Self::Bye(_) => 0x0b,
            Self::Tls(_) | Self::InvalidDnsName(_) => 0x0c,
            Self::Command { source, .. } => source.cause_code(),
        }
    }

    /// OS-level socket sub-code, when the cause carries one.
    fn socket_code(&self) -> u32 {
        match self {
            Self::Connect(e) | Self::Receive(e) | Self::Send(e) => e
                .raw_os_error()
                .map_or(0, |n| (n.unsigned_abs() & 0xff) << 16),
            Self::Command { source, .. } => source.socket_code(),
            _ => 0,
        }
    }

    /// Packs this error into the 32-bit diagnostic code: transport
    /// cause in the low byte, operation in the middle byte, OS socket
    /// sub-code in the third byte.
    #[must_use]
    pub fn code(&self) -> u32 {
        let op = match self {
            Self::Command { op, .. } => op.code(),
            _ => 0,
        };
        self.cause_code() | op | self.socket_code()
    }

    /// Whether this failure is connection-level, i.e. worth retrying
    /// the same command on a freshly acquired session.
    ///
    /// Parse failures and server NO/BAD/BYE rulings are final.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        match self {
            Self::Connect(_)
            | Self::Receive(_)
            | Self::Send(_)
            | Self::Timeout(_)
            | Self::Disconnected
            | Self::Tls(_)
            | Self::InvalidDnsName(_)
            | Self::InvalidState(_) => true,
            Self::Command { source, .. } => source.is_transport(),
            _ => false,
        }
    }

    /// Whether the connection must be considered unusable after this
    /// error. Covers every transport failure plus grammar violations,
    /// which leave the receive window in an unknown position.
    #[must_use]
    pub fn poisons_connection(&self) -> bool {
        match self {
            Self::Parse { .. } | Self::Bye(_) => true,
            Self::Command { source, .. } => source.poisons_connection(),
            other => other.is_transport(),
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

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
    fn code_packs_operation_and_cause() {
        let err = Error::Timeout(Duration::from_secs(5)).during(Operation::Fetch);
        assert_eq!(err.code() & CODE_MASK_OPERATION, 0x0400);
        assert_eq!(err.code() & CODE_MASK_CAUSE, 0x04);
    }

    #[test]
    fn code_without_operation_keeps_cause() {
        let err = Error::Disconnected;
        assert_eq!(err.code(), 0x05);
    }

    #[test]
    fn during_does_not_rewrap() {
        let err = Error::Disconnected
            .during(Operation::Select)
            .during(Operation::Fetch);
        assert_eq!(err.code() & CODE_MASK_OPERATION, Operation::Select.code());
    }

    #[test]
    fn socket_sub_code_from_io_error() {
        let io = std::io::Error::from_raw_os_error(104); // ECONNRESET
        let err = Error::Receive(io).during(Operation::Noop);
        assert_eq!(err.code() & CODE_MASK_SOCKET, 104 << 16);
    }

    #[test]
    fn transport_predicate() {
        assert!(Error::Disconnected.is_transport());
        assert!(Error::Timeout(Duration::from_secs(1)).is_transport());
        assert!(
            Error::Receive(std::io::Error::from(std::io::ErrorKind::ConnectionReset))
                .is_transport()
        );
        assert!(!Error::No("denied".to_string()).is_transport());
        assert!(
            !Error::Parse {
                position: 0,
                message: "bad atom".to_string()
            }
            .is_transport()
        );
        assert!(
            Error::Disconnected
                .during(Operation::Store)
                .is_transport()
        );
    }

    #[test]
    fn parse_poisons_but_is_not_retryable() {
        let err = Error::Parse {
            position: 12,
            message: "unexpected byte".to_string(),
        };
        assert!(err.poisons_connection());
        assert!(!err.is_transport());
    }

    #[test]
    fn display_chains_operation_and_cause() {
        let err = Error::Disconnected.during(Operation::Append);
        assert_eq!(err.to_string(), "APPEND failed: connection closed by peer");
    }
}
