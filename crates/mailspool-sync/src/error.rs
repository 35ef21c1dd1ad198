//! Error types for the sync layer.

use thiserror::Error;

/// Errors that can occur in session pooling and offline replay.
#[derive(Debug, Error)]
pub enum Error {
    /// IMAP operation failed.
    #[error("IMAP error: {0}")]
    Imap(#[from] mailspool_imap::Error),

    /// Job log could not be read or written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Local store could not satisfy a request.
    #[error("store error: {0}")]
    Store(String),
}

impl Error {
    /// Whether this failure took the connection it ran on with it.
    ///
    /// Retry logic uses this to decide between discarding a pooled
    /// session and giving up.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        match self {
            Self::Imap(err) => err.is_transport(),
            Self::Io(_) | Self::Store(_) => false,
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
