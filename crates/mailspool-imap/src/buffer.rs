//! Receive window over bytes already read from the server.
//!
//! The buffer grows as the lexer pulls more data and is compacted only
//! when enough consumed bytes have accumulated to make the copy worth
//! it. Consumers that need to refer back to a byte range without
//! copying record a [`TokenId`] whose offsets are rebased on every
//! compaction, so a token keeps resolving to the same bytes for as
//! long as those bytes are in the window.

use std::time::Duration;

use bytes::{Buf, BytesMut};

use crate::{Error, Result};

/// Unit the lexer requests from the socket per refill.
pub(crate) const FILL_BLOCK_SIZE: usize = 8192;

/// Minimum number of consumed bytes before [`Buffer::free`] compacts.
const COMPACT_MIN_BYTES: usize = 128 * 1024;

/// Handle to a recorded (offset, length) span in a [`Buffer`].
///
/// Valid until the span's bytes are freed; rebased automatically when
/// the buffer compacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenId(usize);

#[derive(Debug, Clone, Copy)]
struct Span {
    offset: usize,
    len: usize,
}

/// Why a fill from the underlying stream failed.
///
/// Stored sticky: once a fill fails, every later operation on the
/// buffer reports the same failure until the buffer is discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FillFailure {
    /// The read returned an error.
    Io(std::io::ErrorKind),
    /// The read did not complete within the configured timeout.
    Timeout(Duration),
    /// The peer closed the connection.
    Closed,
}

impl FillFailure {
    fn to_error(self) -> Error {
        match self {
            Self::Io(kind) => Error::Receive(kind.into()),
            Self::Timeout(after) => Error::Timeout(after),
            Self::Closed => Error::Disconnected,
        }
    }
}

/// Growable byte window with token-offset bookkeeping.
#[derive(Debug, Default)]
pub struct Buffer {
    data: BytesMut,
    tokens: Vec<Span>,
    failure: Option<FillFailure>,
}

impl Buffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: BytesMut::with_capacity(FILL_BLOCK_SIZE),
            tokens: Vec::new(),
            failure: None,
        }
    }

    /// Creates a buffer pre-filled with `bytes` and no backing stream.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            data: BytesMut::from(bytes),
            tokens: Vec::new(),
            failure: None,
        }
    }

    /// Number of bytes currently in the window.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the window is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The byte at window offset `n`, or `None` when `n` is past the
    /// data received so far (the caller refills and retries).
    #[must_use]
    pub fn byte(&self, n: usize) -> Option<u8> {
        self.data.get(n).copied()
    }

    /// Scans forward from `from` for a single byte.
    #[must_use]
    pub fn find_byte(&self, wanted: u8, from: usize) -> Option<usize> {
        self.data
            .get(from..)?
            .iter()
            .position(|&b| b == wanted)
            .map(|i| from + i)
    }

    /// Scans forward from `from` for a byte sequence.
    #[must_use]
    pub fn find(&self, needle: &[u8], from: usize) -> Option<usize> {
        if needle.is_empty() {
            return Some(from);
        }
        let haystack = self.data.get(from..)?;
        haystack
            .windows(needle.len())
            .position(|w| w == needle)
            .map(|i| from + i)
    }

    /// Borrows the byte range `[pos, pos + len)`.
    ///
    /// The range must lie within the received window.
    #[must_use]
    pub fn slice(&self, pos: usize, len: usize) -> &[u8] {
        &self.data[pos..pos + len]
    }

    /// Copies the byte range `[pos, pos + len)` out of the window.
    #[must_use]
    pub fn substr(&self, pos: usize, len: usize) -> Vec<u8> {
        self.slice(pos, len).to_vec()
    }

    /// Appends freshly received bytes to the window.
    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Records a span for zero-copy deferred access.
    pub fn add_token(&mut self, offset: usize, len: usize) -> TokenId {
        debug_assert!(offset + len <= self.data.len());
        self.tokens.push(Span { offset, len });
        TokenId(self.tokens.len() - 1)
    }

    /// Resolves a token back to its bytes.
    #[must_use]
    pub fn token_bytes(&self, id: TokenId) -> &[u8] {
        let span = self.tokens[id.0];
        &self.data[span.offset..span.offset + span.len]
    }

    /// Length of a token's span.
    #[must_use]
    pub fn token_len(&self, id: TokenId) -> usize {
        self.tokens[id.0].len
    }

    /// Drops all recorded tokens. Called once a response batch has
    /// been materialized and its spans are no longer needed.
    pub fn clear_tokens(&mut self) {
        self.tokens.clear();
    }

    /// Discards the first `consumed` bytes if doing so removes at
    /// least 128 KiB or at least 90% of the window; otherwise leaves
    /// the window untouched. Returns the number of bytes discarded so
    /// the caller can rebase its own cursor; all recorded token
    /// offsets are rebased here.
    ///
    /// Freeing past a live token's span invalidates that token.
    pub fn free(&mut self, consumed: usize) -> usize {
        let consumed = consumed.min(self.data.len());
        if consumed < COMPACT_MIN_BYTES && consumed * 10 < self.data.len() * 9 {
            return 0;
        }
        self.data.advance(consumed);
        for span in &mut self.tokens {
            span.offset = span.offset.saturating_sub(consumed);
        }
        consumed
    }

    /// Marks the buffer failed. Every later check reports this
    /// failure until the buffer is discarded.
    pub(crate) fn set_failure(&mut self, failure: FillFailure) {
        if self.failure.is_none() {
            self.failure = Some(failure);
        }
    }

    /// Returns the sticky failure as an error, if one is set.
    pub(crate) fn check(&self) -> Result<()> {
        match self.failure {
            Some(failure) => Err(failure.to_error()),
            None => Ok(()),
        }
    }

    /// Whether a fill has failed on this buffer.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
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
    use proptest::prelude::*;

    use super::*;

    mod window_tests {
        use super::*;

        #[test]
        fn byte_within_and_past_window() {
            let buf = Buffer::from_bytes(b"abc");
            assert_eq!(buf.byte(0), Some(b'a'));
            assert_eq!(buf.byte(2), Some(b'c'));
            assert_eq!(buf.byte(3), None);
        }

        #[test]
        fn find_byte_from_offset() {
            let buf = Buffer::from_bytes(b"a OK done\r\n");
            assert_eq!(buf.find_byte(b'O', 0), Some(2));
            assert_eq!(buf.find_byte(b'O', 3), None);
            assert_eq!(buf.find_byte(b'\r', 0), Some(9));
        }

        #[test]
        fn find_sequence() {
            let buf = Buffer::from_bytes(b"xx}\r\nrest");
            assert_eq!(buf.find(b"}\r\n", 0), Some(2));
            assert_eq!(buf.find(b"}\r\n", 3), None);
        }

        #[test]
        fn substr_copies_range() {
            let buf = Buffer::from_bytes(b"hello world");
            assert_eq!(buf.substr(6, 5), b"world");
        }

        #[test]
        fn extend_grows_window() {
            let mut buf = Buffer::new();
            buf.extend_from_slice(b"par");
            buf.extend_from_slice(b"tial");
            assert_eq!(buf.len(), 7);
            assert_eq!(buf.substr(0, 7), b"partial");
        }
    }

    mod free_tests {
        use super::*;

        #[test]
        fn below_both_thresholds_is_noop() {
            let mut buf = Buffer::from_bytes(&vec![b'x'; 1000]);
            assert_eq!(buf.free(100), 0);
            assert_eq!(buf.len(), 1000);
        }

        #[test]
        fn ninety_percent_of_window_compacts() {
            let mut buf = Buffer::from_bytes(&vec![b'x'; 1000]);
            assert_eq!(buf.free(900), 900);
            assert_eq!(buf.len(), 100);
        }

        #[test]
        fn large_consumed_count_compacts() {
            let mut data = vec![b'x'; COMPACT_MIN_BYTES + 4096];
            data[COMPACT_MIN_BYTES] = b'!';
            let mut buf = Buffer::from_bytes(&data);
            assert_eq!(buf.free(COMPACT_MIN_BYTES), COMPACT_MIN_BYTES);
            assert_eq!(buf.byte(0), Some(b'!'));
        }

        #[test]
        fn consumed_clamped_to_window() {
            let mut buf = Buffer::from_bytes(b"ab");
            assert_eq!(buf.free(10), 2);
            assert!(buf.is_empty());
        }
    }

    mod token_tests {
        use super::*;

        #[test]
        fn token_resolves_to_recorded_bytes() {
            let mut buf = Buffer::from_bytes(b"* OK ready\r\n");
            let tok = buf.add_token(2, 2);
            assert_eq!(buf.token_bytes(tok), b"OK");
        }

        #[test]
        fn token_survives_compaction() {
            let mut data = vec![b'.'; 1000];
            data[950..955].copy_from_slice(b"token");
            let mut buf = Buffer::from_bytes(&data);
            let tok = buf.add_token(950, 5);

            assert_eq!(buf.free(900), 900);
            assert_eq!(buf.token_bytes(tok), b"token");
        }

        #[test]
        fn clear_tokens_resets_table() {
            let mut buf = Buffer::from_bytes(b"abc");
            buf.add_token(0, 1);
            buf.clear_tokens();
            let tok = buf.add_token(1, 2);
            assert_eq!(buf.token_bytes(tok), b"bc");
        }
    }

    mod failure_tests {
        use super::*;

        #[test]
        fn failure_is_sticky() {
            let mut buf = Buffer::new();
            assert!(buf.check().is_ok());

            buf.set_failure(FillFailure::Closed);
            assert!(matches!(buf.check(), Err(Error::Disconnected)));
            assert!(matches!(buf.check(), Err(Error::Disconnected)));
        }

        #[test]
        fn first_failure_wins() {
            let mut buf = Buffer::new();
            buf.set_failure(FillFailure::Timeout(Duration::from_secs(3)));
            buf.set_failure(FillFailure::Closed);
            assert!(matches!(buf.check(), Err(Error::Timeout(_))));
        }
    }

    proptest! {
        /// Tokens recorded behind the consumed point keep resolving to
        /// the same bytes across any permitted sequence of
        /// compactions.
        #[test]
        fn tokens_stable_across_frees(
            prefix in 0usize..2000,
            body in proptest::collection::vec(any::<u8>(), 1..64),
            frees in proptest::collection::vec(0usize..2500, 0..4),
        ) {
            let mut data = vec![b'-'; prefix];
            data.extend_from_slice(&body);
            let mut buf = Buffer::from_bytes(&data);
            let tok = buf.add_token(prefix, body.len());

            let mut consumed_total = 0;
            for f in frees {
                let f = f.min(prefix - consumed_total);
                consumed_total += buf.free(f);
            }
            prop_assert_eq!(buf.token_bytes(tok), body.as_slice());
        }
    }
}
