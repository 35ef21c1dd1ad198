//! Tokenizer over the receive window.
//!
//! Tokens are pulled lazily: the stream refills the buffer exactly
//! when a token needs bytes that have not arrived yet, so token
//! boundaries never depend on how reads chunked the input. Content
//! tokens are spans recorded in the buffer's token table and copied
//! out only when a response is materialized.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::timeout;

use crate::buffer::{Buffer, FILL_BLOCK_SIZE, FillFailure, TokenId};
use crate::leniency::Leniency;
use crate::observer::SessionObserver;
use crate::{Error, Result};

/// Literals at least this large report download progress.
const PROGRESS_THRESHOLD: usize = 1024;

/// Upper bound on a single `{n}` literal announcement.
const MAX_LITERAL_SIZE: usize = 100 * 1024 * 1024; // 100 MB

/// One lexical element of a response.
///
/// There is no number token: numeric atoms are interpreted by the
/// grammar layer, which knows whether a slot is numeric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Token {
    /// Bare word. `*` and `+` markers arrive as one-byte atoms, and a
    /// section specifier like `BODY[1.2.MIME]<0>` stays one atom.
    Atom(TokenId),
    /// Quoted string content; `escaped` marks content still carrying
    /// backslash escapes.
    Quoted {
        /// Span between the quotes.
        id: TokenId,
        /// Whether the span contains `\` escape pairs.
        escaped: bool,
    },
    /// `{n}` literal payload.
    Literal(TokenId),
    /// The distinguished NIL atom.
    Nil,
    /// `(`.
    Open,
    /// `)`.
    Close,
    /// `[` at token position (status-code trailer).
    OpenBracket,
    /// `]` at token position.
    CloseBracket,
    /// End of line.
    Crlf,
    /// End of data on a buffer with no backing stream.
    End,
}

/// Pulls tokens through a buffer backed by an optional stream.
///
/// With a stream, running out of bytes mid-token blocks on a refill
/// and end-of-stream is a transport error. Without one (re-parsing
/// captured bytes), running out yields [`Token::End`].
pub(crate) struct TokenStream<'a, S> {
    source: Option<&'a mut S>,
    buf: &'a mut Buffer,
    pos: usize,
    read_timeout: Duration,
    observer: &'a mut dyn SessionObserver,
}

impl<'a> TokenStream<'a, tokio::io::Empty> {
    /// A stream over already-received bytes only.
    pub fn socketless(buf: &'a mut Buffer, observer: &'a mut dyn SessionObserver) -> Self {
        Self {
            source: None,
            buf,
            pos: 0,
            read_timeout: Duration::ZERO,
            observer,
        }
    }
}

impl<S> TokenStream<'_, S> {
    /// Window offset of the next unread byte.
    pub const fn pos(&self) -> usize {
        self.pos
    }

    /// Whether every received byte has been consumed.
    pub fn is_drained(&self) -> bool {
        self.pos >= self.buf.len()
    }

    /// The observer attached to this stream.
    pub fn observer(&mut self) -> &mut dyn SessionObserver {
        &mut *self.observer
    }

    /// Drops the token table and lets the buffer reclaim everything
    /// before the cursor. Called once per fully materialized
    /// response; the buffer itself decides whether compaction is
    /// worth it yet.
    pub fn release_consumed(&mut self) {
        self.buf.clear_tokens();
        let freed = self.buf.free(self.pos);
        self.pos -= freed;
    }

    /// Text of an atom token.
    pub fn atom_text(&self, id: TokenId) -> String {
        String::from_utf8_lossy(self.buf.token_bytes(id)).into_owned()
    }

    /// Whether an atom equals `expected`, ASCII case-insensitively.
    pub fn atom_is(&self, id: TokenId, expected: &str) -> bool {
        self.buf.token_bytes(id).eq_ignore_ascii_case(expected.as_bytes())
    }

    /// Content bytes of a content-bearing token.
    pub fn string_bytes(&self, token: Token) -> Vec<u8> {
        match token {
            Token::Atom(id) | Token::Literal(id) | Token::Quoted { id, escaped: false } => {
                self.buf.token_bytes(id).to_vec()
            }
            Token::Quoted { id, escaped: true } => unescape(self.buf.token_bytes(id)),
            _ => Vec::new(),
        }
    }

    /// A grammar error at a window offset.
    pub fn error_at(&self, position: usize, message: impl Into<String>) -> Error {
        Error::Parse {
            position,
            message: message.into(),
        }
    }
}

impl<'a, S: AsyncRead + Unpin> TokenStream<'a, S> {
    /// A stream that refills `buf` from `source` on demand.
    pub fn new(
        source: &'a mut S,
        buf: &'a mut Buffer,
        read_timeout: Duration,
        observer: &'a mut dyn SessionObserver,
    ) -> Self {
        Self {
            source: Some(source),
            buf,
            pos: 0,
            read_timeout,
            observer,
        }
    }

    /// Reads one block from the source into the buffer.
    ///
    /// `Ok(false)` means there is no source to read from. Transport
    /// failures are recorded sticky on the buffer before returning.
    async fn fill(&mut self) -> Result<bool> {
        self.buf.check()?;
        let Some(source) = self.source.as_deref_mut() else {
            return Ok(false);
        };
        let mut chunk = [0u8; FILL_BLOCK_SIZE];
        let read = match timeout(self.read_timeout, source.read(&mut chunk)).await {
            Ok(Ok(n)) => n,
            Ok(Err(err)) => {
                self.buf.set_failure(FillFailure::Io(err.kind()));
                return Err(Error::Receive(err));
            }
            Err(_) => {
                self.buf.set_failure(FillFailure::Timeout(self.read_timeout));
                return Err(Error::Timeout(self.read_timeout));
            }
        };
        if read == 0 {
            self.buf.set_failure(FillFailure::Closed);
            return Err(Error::Disconnected);
        }
        self.buf.extend_from_slice(&chunk[..read]);
        Ok(true)
    }

    /// The byte at window offset `n`, filling as needed. `None` only
    /// on a sourceless stream that ran out.
    async fn byte_at(&mut self, n: usize) -> Result<Option<u8>> {
        while self.buf.len() <= n {
            if !self.fill().await? {
                return Ok(None);
            }
        }
        Ok(self.buf.byte(n))
    }

    /// Like [`Self::byte_at`] where running out is a grammar error.
    async fn require_byte(&mut self, n: usize) -> Result<u8> {
        self.byte_at(n)
            .await?
            .ok_or_else(|| self.error_at(n, "unexpected end of input"))
    }

    async fn skip_spaces(&mut self) -> Result<()> {
        while self.byte_at(self.pos).await? == Some(b' ') {
            self.pos += 1;
        }
        Ok(())
    }

    /// The first byte of the next token, without consuming it.
    pub async fn peek(&mut self) -> Result<Option<u8>> {
        self.skip_spaces().await?;
        self.byte_at(self.pos).await
    }

    /// The byte under the cursor, spaces included.
    pub async fn peek_raw(&mut self) -> Result<Option<u8>> {
        self.byte_at(self.pos).await
    }

    /// Reads the next token.
    pub async fn next_token(&mut self) -> Result<Token> {
        self.skip_spaces().await?;
        let Some(byte) = self.byte_at(self.pos).await? else {
            return Ok(Token::End);
        };
        match byte {
            b'\r' => {
                if self.require_byte(self.pos + 1).await? == b'\n' {
                    self.pos += 2;
                    Ok(Token::Crlf)
                } else {
                    Err(self.error_at(self.pos, "CR without LF"))
                }
            }
            b'(' => {
                self.pos += 1;
                Ok(Token::Open)
            }
            b')' => {
                self.pos += 1;
                Ok(Token::Close)
            }
            b'[' => {
                self.pos += 1;
                Ok(Token::OpenBracket)
            }
            b']' => {
                self.pos += 1;
                Ok(Token::CloseBracket)
            }
            b'"' => self.read_quoted().await,
            b'{' => self.read_literal().await,
            b'\n' => Err(self.error_at(self.pos, "bare LF")),
            _ => self.read_atom().await,
        }
    }

    /// Reads an atom. `(`, `)` and `]` end it even without a space
    /// before them ([`Leniency::ListSeparatorSlack`] servers rely on
    /// that); a `[` mid-atom swallows a section specifier through its
    /// closing `]`.
    async fn read_atom(&mut self) -> Result<Token> {
        let start = self.pos;
        loop {
            let Some(byte) = self.byte_at(self.pos).await? else {
                break;
            };
            match byte {
                b'(' => {
                    // iMAIL writes the next list right against the atom.
                    Leniency::ListSeparatorSlack.note();
                    break;
                }
                b' ' | b'\r' | b'\n' | b')' | b']' | b'"' | b'{' => break,
                b'[' => {
                    self.pos += 1;
                    loop {
                        let inner = self.require_byte(self.pos).await?;
                        self.pos += 1;
                        if inner == b']' {
                            break;
                        }
                    }
                }
                0x00..=0x1f | 0x7f => {
                    return Err(self.error_at(self.pos, "control byte in atom"));
                }
                _ => self.pos += 1,
            }
        }
        let id = self.buf.add_token(start, self.pos - start);
        if self.buf.token_bytes(id).eq_ignore_ascii_case(b"NIL") {
            Ok(Token::Nil)
        } else {
            Ok(Token::Atom(id))
        }
    }

    /// Reads a quoted string.
    ///
    /// A `"` terminates the string only when followed by a space,
    /// separator, or line end; anywhere else it is content
    /// ([`Leniency::EarlyQuoteTermination`]). A CR before any closing
    /// quote also terminates.
    async fn read_quoted(&mut self) -> Result<Token> {
        self.pos += 1;
        let start = self.pos;
        let mut escaped = false;
        loop {
            let byte = self.require_byte(self.pos).await?;
            match byte {
                b'"' => match self.byte_at(self.pos + 1).await? {
                    None | Some(b' ' | b'(' | b')' | b']' | b'\r') => break,
                    Some(_) => {
                        Leniency::EarlyQuoteTermination.note();
                        self.pos += 1;
                    }
                },
                b'\\' => {
                    self.require_byte(self.pos + 1).await?;
                    escaped = true;
                    self.pos += 2;
                }
                b'\r' | b'\n' => {
                    Leniency::EarlyQuoteTermination.note();
                    break;
                }
                _ => self.pos += 1,
            }
        }
        let id = self.buf.add_token(start, self.pos - start);
        if self.buf.byte(self.pos) == Some(b'"') {
            self.pos += 1;
        }
        Ok(Token::Quoted { id, escaped })
    }

    /// Reads a `{n}` announcement, the CRLF after it, and the n-byte
    /// payload. Large payloads report progress to the observer.
    async fn read_literal(&mut self) -> Result<Token> {
        self.pos += 1;
        let digits_start = self.pos;
        loop {
            let byte = self.require_byte(self.pos).await?;
            if byte == b'}' {
                break;
            }
            if !byte.is_ascii_digit() {
                return Err(self.error_at(self.pos, "non-digit in literal size"));
            }
            self.pos += 1;
        }
        let digits = self.buf.slice(digits_start, self.pos - digits_start);
        let size: usize = std::str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| self.error_at(digits_start, "invalid literal size"))?;
        if size > MAX_LITERAL_SIZE {
            return Err(self.error_at(
                digits_start,
                format!("literal too large: {size} bytes (max {MAX_LITERAL_SIZE})"),
            ));
        }
        self.pos += 1;
        if self.require_byte(self.pos).await? != b'\r'
            || self.require_byte(self.pos + 1).await? != b'\n'
        {
            return Err(self.error_at(self.pos, "expected CRLF after literal size"));
        }
        self.pos += 2;

        let start = self.pos;
        let report = size >= PROGRESS_THRESHOLD;
        if report {
            self.observer.progress_start(size);
        }
        while self.buf.len() < start + size {
            if !self.fill().await? {
                return Err(self.error_at(self.buf.len(), "literal truncated"));
            }
            if report {
                self.observer.progress((self.buf.len() - start).min(size));
            }
        }
        if report {
            self.observer.progress(size);
        }
        self.pos = start + size;
        Ok(Token::Literal(self.buf.add_token(start, size)))
    }

    /// Reads free text up to and including the line's CRLF.
    pub async fn read_text_line(&mut self) -> Result<String> {
        let start = self.pos;
        loop {
            match self.byte_at(self.pos).await? {
                None => break,
                Some(b'\r') => {
                    if self.require_byte(self.pos + 1).await? == b'\n' {
                        break;
                    }
                    self.pos += 1;
                }
                Some(_) => self.pos += 1,
            }
        }
        let text = String::from_utf8_lossy(self.buf.slice(start, self.pos - start)).into_owned();
        if self.buf.byte(self.pos) == Some(b'\r') {
            self.pos += 2;
        }
        Ok(text)
    }
}

/// Resolves `\"` and `\\` escape pairs.
fn unescape(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut iter = bytes.iter().copied();
    while let Some(byte) = iter.next() {
        if byte == b'\\' {
            if let Some(next) = iter.next() {
                out.push(next);
            }
        } else {
            out.push(byte);
        }
    }
    out
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

    use crate::observer::{CollectingObserver, NoopObserver};

    use super::*;

    /// Owned snapshot of a token for comparisons.
    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Tok {
        Atom(Vec<u8>),
        Quoted(Vec<u8>),
        Literal(Vec<u8>),
        Nil,
        Open,
        Close,
        OpenBracket,
        CloseBracket,
        Crlf,
        End,
    }

    fn snapshot<S>(ts: &TokenStream<'_, S>, token: Token) -> Tok {
        match token {
            Token::Atom(_) => Tok::Atom(ts.string_bytes(token)),
            Token::Quoted { .. } => Tok::Quoted(ts.string_bytes(token)),
            Token::Literal(_) => Tok::Literal(ts.string_bytes(token)),
            Token::Nil => Tok::Nil,
            Token::Open => Tok::Open,
            Token::Close => Tok::Close,
            Token::OpenBracket => Tok::OpenBracket,
            Token::CloseBracket => Tok::CloseBracket,
            Token::Crlf => Tok::Crlf,
            Token::End => Tok::End,
        }
    }

    async fn lex_bytes(input: &[u8]) -> Vec<Tok> {
        let mut buf = Buffer::from_bytes(input);
        let mut observer = NoopObserver;
        let mut ts = TokenStream::socketless(&mut buf, &mut observer);
        let mut out = Vec::new();
        loop {
            let token = ts.next_token().await.unwrap();
            let snap = snapshot(&ts, token);
            let done = snap == Tok::End;
            out.push(snap);
            if done {
                break;
            }
        }
        out
    }

    async fn lex_chunked(chunks: &[Vec<u8>], until_crlf_count: usize) -> Vec<Tok> {
        let mut builder = tokio_test::io::Builder::new();
        for chunk in chunks {
            builder.read(chunk);
        }
        let mut mock = builder.build();
        let mut buf = Buffer::new();
        let mut observer = NoopObserver;
        let mut ts = TokenStream::new(&mut mock, &mut buf, Duration::from_secs(5), &mut observer);
        let mut out = Vec::new();
        let mut lines = 0;
        while lines < until_crlf_count {
            let token = ts.next_token().await.unwrap();
            let snap = snapshot(&ts, token);
            if snap == Tok::Crlf {
                lines += 1;
            }
            out.push(snap);
        }
        out
    }

    #[tokio::test]
    async fn lexes_a_tagged_line() {
        let toks = lex_bytes(b"q0001 OK done\r\n").await;
        assert_eq!(
            toks,
            vec![
                Tok::Atom(b"q0001".to_vec()),
                Tok::Atom(b"OK".to_vec()),
                Tok::Atom(b"done".to_vec()),
                Tok::Crlf,
                Tok::End,
            ]
        );
    }

    #[tokio::test]
    async fn star_and_plus_are_atoms() {
        let toks = lex_bytes(b"* 3 EXISTS\r\n+ go\r\n").await;
        assert_eq!(toks[0], Tok::Atom(b"*".to_vec()));
        assert_eq!(toks[1], Tok::Atom(b"3".to_vec()));
        assert_eq!(toks[4], Tok::Atom(b"+".to_vec()));
    }

    #[tokio::test]
    async fn section_atom_keeps_brackets() {
        let toks = lex_bytes(b"BODY[HEADER.FIELDS (From To)]<0> ").await;
        assert_eq!(toks[0], Tok::Atom(b"BODY[HEADER.FIELDS (From To)]<0>".to_vec()));
    }

    #[tokio::test]
    async fn bracket_tokens_outside_atoms() {
        let toks = lex_bytes(b"[UIDNEXT 4392]").await;
        assert_eq!(
            toks,
            vec![
                Tok::OpenBracket,
                Tok::Atom(b"UIDNEXT".to_vec()),
                Tok::Atom(b"4392".to_vec()),
                Tok::CloseBracket,
                Tok::End,
            ]
        );
    }

    #[tokio::test]
    async fn nil_is_case_insensitive() {
        let toks = lex_bytes(b"NIL nil NiL").await;
        assert_eq!(toks, vec![Tok::Nil, Tok::Nil, Tok::Nil, Tok::End]);
    }

    #[tokio::test]
    async fn parens_separate_without_spaces() {
        let toks = lex_bytes(b"(\\Seen)(\\Deleted)").await;
        assert_eq!(
            toks,
            vec![
                Tok::Open,
                Tok::Atom(b"\\Seen".to_vec()),
                Tok::Close,
                Tok::Open,
                Tok::Atom(b"\\Deleted".to_vec()),
                Tok::Close,
                Tok::End,
            ]
        );
    }

    mod quoted_tests {
        use super::*;

        #[tokio::test]
        async fn plain() {
            let toks = lex_bytes(b"\"hello world\" ").await;
            assert_eq!(toks[0], Tok::Quoted(b"hello world".to_vec()));
        }

        #[tokio::test]
        async fn escapes_resolve() {
            let toks = lex_bytes(b"\"a \\\"b\\\" \\\\c\" ").await;
            assert_eq!(toks[0], Tok::Quoted(b"a \"b\" \\c".to_vec()));
        }

        #[tokio::test]
        async fn inner_quote_before_text_is_content() {
            // iMAIL sends unescaped quotes inside quoted strings.
            let toks = lex_bytes(b"\"ab\"cd\" ").await;
            assert_eq!(toks[0], Tok::Quoted(b"ab\"cd".to_vec()));
        }

        #[tokio::test]
        async fn line_end_terminates_unclosed_string() {
            let toks = lex_bytes(b"\"abandoned\r\n").await;
            assert_eq!(toks[0], Tok::Quoted(b"abandoned".to_vec()));
            assert_eq!(toks[1], Tok::Crlf);
        }

        #[tokio::test]
        async fn quote_before_close_paren_terminates() {
            let toks = lex_bytes(b"(\"x\")").await;
            assert_eq!(
                toks,
                vec![
                    Tok::Open,
                    Tok::Quoted(b"x".to_vec()),
                    Tok::Close,
                    Tok::End,
                ]
            );
        }
    }

    mod literal_tests {
        use super::*;

        #[tokio::test]
        async fn payload_bytes_are_exact() {
            let toks = lex_bytes(b"{11}\r\nhello world ").await;
            assert_eq!(toks[0], Tok::Literal(b"hello world".to_vec()));
        }

        #[tokio::test]
        async fn payload_may_contain_crlf() {
            let toks = lex_bytes(b"{6}\r\na\r\nb\r\n\r\n").await;
            assert_eq!(toks[0], Tok::Literal(b"a\r\nb\r\n".to_vec()));
            assert_eq!(toks[1], Tok::Crlf);
        }

        #[tokio::test]
        async fn non_digit_size_fails() {
            let mut buf = Buffer::from_bytes(b"{1x}\r\ny");
            let mut observer = NoopObserver;
            let mut ts = TokenStream::socketless(&mut buf, &mut observer);
            assert!(matches!(
                ts.next_token().await,
                Err(Error::Parse { .. })
            ));
        }

        #[tokio::test]
        async fn truncated_payload_fails_without_source() {
            let mut buf = Buffer::from_bytes(b"{10}\r\nshort");
            let mut observer = NoopObserver;
            let mut ts = TokenStream::socketless(&mut buf, &mut observer);
            assert!(matches!(
                ts.next_token().await,
                Err(Error::Parse { .. })
            ));
        }

        #[tokio::test]
        async fn large_literal_reports_progress() {
            let payload = vec![b'x'; 2048];
            let mut input = b"{2048}\r\n".to_vec();
            input.extend_from_slice(&payload);
            input.extend_from_slice(b"\r\n");

            let chunks: Vec<Vec<u8>> = input.chunks(512).map(<[u8]>::to_vec).collect();
            let mut builder = tokio_test::io::Builder::new();
            for chunk in &chunks {
                builder.read(chunk);
            }
            let mut mock = builder.build();
            let mut buf = Buffer::new();
            let mut observer = CollectingObserver::new();
            let mut ts =
                TokenStream::new(&mut mock, &mut buf, Duration::from_secs(5), &mut observer);

            let token = ts.next_token().await.unwrap();
            assert!(matches!(token, Token::Literal(_)));
            assert_eq!(ts.string_bytes(token).len(), 2048);
            assert_eq!(ts.next_token().await.unwrap(), Token::Crlf);

            assert_eq!(observer.progress.last(), Some(&(2048, 2048)));
            assert!(observer.progress.iter().all(|&(done, total)| done <= total));
        }
    }

    mod transport_tests {
        use super::*;

        #[tokio::test]
        async fn peer_close_mid_token_is_disconnect() {
            let mut mock = tokio_test::io::Builder::new().read(b"* OK par").build();
            let mut buf = Buffer::new();
            let mut observer = NoopObserver;
            let mut ts =
                TokenStream::new(&mut mock, &mut buf, Duration::from_secs(5), &mut observer);

            assert!(matches!(ts.next_token().await, Ok(Token::Atom(_))));
            assert!(matches!(ts.next_token().await, Ok(Token::Atom(_))));
            // "par" has no terminator; the next read hits EOF.
            assert!(matches!(ts.next_token().await, Err(Error::Disconnected)));
        }

        #[tokio::test]
        async fn failure_sticks_to_the_buffer() {
            let mut mock = tokio_test::io::Builder::new().build();
            let mut buf = Buffer::new();
            {
                let mut observer = NoopObserver;
                let mut ts =
                    TokenStream::new(&mut mock, &mut buf, Duration::from_secs(5), &mut observer);
                assert!(matches!(ts.next_token().await, Err(Error::Disconnected)));
            }
            assert!(buf.is_failed());
            assert!(matches!(buf.check(), Err(Error::Disconnected)));
        }
    }

    #[tokio::test]
    async fn release_consumed_keeps_cursor_consistent() {
        let mut line = Vec::new();
        line.extend_from_slice(b"* OK ");
        line.extend_from_slice(&vec![b'x'; 200_000]);
        line.extend_from_slice(b"\r\n* 2 EXISTS\r\n");

        let mut buf = Buffer::from_bytes(&line);
        let mut observer = NoopObserver;
        let mut ts = TokenStream::socketless(&mut buf, &mut observer);
        loop {
            if ts.next_token().await.unwrap() == Token::Crlf {
                break;
            }
        }
        let before = ts.pos();
        ts.release_consumed();
        assert!(ts.pos() < before);

        let token = ts.next_token().await.unwrap();
        assert_eq!(ts.string_bytes(token), b"*");
        let token = ts.next_token().await.unwrap();
        assert_eq!(ts.string_bytes(token), b"2");
        let token = ts.next_token().await.unwrap();
        assert_eq!(ts.string_bytes(token), b"EXISTS");
    }

    proptest! {
        /// Chunking the input differently never changes the token
        /// sequence.
        #[test]
        fn chunking_invariance(splits in proptest::collection::vec(1usize..12, 0..8)) {
            let line: &[u8] = b"* 2 FETCH (FLAGS (\\Seen) BODY[1] {11}\r\nhello world UID 7)\r\n";

            let mut chunks: Vec<Vec<u8>> = Vec::new();
            let mut rest = line;
            for split in splits {
                if split >= rest.len() {
                    break;
                }
                let (head, tail) = rest.split_at(split);
                chunks.push(head.to_vec());
                rest = tail;
            }
            chunks.push(rest.to_vec());

            let (chunked, whole) = tokio_test::block_on(async {
                (lex_chunked(&chunks, 1).await, lex_bytes(line).await)
            });
            // The sourceless lex appends End after the final CRLF.
            prop_assert_eq!(&chunked[..], &whole[..whole.len() - 1]);
        }
    }
}
