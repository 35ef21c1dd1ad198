//! Two-stage response parser.
//!
//! The lexer pulls tokens out of the receive window on demand; this
//! module assembles them into [`Response`] values. Parenthesized data
//! is first collected into an [`Element`] tree, then interpreted once
//! the whole structure is in memory, so the grammar code stays
//! synchronous and only the token pull is async.

pub(crate) mod lexer;
mod response;

use std::time::Duration;

use tokio::io::AsyncRead;

use crate::buffer::Buffer;
use crate::observer::SessionObserver;
use crate::Result;

use lexer::{Token, TokenStream};

pub use response::types::{
    Address, BodySection, BodyStructure, Condition, Envelope, FetchData, FetchDataBody,
    FetchResponse, ListAttributes, ListItem, Namespace, NamespaceEntry, Response, ResponseCode,
    SectionKind, State, StatusResponse,
};

/// One node of a parenthesized response structure.
///
/// Atoms keep their text, strings and literals their bytes. Which one
/// a slot means is decided during interpretation, where the grammar
/// position is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Element {
    /// Bare word, section specifiers included.
    Atom(String),
    /// Quoted string or literal content.
    Bytes(Vec<u8>),
    /// NIL.
    Nil,
    /// Nested parenthesized list.
    List(Vec<Element>),
}

/// Collects elements up to the matching `)`. The opening `(` must
/// already be consumed.
pub(crate) async fn parse_list<S: AsyncRead + Unpin>(
    ts: &mut TokenStream<'_, S>,
) -> Result<Vec<Element>> {
    let mut elements = Vec::new();
    loop {
        let token = ts.next_token().await?;
        match token {
            Token::Close => return Ok(elements),
            Token::Open => {
                let inner = Box::pin(parse_list(ts)).await?;
                elements.push(Element::List(inner));
            }
            Token::Atom(id) => elements.push(Element::Atom(ts.atom_text(id))),
            Token::Quoted { .. } | Token::Literal(_) => {
                elements.push(Element::Bytes(ts.string_bytes(token)));
            }
            Token::Nil => elements.push(Element::Nil),
            Token::Crlf => return Err(ts.error_at(ts.pos(), "line ended inside a list")),
            Token::OpenBracket | Token::CloseBracket => {
                return Err(ts.error_at(ts.pos(), "bracket inside a list"));
            }
            Token::End => return Err(ts.error_at(ts.pos(), "unexpected end of input")),
        }
    }
}

/// Reads whole responses off a connection.
///
/// One parser instance covers one command exchange; it borrows the
/// stream, the receive window, and the session observer for that
/// long.
pub(crate) struct Parser<'a, S> {
    tokens: TokenStream<'a, S>,
}

impl<'a> Parser<'a, tokio::io::Empty> {
    /// A parser over already-received bytes only.
    pub fn socketless(buf: &'a mut Buffer, observer: &'a mut dyn SessionObserver) -> Self {
        Self {
            tokens: TokenStream::socketless(buf, observer),
        }
    }
}

impl<'a, S: AsyncRead + Unpin> Parser<'a, S> {
    /// A parser that refills `buf` from `source` as tokens need bytes.
    pub fn new(
        source: &'a mut S,
        buf: &'a mut Buffer,
        read_timeout: Duration,
        observer: &'a mut dyn SessionObserver,
    ) -> Self {
        Self {
            tokens: TokenStream::new(source, buf, read_timeout, observer),
        }
    }

    /// Reads responses until the line tagged `tag` arrives.
    ///
    /// Every materialized response is reported to the observer. With
    /// `allow_continuation`, a `+` line ends the exchange instead; the
    /// caller sends its payload and parses again. A tagged line for a
    /// different tag is kept and parsing continues.
    pub async fn parse(&mut self, tag: &str, allow_continuation: bool) -> Result<Vec<Response>> {
        let mut responses = Vec::new();
        loop {
            let token = self.tokens.next_token().await?;
            match token {
                Token::Atom(id) if self.tokens.atom_is(id, "*") => {
                    if let Some(response) = response::untagged(&mut self.tokens).await? {
                        self.tokens.observer().on_response(&response);
                        responses.push(response);
                    }
                }
                Token::Atom(id) if self.tokens.atom_is(id, "+") => {
                    if !allow_continuation {
                        return Err(self
                            .tokens
                            .error_at(self.tokens.pos(), "unexpected continuation request"));
                    }
                    let text = self.tokens.read_text_line().await?;
                    let text = text.strip_prefix(' ').unwrap_or(text.as_str()).to_string();
                    let response = Response::Continue {
                        text: if text.is_empty() { None } else { Some(text) },
                    };
                    self.tokens.observer().on_response(&response);
                    responses.push(response);
                    return Ok(responses);
                }
                Token::Atom(id) => {
                    let line_tag = self.tokens.atom_text(id);
                    let state = self.tagged(line_tag).await?;
                    let done = state.tag.as_deref() == Some(tag);
                    if !done {
                        tracing::debug!(tag = ?state.tag, expected = %tag, "status for another tag");
                    }
                    let response = Response::State(state);
                    self.tokens.observer().on_response(&response);
                    responses.push(response);
                    if done {
                        return Ok(responses);
                    }
                }
                Token::Crlf => {}
                Token::End => return Ok(responses),
                _ => {
                    return Err(self
                        .tokens
                        .error_at(self.tokens.pos(), "expected tagged or untagged response"));
                }
            }
            self.tokens.release_consumed();
        }
    }

    /// Reads the server greeting: one untagged OK, PREAUTH, or BYE
    /// status line.
    pub async fn parse_greeting(&mut self) -> Result<State> {
        let token = self.tokens.next_token().await?;
        match token {
            Token::Atom(id) if self.tokens.atom_is(id, "*") => {}
            _ => {
                return Err(self
                    .tokens
                    .error_at(self.tokens.pos(), "greeting is not untagged"));
            }
        }
        let response = response::untagged(&mut self.tokens).await?;
        let Some(Response::State(state)) = response else {
            return Err(self
                .tokens
                .error_at(self.tokens.pos(), "greeting is not a status line"));
        };
        self.tokens
            .observer()
            .on_response(&Response::State(state.clone()));
        self.tokens.release_consumed();
        Ok(state)
    }

    /// Parses the rest of a tagged line, after its tag atom.
    async fn tagged(&mut self, tag: String) -> Result<State> {
        let token = self.tokens.next_token().await?;
        let Token::Atom(id) = token else {
            return Err(self
                .tokens
                .error_at(self.tokens.pos(), "expected condition after tag"));
        };
        let word = self.tokens.atom_text(id);
        let Some(condition) = response::condition_of(&word) else {
            return Err(self
                .tokens
                .error_at(self.tokens.pos(), format!("unknown condition {word}")));
        };
        response::status_rest(&mut self.tokens, Some(tag), condition).await
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
    use crate::observer::{CollectingObserver, NoopObserver};
    use crate::types::Flags;

    use super::*;

    async fn parse_all(input: &[u8], tag: &str) -> Vec<Response> {
        let mut buf = Buffer::from_bytes(input);
        let mut observer = NoopObserver;
        let mut parser = Parser::socketless(&mut buf, &mut observer);
        parser.parse(tag, false).await.unwrap()
    }

    #[tokio::test]
    async fn collects_untagged_until_the_tag() {
        let responses = parse_all(
            b"* 3 EXISTS\r\n* 1 RECENT\r\nq0001 OK SELECT done\r\n",
            "q0001",
        )
        .await;
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0], Response::Exists(3));
        assert_eq!(responses[1], Response::Recent(1));
        let Response::State(state) = &responses[2] else {
            panic!("expected a tagged status");
        };
        assert!(state.is_ok());
        assert_eq!(state.tag.as_deref(), Some("q0001"));
    }

    #[tokio::test]
    async fn keeps_a_status_for_another_tag() {
        let responses = parse_all(b"q0001 OK late\r\nq0002 OK now\r\n", "q0002").await;
        assert_eq!(responses.len(), 2);
        let Response::State(state) = &responses[1] else {
            panic!("expected a tagged status");
        };
        assert_eq!(state.tag.as_deref(), Some("q0002"));
    }

    #[tokio::test]
    async fn fetch_data_rides_the_untagged_stream() {
        let responses = parse_all(
            b"* 3 EXISTS\r\n* 2 FETCH (UID 9 FLAGS (\\Seen))\r\na1 OK done\r\n",
            "a1",
        )
        .await;
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0], Response::Exists(3));
        let Response::Fetch(fetch) = &responses[1] else {
            panic!("expected fetch data");
        };
        assert_eq!(fetch.number, 2);
        assert_eq!(fetch.uid, Some(9));
        assert_eq!(fetch.flags().map(Flags::bits), Some(Flags::SEEN));
        let Response::State(state) = &responses[2] else {
            panic!("expected a tagged status");
        };
        assert!(state.is_ok());
    }

    #[tokio::test]
    async fn same_transcript_parses_identically() {
        let transcript: &[u8] = b"* CAPABILITY IMAP4rev1 NAMESPACE\r\n\
            * 2 FETCH (UID 7 RFC822.SIZE 512)\r\n\
            * SEARCH 2 4 6\r\n\
            q0003 OK [READ-WRITE] done\r\n";
        let first = parse_all(transcript, "q0003").await;
        let second = parse_all(transcript, "q0003").await;
        assert_eq!(first, second);
        assert_eq!(first.len(), 4);
    }

    #[tokio::test]
    async fn observer_sees_every_response() {
        let mut buf = Buffer::from_bytes(b"* 3 EXISTS\r\nq0001 OK done\r\n");
        let mut observer = CollectingObserver::new();
        {
            let mut parser = Parser::socketless(&mut buf, &mut observer);
            let responses = parser.parse("q0001", false).await.unwrap();
            assert_eq!(responses.len(), 2);
        }
        assert_eq!(observer.responses.len(), 2);
        assert_eq!(observer.responses[0], Response::Exists(3));
    }

    #[tokio::test]
    async fn continuation_ends_the_exchange_when_allowed() {
        let mut buf = Buffer::from_bytes(b"+ send literal data\r\n");
        let mut observer = NoopObserver;
        let mut parser = Parser::socketless(&mut buf, &mut observer);
        let responses = parser.parse("q0001", true).await.unwrap();
        assert_eq!(
            responses,
            vec![Response::Continue {
                text: Some("send literal data".to_string()),
            }]
        );
    }

    #[tokio::test]
    async fn continuation_is_an_error_when_not_expected() {
        let mut buf = Buffer::from_bytes(b"+ go ahead\r\n");
        let mut observer = NoopObserver;
        let mut parser = Parser::socketless(&mut buf, &mut observer);
        assert!(parser.parse("q0001", false).await.is_err());
    }

    #[tokio::test]
    async fn bare_continuation_has_no_text() {
        let mut buf = Buffer::from_bytes(b"+\r\n");
        let mut observer = NoopObserver;
        let mut parser = Parser::socketless(&mut buf, &mut observer);
        let responses = parser.parse("q0001", true).await.unwrap();
        assert_eq!(responses, vec![Response::Continue { text: None }]);
    }

    #[tokio::test]
    async fn drained_input_ends_the_parse() {
        let responses = parse_all(b"* 2 EXISTS\r\n", "q0001").await;
        assert_eq!(responses, vec![Response::Exists(2)]);
    }

    mod greeting_tests {
        use super::*;

        #[tokio::test]
        async fn ok_greeting() {
            let mut buf = Buffer::from_bytes(b"* OK [CAPABILITY IMAP4rev1 STARTTLS] ready\r\n");
            let mut observer = NoopObserver;
            let mut parser = Parser::socketless(&mut buf, &mut observer);
            let state = parser.parse_greeting().await.unwrap();
            assert!(state.is_ok());
            assert_eq!(state.text, "ready");
        }

        #[tokio::test]
        async fn preauth_greeting() {
            let mut buf = Buffer::from_bytes(b"* PREAUTH welcome back\r\n");
            let mut observer = NoopObserver;
            let mut parser = Parser::socketless(&mut buf, &mut observer);
            let state = parser.parse_greeting().await.unwrap();
            assert_eq!(state.condition, Condition::PreAuth);
        }

        #[tokio::test]
        async fn tagged_greeting_is_rejected() {
            let mut buf = Buffer::from_bytes(b"q0001 OK hello\r\n");
            let mut observer = NoopObserver;
            let mut parser = Parser::socketless(&mut buf, &mut observer);
            assert!(parser.parse_greeting().await.is_err());
        }
    }

    mod element_tests {
        use super::*;

        #[tokio::test]
        async fn nested_lists_with_mixed_content() {
            let mut buf = Buffer::from_bytes(b"a (b \"c\") NIL {1}\r\nd)");
            let mut observer = NoopObserver;
            let mut ts = TokenStream::socketless(&mut buf, &mut observer);
            let elements = parse_list(&mut ts).await.unwrap();
            assert_eq!(
                elements,
                vec![
                    Element::Atom("a".to_string()),
                    Element::List(vec![
                        Element::Atom("b".to_string()),
                        Element::Bytes(b"c".to_vec()),
                    ]),
                    Element::Nil,
                    Element::Bytes(b"d".to_vec()),
                ]
            );
        }

        #[tokio::test]
        async fn unclosed_list_is_an_error() {
            let mut buf = Buffer::from_bytes(b"a b\r\n");
            let mut observer = NoopObserver;
            let mut ts = TokenStream::socketless(&mut buf, &mut observer);
            assert!(parse_list(&mut ts).await.is_err());
        }
    }
}
