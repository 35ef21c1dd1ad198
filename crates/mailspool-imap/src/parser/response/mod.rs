//! Interpretation of server lines into [`Response`] values.
//!
//! The functions here run after the line marker (`*`, `+`, or a tag)
//! has been consumed; the top-level dispatch lives in the parser
//! module. Unknown untagged words are drained and dropped rather than
//! failing the command that triggered them.

mod fetch;
mod helpers;
pub(crate) mod types;

use tokio::io::AsyncRead;

use crate::Result;
use crate::leniency::Leniency;
use crate::parser::lexer::{Token, TokenStream};
use crate::parser::{Element, parse_list};
use crate::utf7;

use helpers::flags_of;
use types::{
    Condition, ListAttributes, ListItem, Namespace, NamespaceEntry, Response, ResponseCode, State,
    StatusResponse,
};

/// The condition named by a status word, if it is one.
pub(super) fn condition_of(word: &str) -> Option<Condition> {
    match word.to_ascii_uppercase().as_str() {
        "OK" => Some(Condition::Ok),
        "NO" => Some(Condition::No),
        "BAD" => Some(Condition::Bad),
        "PREAUTH" => Some(Condition::PreAuth),
        "BYE" => Some(Condition::Bye),
        _ => None,
    }
}

/// Interprets one untagged line, positioned after the `*`.
///
/// `Ok(None)` means the line carried something this client has no
/// reading for; it has been drained and logged.
pub(super) async fn untagged<S: AsyncRead + Unpin>(
    ts: &mut TokenStream<'_, S>,
) -> Result<Option<Response>> {
    let token = ts.next_token().await?;
    let Token::Atom(id) = token else {
        return Err(ts.error_at(ts.pos(), "expected word after *"));
    };
    let word = ts.atom_text(id);

    if !word.is_empty() && word.bytes().all(|b| b.is_ascii_digit()) {
        let number = word
            .parse()
            .map_err(|_| ts.error_at(ts.pos(), "message number out of range"))?;
        return numbered(ts, number).await;
    }

    if let Some(condition) = condition_of(&word) {
        let state = status_rest(ts, None, condition).await?;
        return Ok(Some(Response::State(state)));
    }

    match word.to_ascii_uppercase().as_str() {
        "CAPABILITY" => capability(ts).await.map(Some),
        "FLAGS" => flags_line(ts).await.map(Some),
        "LIST" => list_item(ts, false).await.map(Some),
        "LSUB" => list_item(ts, true).await.map(Some),
        "SEARCH" => search(ts).await.map(Some),
        "STATUS" => status_counters(ts).await.map(Some),
        "NAMESPACE" => namespace(ts).await.map(Some),
        _ => {
            let rest = ts.read_text_line().await?;
            tracing::debug!(word = %word, rest = %rest, "ignoring unknown untagged response");
            Ok(None)
        }
    }
}

/// Interprets an untagged line that opened with a message number.
async fn numbered<S: AsyncRead + Unpin>(
    ts: &mut TokenStream<'_, S>,
    number: u32,
) -> Result<Option<Response>> {
    let token = ts.next_token().await?;
    let Token::Atom(id) = token else {
        return Err(ts.error_at(ts.pos(), "expected word after message number"));
    };
    let word = ts.atom_text(id).to_ascii_uppercase();
    let response = match word.as_str() {
        "EXISTS" => Response::Exists(number),
        "RECENT" => Response::Recent(number),
        "EXPUNGE" => Response::Expunge(number),
        "FETCH" => {
            expect_open(ts).await?;
            let elements = parse_list(ts).await?;
            Response::Fetch(fetch::interpret(number, elements)?)
        }
        _ => {
            let rest = ts.read_text_line().await?;
            tracing::debug!(number, word = %word, rest = %rest, "ignoring unknown numbered response");
            return Ok(None);
        }
    };
    end_of_line(ts).await?;
    Ok(Some(response))
}

/// Reads the code and text of a status line, positioned after the
/// condition word.
pub(super) async fn status_rest<S: AsyncRead + Unpin>(
    ts: &mut TokenStream<'_, S>,
    tag: Option<String>,
    condition: Condition,
) -> Result<State> {
    let code = if ts.peek().await? == Some(b'[') {
        let _ = ts.next_token().await?;
        let code = response_code(ts).await?;
        // Exchange 5.5 ends some status lines right at the bracket.
        if ts.peek_raw().await? == Some(b'\r') {
            Leniency::BracketTrailerCrlf.note();
        }
        Some(code)
    } else {
        None
    };
    let text = ts.read_text_line().await?;
    let text = text.strip_prefix(' ').unwrap_or(text.as_str()).to_string();
    Ok(State {
        tag,
        condition,
        code,
        text,
    })
}

/// Reads one `[...]` code, positioned after the opening bracket.
/// Consumes the closing bracket.
async fn response_code<S: AsyncRead + Unpin>(
    ts: &mut TokenStream<'_, S>,
) -> Result<ResponseCode> {
    let token = ts.next_token().await?;
    let Token::Atom(id) = token else {
        return Err(ts.error_at(ts.pos(), "expected response code atom"));
    };
    let atom = ts.atom_text(id);
    let code = match atom.to_ascii_uppercase().as_str() {
        "ALERT" => ResponseCode::Alert,
        "PARSE" => ResponseCode::Parse,
        "READ-ONLY" => ResponseCode::ReadOnly,
        "READ-WRITE" => ResponseCode::ReadWrite,
        "TRYCREATE" => ResponseCode::TryCreate,
        "UIDVALIDITY" => ResponseCode::UidValidity(code_number(ts).await?),
        "UIDNEXT" => ResponseCode::UidNext(code_number(ts).await?),
        "UNSEEN" => ResponseCode::Unseen(code_number(ts).await?),
        "NEWNAME" => ResponseCode::NewName {
            old: astring(ts).await?,
            new: astring(ts).await?,
        },
        "PERMANENTFLAGS" => {
            expect_open(ts).await?;
            let elements = parse_list(ts).await?;
            ResponseCode::PermanentFlags(flags_of(&elements))
        }
        _ => {
            let mut args: Vec<String> = Vec::new();
            loop {
                match ts.next_token().await? {
                    Token::CloseBracket => {
                        let text = if args.is_empty() {
                            None
                        } else {
                            Some(args.join(" "))
                        };
                        return Ok(ResponseCode::Other { atom, text });
                    }
                    Token::Atom(id) => args.push(ts.atom_text(id)),
                    Token::Nil => args.push("NIL".to_string()),
                    token @ (Token::Quoted { .. } | Token::Literal(_)) => {
                        args.push(String::from_utf8_lossy(&ts.string_bytes(token)).into_owned());
                    }
                    Token::Open | Token::Close => {}
                    _ => return Err(ts.error_at(ts.pos(), "unterminated response code")),
                }
            }
        }
    };
    match ts.next_token().await? {
        Token::CloseBracket => Ok(code),
        _ => Err(ts.error_at(ts.pos(), "expected ] after response code")),
    }
}

async fn code_number<S: AsyncRead + Unpin>(ts: &mut TokenStream<'_, S>) -> Result<u32> {
    let token = ts.next_token().await?;
    if let Token::Atom(id) = token {
        if let Ok(number) = ts.atom_text(id).parse() {
            return Ok(number);
        }
    }
    Err(ts.error_at(ts.pos(), "expected number in response code"))
}

/// Reads one atom, quoted string, or literal as text.
async fn astring<S: AsyncRead + Unpin>(ts: &mut TokenStream<'_, S>) -> Result<String> {
    let token = ts.next_token().await?;
    match token {
        Token::Atom(_) | Token::Quoted { .. } | Token::Literal(_) => {
            Ok(String::from_utf8_lossy(&ts.string_bytes(token)).into_owned())
        }
        // A mailbox literally named NIL lexes as the NIL token.
        Token::Nil => Ok("NIL".to_string()),
        _ => Err(ts.error_at(ts.pos(), "expected string")),
    }
}

async fn expect_open<S: AsyncRead + Unpin>(ts: &mut TokenStream<'_, S>) -> Result<()> {
    match ts.next_token().await? {
        Token::Open => Ok(()),
        _ => Err(ts.error_at(ts.pos(), "expected (")),
    }
}

async fn end_of_line<S: AsyncRead + Unpin>(ts: &mut TokenStream<'_, S>) -> Result<()> {
    match ts.next_token().await? {
        Token::Crlf | Token::End => Ok(()),
        _ => Err(ts.error_at(ts.pos(), "expected end of line")),
    }
}

async fn capability<S: AsyncRead + Unpin>(ts: &mut TokenStream<'_, S>) -> Result<Response> {
    let mut atoms = Vec::new();
    loop {
        match ts.next_token().await? {
            Token::Crlf | Token::End => return Ok(Response::Capability(atoms)),
            Token::Atom(id) => atoms.push(ts.atom_text(id)),
            Token::Nil => atoms.push("NIL".to_string()),
            token @ (Token::Quoted { .. } | Token::Literal(_)) => {
                atoms.push(String::from_utf8_lossy(&ts.string_bytes(token)).into_owned());
            }
            _ => return Err(ts.error_at(ts.pos(), "malformed CAPABILITY response")),
        }
    }
}

async fn flags_line<S: AsyncRead + Unpin>(ts: &mut TokenStream<'_, S>) -> Result<Response> {
    expect_open(ts).await?;
    let elements = parse_list(ts).await?;
    end_of_line(ts).await?;
    Ok(Response::Flags(flags_of(&elements)))
}

async fn list_item<S: AsyncRead + Unpin>(
    ts: &mut TokenStream<'_, S>,
    lsub: bool,
) -> Result<Response> {
    expect_open(ts).await?;
    let mut attributes = ListAttributes::NONE;
    loop {
        match ts.next_token().await? {
            Token::Close => break,
            Token::Atom(id) => {
                let atom = ts.atom_text(id);
                match ListAttributes::from_atom(&atom) {
                    Some(attribute) => attributes |= attribute,
                    None => tracing::debug!(attribute = %atom, "ignoring unknown name attribute"),
                }
            }
            _ => return Err(ts.error_at(ts.pos(), "malformed name attribute list")),
        }
    }
    let separator = match ts.next_token().await? {
        Token::Nil => None,
        token @ Token::Quoted { .. } => {
            let bytes = ts.string_bytes(token);
            bytes.first().map(|&b| b as char)
        }
        Token::Atom(id) => ts.atom_text(id).chars().next(),
        _ => return Err(ts.error_at(ts.pos(), "expected hierarchy separator")),
    };
    let mailbox = astring(ts).await?;
    end_of_line(ts).await?;
    Ok(Response::List(ListItem {
        attributes,
        separator,
        mailbox: utf7::decode(&mailbox),
        lsub,
    }))
}

async fn search<S: AsyncRead + Unpin>(ts: &mut TokenStream<'_, S>) -> Result<Response> {
    let mut ids = Vec::new();
    loop {
        match ts.next_token().await? {
            Token::Crlf | Token::End => return Ok(Response::Search(ids)),
            Token::Atom(id) => match ts.atom_text(id).parse() {
                Ok(n) => ids.push(n),
                Err(_) => {
                    tracing::debug!(atom = %ts.atom_text(id), "ignoring non-numeric search result");
                }
            },
            _ => return Err(ts.error_at(ts.pos(), "malformed SEARCH response")),
        }
    }
}

async fn status_counters<S: AsyncRead + Unpin>(ts: &mut TokenStream<'_, S>) -> Result<Response> {
    let mailbox = astring(ts).await?;
    expect_open(ts).await?;
    let elements = parse_list(ts).await?;
    end_of_line(ts).await?;

    let mut status = StatusResponse {
        mailbox: utf7::decode(&mailbox),
        ..StatusResponse::default()
    };
    let mut elements = elements.into_iter();
    while let Some(key) = elements.next() {
        let Some(name) = key.as_atom().map(str::to_ascii_uppercase) else {
            continue;
        };
        let value = elements.next().as_ref().and_then(Element::number);
        match name.as_str() {
            "MESSAGES" => status.messages = value,
            "RECENT" => status.recent = value,
            "UIDNEXT" => status.uid_next = value,
            "UIDVALIDITY" => status.uid_validity = value,
            "UNSEEN" => status.unseen = value,
            _ => tracing::debug!(item = %name, "ignoring unknown STATUS item"),
        }
    }
    Ok(Response::Status(status))
}

async fn namespace<S: AsyncRead + Unpin>(ts: &mut TokenStream<'_, S>) -> Result<Response> {
    let personal = namespace_group(ts).await?;
    let others = namespace_group(ts).await?;
    let shared = namespace_group(ts).await?;
    end_of_line(ts).await?;
    Ok(Response::Namespace(Namespace {
        personal,
        others,
        shared,
    }))
}

/// One NAMESPACE group: NIL or a list of `(prefix separator ...)`
/// entries. Extension data inside an entry is ignored.
async fn namespace_group<S: AsyncRead + Unpin>(
    ts: &mut TokenStream<'_, S>,
) -> Result<Vec<NamespaceEntry>> {
    match ts.next_token().await? {
        Token::Nil => Ok(Vec::new()),
        Token::Open => {
            let elements = parse_list(ts).await?;
            Ok(elements
                .into_iter()
                .filter_map(|element| {
                    let mut slots = element.into_list()?.into_iter();
                    let prefix = slots.next().and_then(Element::into_text)?;
                    let separator = slots
                        .next()
                        .and_then(Element::into_text)
                        .and_then(|s| s.chars().next());
                    Some(NamespaceEntry {
                        prefix: utf7::decode(&prefix),
                        separator,
                    })
                })
                .collect())
        }
        _ => Err(ts.error_at(ts.pos(), "malformed NAMESPACE group")),
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
    use crate::buffer::Buffer;
    use crate::observer::NoopObserver;
    use crate::types::Flags;

    use super::*;

    /// Parses one untagged line; `input` starts after the `* `.
    async fn untagged_line(input: &[u8]) -> Option<Response> {
        let mut buf = Buffer::from_bytes(input);
        let mut observer = NoopObserver;
        let mut ts = TokenStream::socketless(&mut buf, &mut observer);
        untagged(&mut ts).await.unwrap()
    }

    #[tokio::test]
    async fn capability_line() {
        let response = untagged_line(b"CAPABILITY IMAP4rev1 STARTTLS AUTH=CRAM-MD5\r\n").await;
        assert_eq!(
            response,
            Some(Response::Capability(vec![
                "IMAP4rev1".to_string(),
                "STARTTLS".to_string(),
                "AUTH=CRAM-MD5".to_string(),
            ]))
        );
    }

    #[tokio::test]
    async fn exists_and_recent() {
        assert_eq!(
            untagged_line(b"23 EXISTS\r\n").await,
            Some(Response::Exists(23))
        );
        assert_eq!(
            untagged_line(b"1 RECENT\r\n").await,
            Some(Response::Recent(1))
        );
        assert_eq!(
            untagged_line(b"44 EXPUNGE\r\n").await,
            Some(Response::Expunge(44))
        );
    }

    #[tokio::test]
    async fn fetch_line_with_literal() {
        let response =
            untagged_line(b"12 FETCH (FLAGS (\\Seen) UID 7 BODY[1] {5}\r\nhello)\r\n").await;
        let Some(Response::Fetch(fetch)) = response else {
            panic!("expected a fetch response");
        };
        assert_eq!(fetch.number, 12);
        assert_eq!(fetch.uid, Some(7));
        assert!(fetch.flags().unwrap().contains(Flags::SEEN));
        assert_eq!(fetch.bodies().next().unwrap().content, b"hello");
    }

    #[tokio::test]
    async fn status_line_with_code() {
        let response = untagged_line(b"OK [UIDVALIDITY 3857529045] UIDs valid\r\n").await;
        let Some(Response::State(state)) = response else {
            panic!("expected a state response");
        };
        assert_eq!(state.condition, Condition::Ok);
        assert_eq!(state.code, Some(ResponseCode::UidValidity(3857529045)));
        assert_eq!(state.text, "UIDs valid");
    }

    #[tokio::test]
    async fn bracket_directly_before_crlf() {
        let response = untagged_line(b"OK [UNSEEN 12]\r\n").await;
        let Some(Response::State(state)) = response else {
            panic!("expected a state response");
        };
        assert_eq!(state.code, Some(ResponseCode::Unseen(12)));
        assert!(state.text.is_empty());
    }

    #[tokio::test]
    async fn permanent_flags_code() {
        let response = untagged_line(b"OK [PERMANENTFLAGS (\\Deleted \\Seen \\*)] Limited\r\n").await;
        let Some(Response::State(state)) = response else {
            panic!("expected a state response");
        };
        let Some(ResponseCode::PermanentFlags(flags)) = state.code else {
            panic!("expected PERMANENTFLAGS");
        };
        assert!(flags.contains(Flags::DELETED | Flags::SEEN));
        assert!(flags.contains_keyword("\\*"));
    }

    #[tokio::test]
    async fn unknown_code_keeps_atom_and_args() {
        let response = untagged_line(b"OK [HIGHESTMODSEQ 715194045007] ok\r\n").await;
        let Some(Response::State(state)) = response else {
            panic!("expected a state response");
        };
        assert_eq!(
            state.code,
            Some(ResponseCode::Other {
                atom: "HIGHESTMODSEQ".to_string(),
                text: Some("715194045007".to_string()),
            })
        );
    }

    #[tokio::test]
    async fn list_line() {
        let response = untagged_line(b"LIST (\\Noselect) \"/\" ~/Mail/foo\r\n").await;
        let Some(Response::List(item)) = response else {
            panic!("expected a list response");
        };
        assert!(item.attributes.contains(ListAttributes::NOSELECT));
        assert_eq!(item.separator, Some('/'));
        assert_eq!(item.mailbox, "~/Mail/foo");
        assert!(!item.lsub);
    }

    #[tokio::test]
    async fn lsub_line_decodes_utf7() {
        let response = untagged_line(b"LSUB () \"/\" \"Entw&APw-rfe\"\r\n").await;
        let Some(Response::List(item)) = response else {
            panic!("expected a list response");
        };
        assert!(item.lsub);
        assert_eq!(item.mailbox, "Entw\u{fc}rfe");
    }

    #[tokio::test]
    async fn list_nil_separator() {
        let response = untagged_line(b"LIST () NIL inbox-only\r\n").await;
        let Some(Response::List(item)) = response else {
            panic!("expected a list response");
        };
        assert_eq!(item.separator, None);
    }

    #[tokio::test]
    async fn search_line() {
        assert_eq!(
            untagged_line(b"SEARCH 2 84 882\r\n").await,
            Some(Response::Search(vec![2, 84, 882]))
        );
        assert_eq!(
            untagged_line(b"SEARCH\r\n").await,
            Some(Response::Search(Vec::new()))
        );
    }

    #[tokio::test]
    async fn status_counters_line() {
        let response =
            untagged_line(b"STATUS blurdybloop (MESSAGES 231 UIDNEXT 44292)\r\n").await;
        let Some(Response::Status(status)) = response else {
            panic!("expected a status response");
        };
        assert_eq!(status.mailbox, "blurdybloop");
        assert_eq!(status.messages, Some(231));
        assert_eq!(status.uid_next, Some(44292));
        assert_eq!(status.unseen, None);
    }

    #[tokio::test]
    async fn namespace_line() {
        let response =
            untagged_line(b"NAMESPACE ((\"\" \"/\")) NIL ((\"Public/\" \"/\"))\r\n").await;
        let Some(Response::Namespace(ns)) = response else {
            panic!("expected a namespace response");
        };
        assert_eq!(ns.personal.len(), 1);
        assert_eq!(ns.personal[0].prefix, "");
        assert_eq!(ns.personal[0].separator, Some('/'));
        assert!(ns.others.is_empty());
        assert_eq!(ns.shared[0].prefix, "Public/");
    }

    #[tokio::test]
    async fn unknown_untagged_is_dropped() {
        assert_eq!(untagged_line(b"SORT 5 3 1\r\n").await, None);
        assert_eq!(untagged_line(b"99 BOGUS stuff\r\n").await, None);
    }
}
