//! Full-session tests against a scripted stream.
//!
//! Each test feeds a client the exact bytes a server would send and
//! captures what the client writes back, so whole exchanges run
//! without a real connection.

#![allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::similar_names
)]

use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use mailspool_imap::parser::BodySection;
use mailspool_imap::{
    CollectingObserver, Error, Flag, Flags, ImapClient, Operation, Range, Response, SessionState,
    StatusItem,
};

/// Stream that replays a scripted server side and records the client
/// side.
struct MockStream {
    script: Cursor<Vec<u8>>,
    sent: Arc<Mutex<Vec<u8>>>,
}

impl MockStream {
    /// Returns the stream and a handle to everything the client will
    /// write into it.
    fn new(script: &[u8]) -> (Self, Arc<Mutex<Vec<u8>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                script: Cursor::new(script.to_vec()),
                sent: Arc::clone(&sent),
            },
            sent,
        )
    }
}

impl AsyncRead for MockStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let pos = usize::try_from(self.script.position()).unwrap();
        let data = self.script.get_ref();
        if pos >= data.len() {
            // End of script reads as a closed connection.
            return Poll::Ready(Ok(()));
        }
        let to_read = (data.len() - pos).min(buf.remaining());
        buf.put_slice(&data[pos..pos + to_read]);
        self.script.set_position((pos + to_read) as u64);
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MockStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.sent.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

type Client = ImapClient<MockStream>;
type SentHandle = Arc<Mutex<Vec<u8>>>;
type ObserverHandle = Arc<Mutex<CollectingObserver>>;

fn sent_text(sent: &SentHandle) -> String {
    String::from_utf8_lossy(&sent.lock().unwrap()).into_owned()
}

/// Greeting, CAPABILITY (`q0000`), and LOGIN (`q0001`); the server
/// advertises no SASL mechanism so the client falls back to LOGIN.
const HANDSHAKE: &[u8] = b"* OK ready\r\n\
    * CAPABILITY IMAP4rev1 NAMESPACE\r\n\
    q0000 OK done\r\n\
    q0001 OK authenticated\r\n";

/// Drives a client through the login handshake, with `exchanges`
/// scripted after it. Commands issued next are tagged from `q0002`.
async fn authenticated_client(exchanges: &[u8]) -> (Client, SentHandle, ObserverHandle) {
    let mut script = HANDSHAKE.to_vec();
    script.extend_from_slice(exchanges);
    let (stream, sent) = MockStream::new(&script);
    let observer = Arc::new(Mutex::new(CollectingObserver::with_credentials(
        "tim", "secret",
    )));
    let mut client = ImapClient::from_stream(
        stream,
        Duration::from_secs(5),
        Box::new(Arc::clone(&observer)),
    );
    client.read_greeting().await.unwrap();
    client.capability().await.unwrap();
    client.authenticate().await.unwrap();
    (client, sent, observer)
}

/// Selects INBOX over a minimal `q0002` exchange, leaving `q0003` for
/// the test's own command.
async fn selected_client(exchanges: &[u8]) -> (Client, SentHandle, ObserverHandle) {
    let mut script = b"q0002 OK [READ-WRITE] selected\r\n".to_vec();
    script.extend_from_slice(exchanges);
    let (mut client, sent, observer) = authenticated_client(&script).await;
    client.select("INBOX").await.unwrap();
    (client, sent, observer)
}

#[tokio::test]
async fn login_handshake_authenticates() {
    let (client, sent, _observer) = authenticated_client(b"").await;
    assert!(client.state().is_authenticated());
    let sent = sent_text(&sent);
    assert!(sent.contains("q0000 CAPABILITY\r\n"));
    assert!(sent.contains("q0001 LOGIN \"tim\" \"secret\"\r\n"));
}

#[tokio::test]
async fn cram_md5_exchange_uses_the_challenge() {
    // Challenge and digest from the CRAM-MD5 specification example.
    let script = b"* OK ready\r\n\
        * CAPABILITY IMAP4rev1 LOGINDISABLED AUTH=CRAM-MD5\r\n\
        q0000 OK done\r\n\
        + PDE4OTYuNjk3MTcwOTUyQHBvc3RvZmZpY2UucmVzdG9uLm1jaS5uZXQ+\r\n\
        q0001 OK authenticated\r\n";
    let (stream, sent) = MockStream::new(script);
    let observer = CollectingObserver::with_credentials("tim", "tanstaaftanstaaf");
    let mut client =
        ImapClient::from_stream(stream, Duration::from_secs(5), Box::new(observer));
    client.read_greeting().await.unwrap();
    client.capability().await.unwrap();
    client.authenticate().await.unwrap();

    assert!(client.state().is_authenticated());
    let sent = sent_text(&sent);
    assert!(sent.contains("q0001 AUTHENTICATE CRAM-MD5\r\n"));
    assert!(sent.contains("dGltIGI5MTNhNjAyYzdlZGE3YTQ5NWI0ZTZlNzMzNGQzODkw\r\n"));
    assert!(!sent.contains("LOGIN"));
}

#[tokio::test]
async fn missing_imap4rev1_fails_capability() {
    let script = b"* OK ready\r\n\
        * CAPABILITY IMAP2 AUTH=PLAIN\r\n\
        q0000 OK done\r\n";
    let (stream, _sent) = MockStream::new(script);
    let mut client = ImapClient::from_stream(
        stream,
        Duration::from_secs(5),
        Box::new(CollectingObserver::new()),
    );
    client.read_greeting().await.unwrap();
    let err = client.capability().await.unwrap_err();
    assert!(matches!(
        err,
        Error::Command {
            op: Operation::Capability,
            ..
        }
    ));
}

#[tokio::test]
async fn select_digests_mailbox_counters() {
    let script = b"* 3 EXISTS\r\n\
        * 1 RECENT\r\n\
        * FLAGS (\\Answered \\Flagged \\Deleted \\Seen \\Draft)\r\n\
        * OK [UIDVALIDITY 857529045] UIDs valid\r\n\
        * OK [UIDNEXT 4392] predicted next UID\r\n\
        * OK [UNSEEN 2] first unseen\r\n\
        * OK [PERMANENTFLAGS (\\Deleted \\Seen \\*)] limited\r\n\
        q0002 OK [READ-WRITE] SELECT completed\r\n";
    let (mut client, sent, _observer) = authenticated_client(script).await;

    let selected = client.select("INBOX").await.unwrap();
    assert_eq!(selected.mailbox, "INBOX");
    assert_eq!(selected.exists, 3);
    assert_eq!(selected.recent, 1);
    assert_eq!(selected.uid_validity, Some(857529045));
    assert_eq!(selected.uid_next, Some(4392));
    assert_eq!(selected.unseen, Some(2));
    assert!(!selected.read_only);
    assert!(selected.flags.contains(Flags::SEEN | Flags::DELETED));
    assert!(selected.permanent_flags.is_some());

    assert!(client.state().is_selected());
    assert_eq!(client.selected_mailbox(), Some("INBOX"));
    assert!(sent_text(&sent).contains("q0002 SELECT \"INBOX\"\r\n"));
}

#[tokio::test]
async fn failed_select_drops_back_to_authenticated() {
    let script = b"q0002 OK [READ-WRITE] selected\r\n\
        q0003 NO [NONEXISTENT] Unknown Mailbox\r\n\
        q0004 OK alive\r\n";
    let (mut client, _sent, _observer) = authenticated_client(script).await;

    client.select("INBOX").await.unwrap();
    let err = client.select("Missing").await.unwrap_err();
    assert!(matches!(
        &err,
        Error::Command {
            op: Operation::Select,
            source,
        } if matches!(source.as_ref(), Error::No(_))
    ));
    assert!(!err.poisons_connection());

    // RFC 3501 6.3.1: a failed SELECT leaves no mailbox selected.
    assert_eq!(client.state(), &SessionState::Authenticated);
    client.noop().await.unwrap();
}

#[tokio::test]
async fn fetch_surfaces_untagged_updates_in_order() {
    let script = b"* 3 EXISTS\r\n\
        * 2 FETCH (UID 9 FLAGS (\\Seen))\r\n\
        q0003 OK done\r\n";
    let (mut client, _sent, observer) = selected_client(script).await;

    let fetched = client
        .fetch(&Range::single(2, false), "(UID FLAGS)")
        .await
        .unwrap();
    assert_eq!(fetched.len(), 1);
    assert_eq!(fetched[0].number, 2);
    assert_eq!(fetched[0].uid, Some(9));
    assert!(fetched[0].flags().unwrap().contains(Flags::SEEN));

    let observer = observer.lock().unwrap();
    let tail = &observer.responses[observer.responses.len() - 3..];
    assert_eq!(tail[0], Response::Exists(3));
    assert!(matches!(&tail[1], Response::Fetch(f) if f.uid == Some(9)));
    assert!(matches!(
        &tail[2],
        Response::State(s) if s.is_ok() && s.tag.as_deref() == Some("q0003")
    ));
}

#[tokio::test]
async fn fetch_reads_literal_content() {
    let script = b"* 2 FETCH (UID 9 BODY[] {5}\r\nhello)\r\n\
        q0003 OK done\r\n";
    let (mut client, sent, _observer) = selected_client(script).await;

    let fetched = client.get_message(&Range::single(2, false), true).await.unwrap();
    assert_eq!(fetched.len(), 1);
    assert_eq!(fetched[0].body(&BodySection::whole()), Some(&b"hello"[..]));
    assert!(sent_text(&sent).contains("q0003 FETCH 2 (BODY.PEEK[])\r\n"));
}

#[tokio::test]
async fn part_fetch_addresses_section_paths() {
    let script = b"* 4 FETCH (BODY[1.2] {3}\r\nabc BODY[1.2.MIME] {26}\r\n\
        Content-Type: text/plain\r\n)\r\n\
        q0003 OK done\r\n";
    let (mut client, sent, _observer) = selected_client(script).await;

    let fetched = client
        .get_part(&Range::single(4, false), &[1, 2])
        .await
        .unwrap();
    assert!(
        sent_text(&sent).contains("q0003 FETCH 4 (BODY.PEEK[1.2] BODY.PEEK[1.2.MIME])\r\n")
    );
    assert_eq!(
        fetched[0].body(&BodySection::for_part(vec![1, 2])),
        Some(&b"abc"[..])
    );
    assert_eq!(
        fetched[0].body(&BodySection::mime_of(vec![1, 2])),
        Some(&b"Content-Type: text/plain\r\n"[..])
    );
}

#[tokio::test]
async fn append_sends_the_literal_after_continuation() {
    let script = b"+ ready for literal\r\n\
        q0002 OK APPEND completed\r\n";
    let (mut client, sent, _observer) = authenticated_client(script).await;

    let flags: Flags = [Flag::Seen].into_iter().collect();
    client
        .append("Sent", flags, b"From: a@b\r\n\r\nhi".to_vec())
        .await
        .unwrap();

    let sent = sent_text(&sent);
    assert!(sent.contains("q0002 APPEND \"Sent\" (\\Seen) {15}\r\n"));
    assert!(sent.contains("From: a@b\r\n\r\nhi\r\n"));
}

#[tokio::test]
async fn search_collects_result_numbers() {
    let script = b"* SEARCH 2 84 882\r\n\
        q0003 OK done\r\n";
    let (mut client, sent, _observer) = selected_client(script).await;

    let found = client.search("UNSEEN", None, true).await.unwrap();
    assert_eq!(found, vec![2, 84, 882]);
    assert!(sent_text(&sent).contains("q0003 UID SEARCH UNSEEN\r\n"));
}

#[tokio::test]
async fn expunge_reports_removed_sequence_numbers() {
    let script = b"* 3 EXPUNGE\r\n\
        * 3 EXPUNGE\r\n\
        * 5 EXPUNGE\r\n\
        q0003 OK done\r\n";
    let (mut client, _sent, _observer) = selected_client(script).await;

    let removed = client.expunge().await.unwrap();
    assert_eq!(removed, vec![3, 3, 5]);
}

#[tokio::test]
async fn status_returns_requested_counters() {
    let script = b"* STATUS \"Drafts\" (MESSAGES 4 UIDNEXT 7)\r\n\
        q0002 OK done\r\n";
    let (mut client, _sent, _observer) = authenticated_client(script).await;

    let status = client
        .status("Drafts", &[StatusItem::Messages, StatusItem::UidNext])
        .await
        .unwrap();
    assert_eq!(status.mailbox, "Drafts");
    assert_eq!(status.messages, Some(4));
    assert_eq!(status.uid_next, Some(7));
}

#[tokio::test]
async fn namespace_reports_personal_prefix() {
    let script = b"* NAMESPACE ((\"\" \"/\")) NIL NIL\r\n\
        q0002 OK done\r\n";
    let (mut client, _sent, _observer) = authenticated_client(script).await;

    let namespace = client.namespace().await.unwrap();
    assert_eq!(namespace.personal.len(), 1);
    assert_eq!(namespace.personal[0].prefix, "");
    assert_eq!(namespace.personal[0].separator, Some('/'));
    assert!(namespace.others.is_empty());
    assert!(namespace.shared.is_empty());
}

#[tokio::test]
async fn list_collects_mailbox_entries() {
    let script = b"* LIST (\\Noselect) \"/\" \"\"\r\n\
        * LIST (\\Marked) \"/\" \"INBOX\"\r\n\
        q0002 OK done\r\n";
    let (mut client, _sent, _observer) = authenticated_client(script).await;

    let listed = client.list("", "*").await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[1].mailbox, "INBOX");
    assert_eq!(listed[1].separator, Some('/'));
    assert!(!listed[1].lsub);
}

#[tokio::test]
async fn bye_and_eof_poison_the_session() {
    let script = b"* BYE server shutting down\r\n";
    let (mut client, _sent, observer) = authenticated_client(script).await;

    let err = client.noop().await.unwrap_err();
    assert!(err.is_transport());
    assert!(err.poisons_connection());
    assert_eq!(client.state(), &SessionState::Disconnected);
    assert!(!client.is_usable());
    assert!(!client.check_connection().await);

    let observer = observer.lock().unwrap();
    let saw_bye = observer
        .responses
        .iter()
        .any(|r| matches!(r, Response::State(s) if s.is_bye()));
    assert!(saw_bye);
}

#[tokio::test]
async fn commands_in_the_wrong_state_are_rejected() {
    let (mut client, _sent, _observer) = authenticated_client(b"").await;

    // FETCH needs a selected mailbox.
    let err = client
        .fetch(&Range::all(false), "(FLAGS)")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Command {
            op: Operation::Fetch,
            ..
        }
    ));
}
