//! Scripted streams and stores shared by the crate's tests.
//!
//! [`MockStream`] replays the bytes a server would send and records
//! what the client writes, so pool and replay tests run whole
//! exchanges without a network.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::{HashMap, VecDeque};
use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use mailspool_imap::{CollectingObserver, Flags, ImapClient};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::Result;
use crate::cache::Connector;
use crate::store::MailStore;

/// Handle to the bytes a scripted client has written so far.
pub(crate) type SentHandle = Arc<Mutex<Vec<u8>>>;

/// Greeting, CAPABILITY (`q0000`), and LOGIN (`q0001`); commands
/// issued after it are tagged from `q0002`.
pub(crate) const HANDSHAKE: &str = "* OK ready\r\n\
    * CAPABILITY IMAP4rev1\r\n\
    q0000 OK done\r\n\
    q0001 OK authenticated\r\n";

/// Stream that replays a scripted server side and records the client
/// side. End of script reads as a closed connection.
pub(crate) struct MockStream {
    script: Cursor<Vec<u8>>,
    sent: SentHandle,
}

impl MockStream {
    /// Returns the stream and a handle to everything the client will
    /// write into it.
    pub(crate) fn new(script: &[u8]) -> (Self, SentHandle) {
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

pub(crate) fn sent_text(sent: &SentHandle) -> String {
    String::from_utf8_lossy(&sent.lock().unwrap()).into_owned()
}

/// Drives a client through the login handshake, with `exchanges`
/// scripted after it.
pub(crate) async fn scripted_client(exchanges: &str) -> (ImapClient<MockStream>, SentHandle) {
    let mut script = HANDSHAKE.as_bytes().to_vec();
    script.extend_from_slice(exchanges.as_bytes());
    let (stream, sent) = MockStream::new(&script);
    let mut client = ImapClient::from_stream(
        stream,
        Duration::from_secs(5),
        Box::new(CollectingObserver::with_credentials("tim", "secret")),
    );
    client.read_greeting().await.expect("greeting");
    client.capability().await.expect("capability");
    client.authenticate().await.expect("authenticate");
    (client, sent)
}

/// What a scripted connector handed out, in connect order.
#[derive(Default)]
pub(crate) struct ConnectLog {
    sent: Mutex<Vec<SentHandle>>,
}

impl ConnectLog {
    /// How many connections have been made.
    pub(crate) fn connects(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    /// Everything the `index`-th connection has written so far.
    pub(crate) fn sent_text(&self, index: usize) -> String {
        let handle = Arc::clone(&self.sent.lock().unwrap()[index]);
        sent_text(&handle)
    }
}

/// Connector that answers each connect with the next script in
/// `scripts`, handshake included. Panics when the scripts run out.
pub(crate) fn scripted_connector(
    scripts: Vec<String>,
) -> (Connector<MockStream>, Arc<ConnectLog>) {
    let queue = Arc::new(Mutex::new(scripts.into_iter().collect::<VecDeque<_>>()));
    let log = Arc::new(ConnectLog::default());
    let connector_log = Arc::clone(&log);
    let connector: Connector<MockStream> = Box::new(move || {
        let queue = Arc::clone(&queue);
        let log = Arc::clone(&connector_log);
        Box::pin(async move {
            let script = queue
                .lock()
                .unwrap()
                .pop_front()
                .expect("connector script exhausted");
            let (client, sent) = scripted_client(&script).await;
            log.sent.lock().unwrap().push(sent);
            Ok(client)
        })
    });
    (connector, log)
}

/// In-memory [`MailStore`] that records every callback.
#[derive(Default)]
pub(crate) struct MemoryStore {
    /// Messages available for upload, keyed by folder and id.
    pub(crate) messages: HashMap<(String, u32), (Vec<u8>, Flags)>,
    /// `(folder, id)` pairs reported uploaded.
    pub(crate) uploaded: Vec<(String, u32)>,
    /// `(folder, ids)` placeholder batches reported copied.
    pub(crate) copied: Vec<(String, Vec<u32>)>,
    /// `(folder, uids)` batches whose flag changes were confirmed.
    pub(crate) flags: Vec<(String, Vec<u32>)>,
}

impl MailStore for MemoryStore {
    fn folder_path(&self, folder: &str) -> String {
        folder.to_string()
    }

    fn load_message(&mut self, folder: &str, id: u32) -> Result<Option<(Vec<u8>, Flags)>> {
        Ok(self.messages.get(&(folder.to_string(), id)).cloned())
    }

    fn uploaded(&mut self, folder: &str, id: u32) -> Result<()> {
        self.uploaded.push((folder.to_string(), id));
        Ok(())
    }

    fn copied(&mut self, folder: &str, ids: &[u32]) -> Result<()> {
        self.copied.push((folder.to_string(), ids.to_vec()));
        Ok(())
    }

    fn flags_applied(
        &mut self,
        folder: &str,
        uids: &[u32],
        _flags: &Flags,
        _mask: &Flags,
    ) -> Result<()> {
        self.flags.push((folder.to_string(), uids.to_vec()));
        Ok(())
    }
}
