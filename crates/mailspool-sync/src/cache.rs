//! Pool of authenticated IMAP sessions with folder affinity.
//!
//! Opening and authenticating a connection is the expensive part of
//! talking to an IMAP server, so finished sessions go back into a
//! pool instead of being torn down. The pool prefers to hand out a
//! session that already has the wanted folder selected, skipping the
//! SELECT round trip entirely; at capacity it repurposes the oldest
//! idle session rather than opening another connection.
//!
//! A [`Session`] is owned while checked out. Give it back with
//! [`SessionCache::release`] to pool it; dropping it instead closes
//! the connection.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use mailspool_imap::{Config, ImapClient, ImapStream, SessionObserver};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::Result;
use crate::clock::{BoxClock, SystemClock};

/// Future returned by a [`Connector`].
pub type ConnectFuture<S> = Pin<Box<dyn Future<Output = Result<ImapClient<S>>> + Send>>;

/// Factory the pool calls whenever it needs a fresh authenticated
/// session.
pub type Connector<S> = Box<dyn Fn() -> ConnectFuture<S> + Send + Sync>;

/// Tuning knobs for a [`SessionCache`].
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Most idle sessions kept at once. Requests for a folder no idle
    /// session has selected open a fresh connection below this count
    /// and repurpose the oldest idle session at it.
    pub max_sessions: usize,
    /// Re-issue SELECT on a folder-matched session when the folder
    /// changed after the session last selected it.
    pub always_reselect: bool,
    /// Idle age past which a pooled session is presumed dead and
    /// discarded without a LOGOUT. `None` keeps sessions until they
    /// fail a liveness probe.
    pub forced_disconnect: Option<Duration>,
    /// Hierarchy separator used when comparing folder names.
    pub separator: char,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_sessions: 5,
            always_reselect: false,
            forced_disconnect: None,
            separator: '/',
        }
    }
}

/// A pooled session checked out of a [`SessionCache`].
pub struct Session<S = ImapStream> {
    client: ImapClient<S>,
    folder: Option<String>,
    last_used: Instant,
    last_selected: Option<Instant>,
    fresh: bool,
    generation: u64,
}

impl<S> Session<S> {
    fn new(client: ImapClient<S>, generation: u64, now: Instant) -> Self {
        Self {
            client,
            folder: None,
            last_used: now,
            last_selected: None,
            fresh: true,
            generation,
        }
    }

    /// The connection this session wraps.
    pub fn client(&self) -> &ImapClient<S> {
        &self.client
    }

    /// Mutable access to the connection, for issuing commands.
    pub fn client_mut(&mut self) -> &mut ImapClient<S> {
        &mut self.client
    }

    /// Folder this session has selected, if any.
    pub fn folder(&self) -> Option<&str> {
        self.folder.as_deref()
    }

    /// Whether this session was opened for the current checkout
    /// rather than taken from the pool. A command that fails on a
    /// fresh session is not worth retrying on another one.
    pub fn is_fresh(&self) -> bool {
        self.fresh
    }
}

/// Pool of authenticated sessions, keyed by nothing: any session can
/// serve any request, but folder affinity decides which one goes
/// first.
pub struct SessionCache<S = ImapStream> {
    connect: Connector<S>,
    config: PoolConfig,
    clock: BoxClock,
    generation: AtomicU64,
    idle: Mutex<VecDeque<Session<S>>>,
}

impl SessionCache<ImapStream> {
    /// Creates a pool that connects with `config`, giving each new
    /// session an observer from `observers`.
    pub fn new<F>(config: Config, pool: PoolConfig, observers: F) -> Self
    where
        F: Fn() -> Box<dyn SessionObserver> + Send + Sync + 'static,
    {
        let connect: Connector<ImapStream> = Box::new(move || {
            let config = config.clone();
            let observer = observers();
            Box::pin(async move { Ok(ImapClient::connect(&config, observer).await?) })
        });
        Self::with_connector(connect, pool, Box::new(SystemClock))
    }
}

impl<S> SessionCache<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a pool over an arbitrary connector and clock.
    pub fn with_connector(connect: Connector<S>, config: PoolConfig, clock: BoxClock) -> Self {
        Self {
            connect,
            config,
            clock,
            generation: AtomicU64::new(0),
            idle: Mutex::new(VecDeque::new()),
        }
    }

    /// Checks a session out of the pool, opening a connection only
    /// when no pooled one will do.
    ///
    /// With a `folder`, an idle session that already has it selected
    /// is preferred and handed back without a SELECT; `synced_at` is
    /// when the folder last changed, which forces a reselect under
    /// [`PoolConfig::always_reselect`]. Idle sessions past the
    /// forced-disconnect age or failing a liveness probe are
    /// discarded and the search continues.
    ///
    /// # Errors
    ///
    /// Returns an error if connecting or selecting fails.
    pub async fn get_session(
        &self,
        folder: Option<&str>,
        synced_at: Option<Instant>,
    ) -> Result<Session<S>> {
        loop {
            let Some(mut session) = self.take_idle(folder) else {
                let client = (self.connect)().await?;
                let mut session = Session::new(
                    client,
                    self.generation.load(Ordering::SeqCst),
                    self.clock.now(),
                );
                if let Some(folder) = folder {
                    self.select(&mut session, folder).await?;
                }
                tracing::debug!(folder = folder.unwrap_or("-"), "opened a fresh session");
                return Ok(session);
            };

            if let Some(limit) = self.config.forced_disconnect {
                if self.clock.has_elapsed(session.last_used, limit) {
                    tracing::debug!("dropping a session idle past the disconnect threshold");
                    continue;
                }
            }
            if !session.client.check_connection().await {
                tracing::debug!("pooled session failed its liveness probe");
                continue;
            }
            if let Some(folder) = folder {
                if self.needs_select(&session, folder, synced_at) {
                    self.select(&mut session, folder).await?;
                }
            }
            session.fresh = false;
            return Ok(session);
        }
    }

    /// Returns a session to the pool.
    ///
    /// Sessions from before the last [`destroy_all_sessions`] and
    /// sessions whose connection is no longer usable are logged out
    /// instead of pooled. When pooling overflows `max_sessions`, the
    /// oldest idle session is logged out to make room.
    ///
    /// [`destroy_all_sessions`]: Self::destroy_all_sessions
    pub async fn release(&self, mut session: Session<S>) {
        let stale = session.generation != self.generation.load(Ordering::SeqCst);
        if stale || !session.client.is_usable() {
            session.client.disconnect().await;
            return;
        }
        session.fresh = false;
        session.last_used = self.clock.now();
        let evicted = {
            let mut idle = self.idle();
            idle.push_back(session);
            if idle.len() > self.config.max_sessions {
                idle.pop_front()
            } else {
                None
            }
        };
        if let Some(mut evicted) = evicted {
            tracing::debug!("evicting the oldest pooled session");
            evicted.client.disconnect().await;
        }
    }

    /// Logs out and drops every idle session, and marks checked-out
    /// sessions so they are closed on release instead of pooled.
    ///
    /// Sessions past the forced-disconnect age skip the LOGOUT; their
    /// server end is presumed gone already.
    pub async fn destroy_all_sessions(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let drained: Vec<Session<S>> = {
            let mut idle = self.idle();
            idle.drain(..).collect()
        };
        let count = drained.len();
        for mut session in drained {
            let aged = self
                .config
                .forced_disconnect
                .is_some_and(|limit| self.clock.has_elapsed(session.last_used, limit));
            if aged {
                continue;
            }
            session.client.disconnect().await;
        }
        if count > 0 {
            tracing::debug!(count, "destroyed pooled sessions");
        }
    }

    /// Number of sessions currently idle in the pool.
    pub fn idle_sessions(&self) -> usize {
        self.idle().len()
    }

    fn idle(&self) -> MutexGuard<'_, VecDeque<Session<S>>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Picks the idle session to try next: folder affinity first,
    /// then the front of the queue when at capacity or when no
    /// particular folder is wanted.
    fn take_idle(&self, folder: Option<&str>) -> Option<Session<S>> {
        let mut idle = self.idle();
        let Some(folder) = folder else {
            return idle.pop_front();
        };
        if let Some(position) = idle.iter().position(|session| {
            session
                .folder
                .as_deref()
                .is_some_and(|selected| folder_names_equal(selected, folder, self.config.separator))
        }) {
            return idle.remove(position);
        }
        if idle.len() >= self.config.max_sessions {
            return idle.pop_front();
        }
        None
    }

    fn needs_select(&self, session: &Session<S>, folder: &str, synced_at: Option<Instant>) -> bool {
        let Some(current) = session.folder.as_deref() else {
            return true;
        };
        if !folder_names_equal(current, folder, self.config.separator) {
            return true;
        }
        let Some(selected_at) = session.last_selected else {
            return true;
        };
        self.config.always_reselect && synced_at.is_some_and(|at| at > selected_at)
    }

    async fn select(&self, session: &mut Session<S>, folder: &str) -> Result<()> {
        session.client.select(folder).await?;
        session.folder = Some(folder.to_string());
        session.last_selected = Some(self.clock.now());
        Ok(())
    }
}

/// Whether two folder names refer to the same mailbox.
///
/// `INBOX` compares case-insensitively, including as the first
/// segment of a path; everything after it is exact. Names that do not
/// both start with `INBOX` must match exactly.
#[must_use]
pub fn folder_names_equal(lhs: &str, rhs: &str, separator: char) -> bool {
    if lhs == rhs {
        return true;
    }
    let (Some(lhs), Some(rhs)) = (strip_inbox(lhs), strip_inbox(rhs)) else {
        return false;
    };
    if lhs.is_empty() && rhs.is_empty() {
        return true;
    }
    lhs.starts_with(separator) && rhs.starts_with(separator) && lhs == rhs
}

fn strip_inbox(name: &str) -> Option<&str> {
    name.get(..5)?
        .eq_ignore_ascii_case("INBOX")
        .then_some(&name[5..])
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::clock::{Clock, MockClock};
    use crate::testing::{ConnectLog, MockStream, scripted_connector};

    fn cache_over(
        scripts: Vec<&str>,
        config: PoolConfig,
    ) -> (SessionCache<MockStream>, Arc<ConnectLog>) {
        let (connector, log) =
            scripted_connector(scripts.into_iter().map(String::from).collect());
        let cache = SessionCache::with_connector(connector, config, Box::new(SystemClock));
        (cache, log)
    }

    #[tokio::test]
    async fn test_fresh_session_selects_the_folder() {
        let (cache, log) = cache_over(
            vec!["q0002 OK [READ-WRITE] selected\r\n"],
            PoolConfig::default(),
        );

        let session = cache.get_session(Some("INBOX"), None).await.unwrap();
        assert!(session.is_fresh());
        assert_eq!(session.folder(), Some("INBOX"));
        assert_eq!(log.connects(), 1);
        assert!(log.sent_text(0).contains("q0002 SELECT \"INBOX\"\r\n"));

        cache.release(session).await;
        assert_eq!(cache.idle_sessions(), 1);
    }

    #[tokio::test]
    async fn test_folder_affinity_skips_the_reselect() {
        let (cache, log) = cache_over(
            vec!["q0002 OK selected\r\nq0003 OK alive\r\n"],
            PoolConfig::default(),
        );

        let session = cache.get_session(Some("INBOX"), None).await.unwrap();
        cache.release(session).await;

        let session = cache.get_session(Some("INBOX"), None).await.unwrap();
        assert!(!session.is_fresh());
        assert_eq!(log.connects(), 1);
        let sent = log.sent_text(0);
        assert_eq!(sent.matches("SELECT").count(), 1);
        assert!(sent.contains("q0003 NOOP\r\n"));
    }

    #[tokio::test]
    async fn test_reselect_follows_the_folder_change_time() {
        let clock = MockClock::shared();
        let config = PoolConfig {
            always_reselect: true,
            ..PoolConfig::default()
        };
        let (connector, log) = scripted_connector(vec![concat!(
            "q0002 OK selected\r\n",
            "q0003 OK alive\r\n",
            "q0004 OK selected\r\n",
            "q0005 OK alive\r\n",
        )
        .to_string()]);
        let cache =
            SessionCache::with_connector(connector, config, Box::new(Arc::clone(&clock)));

        let session = cache.get_session(Some("INBOX"), None).await.unwrap();
        cache.release(session).await;

        // The folder changed after the session selected it.
        clock.advance(Duration::from_secs(10));
        let synced_at = clock.now();
        let session = cache.get_session(Some("INBOX"), Some(synced_at)).await.unwrap();
        assert_eq!(log.sent_text(0).matches("SELECT").count(), 2);
        cache.release(session).await;

        // It has not changed since the reselect.
        let session = cache.get_session(Some("INBOX"), Some(synced_at)).await.unwrap();
        assert_eq!(log.sent_text(0).matches("SELECT").count(), 2);
        cache.release(session).await;
    }

    #[tokio::test]
    async fn test_aged_sessions_drop_without_a_logout() {
        let clock = MockClock::shared();
        let config = PoolConfig {
            forced_disconnect: Some(Duration::from_secs(60)),
            ..PoolConfig::default()
        };
        let (connector, log) = scripted_connector(vec![
            "q0002 OK selected\r\n".to_string(),
            "q0002 OK selected\r\n".to_string(),
        ]);
        let cache =
            SessionCache::with_connector(connector, config, Box::new(Arc::clone(&clock)));

        let session = cache.get_session(Some("INBOX"), None).await.unwrap();
        cache.release(session).await;

        clock.advance(Duration::from_secs(120));
        let session = cache.get_session(Some("INBOX"), None).await.unwrap();
        assert!(session.is_fresh());
        assert_eq!(log.connects(), 2);
        assert!(!log.sent_text(0).contains("LOGOUT"));
    }

    #[tokio::test]
    async fn test_failed_probe_falls_through_to_a_fresh_session() {
        let (cache, log) = cache_over(
            vec!["q0002 OK selected\r\n", "q0002 OK selected\r\n"],
            PoolConfig::default(),
        );

        let session = cache.get_session(Some("INBOX"), None).await.unwrap();
        cache.release(session).await;

        // The pooled session's server is gone; its NOOP probe fails.
        let session = cache.get_session(Some("INBOX"), None).await.unwrap();
        assert!(session.is_fresh());
        assert_eq!(log.connects(), 2);
        assert_eq!(cache.idle_sessions(), 0);
    }

    #[tokio::test]
    async fn test_capacity_repurposes_the_oldest_session() {
        let config = PoolConfig {
            max_sessions: 1,
            ..PoolConfig::default()
        };
        let (cache, log) = cache_over(
            vec!["q0002 OK selected\r\nq0003 OK alive\r\nq0004 OK selected\r\n"],
            config,
        );

        let session = cache.get_session(Some("Alpha"), None).await.unwrap();
        cache.release(session).await;

        let session = cache.get_session(Some("Beta"), None).await.unwrap();
        assert!(!session.is_fresh());
        assert_eq!(session.folder(), Some("Beta"));
        assert_eq!(log.connects(), 1);
        assert!(log.sent_text(0).contains("q0004 SELECT \"Beta\"\r\n"));
    }

    #[tokio::test]
    async fn test_distinct_folders_get_distinct_sessions_below_capacity() {
        let (cache, log) = cache_over(
            vec!["q0002 OK selected\r\n", "q0002 OK selected\r\n"],
            PoolConfig::default(),
        );

        let session = cache.get_session(Some("Alpha"), None).await.unwrap();
        cache.release(session).await;

        let session = cache.get_session(Some("Beta"), None).await.unwrap();
        assert!(session.is_fresh());
        assert_eq!(log.connects(), 2);
        assert_eq!(cache.idle_sessions(), 1);
    }

    #[tokio::test]
    async fn test_destroy_all_disconnects_and_rejects_stale_releases() {
        let (cache, log) = cache_over(vec!["", ""], PoolConfig::default());

        let held = cache.get_session(None, None).await.unwrap();
        let pooled = cache.get_session(None, None).await.unwrap();
        cache.release(pooled).await;
        assert_eq!(cache.idle_sessions(), 1);

        cache.destroy_all_sessions().await;
        assert_eq!(cache.idle_sessions(), 0);
        assert!(log.sent_text(1).contains("LOGOUT"));

        // The held session predates the purge; releasing it logs out.
        cache.release(held).await;
        assert_eq!(cache.idle_sessions(), 0);
        assert!(log.sent_text(0).contains("LOGOUT"));
    }

    #[test]
    fn test_inbox_compares_case_insensitively() {
        assert!(folder_names_equal("INBOX", "inbox", '/'));
        assert!(folder_names_equal("INBOX", "InBox", '/'));
        assert!(folder_names_equal("INBOX/Sent", "inbox/Sent", '/'));
    }

    #[test]
    fn test_segments_after_inbox_compare_exactly() {
        assert!(!folder_names_equal("INBOX/Sent", "INBOX/sent", '/'));
        assert!(!folder_names_equal("INBOXES", "inboxes", '/'));
        assert!(!folder_names_equal("INBOX", "INBOX/", '/'));
    }

    #[test]
    fn test_other_folders_compare_exactly() {
        assert!(folder_names_equal("Archive", "Archive", '/'));
        assert!(!folder_names_equal("Archive", "archive", '/'));
    }
}
