//! Run a command on a pooled session, retrying once on a dead one.
//!
//! A pooled session can die between its liveness probe and the
//! command that follows. When that happens the failure says nothing
//! about the command itself, so the command is worth one more try on
//! a fresh session. Failures on a fresh session, and server rulings
//! like NO or BAD, are final.

use std::time::Instant;

use mailspool_imap::ImapClient;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::Result;
use crate::cache::SessionCache;

/// Checks a session out of `cache`, runs `op` on it, and returns the
/// session to the pool on success.
///
/// On a transport failure the dead session is discarded; if it came
/// from the pool, `op` is retried on a freshly connected session.
/// Protocol failures and fresh-session failures are returned as is.
///
/// # Errors
///
/// Returns an error if acquiring a session fails or `op` fails
/// without a retry left.
pub async fn with_session<S, T, F>(
    cache: &SessionCache<S>,
    folder: Option<&str>,
    synced_at: Option<Instant>,
    mut op: F,
) -> Result<T>
where
    S: AsyncRead + AsyncWrite + Unpin,
    F: AsyncFnMut(&mut ImapClient<S>) -> mailspool_imap::Result<T>,
{
    loop {
        let mut session = cache.get_session(folder, synced_at).await?;
        let fresh = session.is_fresh();
        match op(session.client_mut()).await {
            Ok(value) => {
                cache.release(session).await;
                return Ok(value);
            }
            Err(err) => {
                let retry = !fresh && err.is_transport();
                tracing::debug!(error = %err, retry, "pooled operation failed");
                drop(session);
                if !retry {
                    return Err(err.into());
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::cache::PoolConfig;
    use crate::clock::SystemClock;
    use crate::testing::{ConnectLog, MockStream, scripted_connector};

    fn cache_over(scripts: Vec<&str>) -> (SessionCache<MockStream>, Arc<ConnectLog>) {
        let (connector, log) =
            scripted_connector(scripts.into_iter().map(String::from).collect());
        let cache = SessionCache::with_connector(
            connector,
            PoolConfig::default(),
            Box::new(SystemClock),
        );
        (cache, log)
    }

    #[tokio::test]
    async fn test_success_returns_the_session_to_the_pool() {
        let (cache, log) = cache_over(vec!["q0002 OK selected\r\nq0003 OK done\r\n"]);

        let value = with_session(&cache, Some("INBOX"), None, async |client| {
            client.noop().await.map(|()| 7)
        })
        .await
        .unwrap();

        assert_eq!(value, 7);
        assert_eq!(log.connects(), 1);
        assert_eq!(cache.idle_sessions(), 1);
    }

    #[tokio::test]
    async fn test_dead_pooled_session_gets_one_retry() {
        // The first connection answers its probe, then dies before
        // the NOOP that follows; the second connection completes it.
        let (cache, log) = cache_over(vec![
            "q0002 OK selected\r\nq0003 OK alive\r\n",
            "q0002 OK selected\r\nq0003 OK done\r\n",
        ]);

        let session = cache.get_session(Some("INBOX"), None).await.unwrap();
        cache.release(session).await;

        with_session(&cache, Some("INBOX"), None, async |client| {
            client.noop().await
        })
        .await
        .unwrap();

        assert_eq!(log.connects(), 2);
        assert_eq!(cache.idle_sessions(), 1);
    }

    #[tokio::test]
    async fn test_fresh_session_failure_is_final() {
        // The only connection dies right after SELECT.
        let (cache, log) = cache_over(vec!["q0002 OK selected\r\n"]);

        let err = with_session(&cache, Some("INBOX"), None, async |client| {
            client.noop().await
        })
        .await
        .unwrap_err();

        assert!(err.is_transport());
        assert_eq!(log.connects(), 1);
        assert_eq!(cache.idle_sessions(), 0);
    }

    #[tokio::test]
    async fn test_server_rejection_is_not_retried() {
        let (cache, log) = cache_over(vec![concat!(
            "q0002 OK selected\r\n",
            "q0003 OK alive\r\n",
            "q0004 NO STORE rejected\r\n",
        )]);

        let session = cache.get_session(Some("INBOX"), None).await.unwrap();
        cache.release(session).await;

        let err = with_session(&cache, Some("INBOX"), None, async |client| {
            client.noop().await
        })
        .await
        .unwrap_err();

        assert!(!err.is_transport());
        assert_eq!(log.connects(), 1);
        assert_eq!(cache.idle_sessions(), 0);
    }
}
