//! Queue of offline jobs with a durable log.

use std::collections::VecDeque;
use std::path::PathBuf;

use bytes::BytesMut;
use mailspool_imap::ImapClient;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;

use super::job::OfflineJob;
use super::log;
use crate::Result;
use crate::store::MailStore;

/// Ordered queue of mutations recorded offline, persisted to a
/// binary log so nothing is lost across restarts.
///
/// New jobs are merged into the previous queue entry where the two
/// describe one larger change. Replay walks the queue front to back
/// and stops at the first failure; the failing job and everything
/// after it stay queued for the next attempt.
///
/// The queue lock is held across a whole replay batch, so jobs added
/// concurrently never land in the middle of one.
pub struct OfflineJobManager {
    path: PathBuf,
    jobs: Mutex<VecDeque<OfflineJob>>,
}

impl OfflineJobManager {
    /// Opens the job log at `path`, loading any queued jobs.
    ///
    /// A missing file is an empty queue. A log with an unreadable
    /// tail keeps its readable prefix; the rest is dropped with a
    /// warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the log exists but cannot be read.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(err.into()),
        };

        let mut jobs = VecDeque::new();
        let mut buf: &[u8] = &bytes;
        while !buf.is_empty() {
            match log::decode(&mut buf) {
                Some(job) => jobs.push_back(job),
                None => {
                    tracing::warn!(
                        remaining = buf.len(),
                        "discarding unreadable tail of the job log"
                    );
                    break;
                }
            }
        }
        tracing::debug!(path = %path.display(), count = jobs.len(), "loaded job log");

        Ok(Self {
            path,
            jobs: Mutex::new(jobs),
        })
    }

    /// Queues a job, combining it with the previous entry when the
    /// two describe one change, and rewrites the log.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be written.
    pub async fn add(&self, job: OfflineJob) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        let merged = jobs.back_mut().is_some_and(|last| last.merge(&job));
        if merged {
            tracing::debug!("merged job into the previous queue entry");
        } else {
            jobs.push_back(job);
        }
        self.save(&jobs).await
    }

    /// Replays every queued job against `client`, front to back.
    ///
    /// A SELECT is issued only when the next job needs a different
    /// folder than the previous one. Each applied job is removed and
    /// the log rewritten before the next starts, so a crash loses no
    /// unapplied job. The first failure stops the batch; the failing
    /// job stays at the front of the queue.
    ///
    /// # Errors
    ///
    /// Returns the first store, log, or server error encountered.
    pub async fn apply<T, S>(&self, store: &mut T, client: &mut ImapClient<S>) -> Result<()>
    where
        T: MailStore,
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut jobs = self.jobs.lock().await;
        if jobs.is_empty() {
            return Ok(());
        }
        tracing::info!(count = jobs.len(), "replaying offline jobs");

        let mut selected: Option<String> = None;
        while let Some(job) = jobs.front() {
            if let Some(folder) = job.select_folder() {
                if selected.as_deref() != Some(folder) {
                    let path = store.folder_path(folder);
                    client.select(&path).await?;
                    selected = Some(folder.to_string());
                }
            }
            job.apply(store, client).await?;
            jobs.pop_front();
            self.save(&jobs).await?;
        }
        tracing::info!("offline replay finished");
        Ok(())
    }

    /// Number of jobs waiting to be replayed.
    pub async fn pending(&self) -> usize {
        self.jobs.lock().await.len()
    }

    /// Snapshot of the queued jobs, front of the queue first.
    pub async fn snapshot(&self) -> Vec<OfflineJob> {
        self.jobs.lock().await.iter().cloned().collect()
    }

    /// Rewrites the log to hold exactly `jobs`, via a temporary file
    /// and a rename.
    async fn save(&self, jobs: &VecDeque<OfflineJob>) -> Result<()> {
        let mut buf = BytesMut::new();
        for job in jobs {
            log::encode(job, &mut buf);
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let staging = self.path.with_extension("tmp");
        tokio::fs::write(&staging, &buf).await?;
        tokio::fs::rename(&staging, &self.path).await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use mailspool_imap::Flags;

    use super::super::job::CopyEntry;
    use super::*;
    use crate::testing::{MemoryStore, scripted_client, sent_text};

    fn log_path(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("offline.log")
    }

    fn seen() -> Flags {
        Flags::from_bits(Flags::SEEN)
    }

    #[tokio::test]
    async fn test_queue_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = log_path(&dir);

        let manager = OfflineJobManager::open(&path).await.unwrap();
        manager.add(OfflineJob::append("Sent", 3)).await.unwrap();
        manager
            .add(OfflineJob::set_flags("INBOX", vec![1, 2], seen(), seen()))
            .await
            .unwrap();

        let reopened = OfflineJobManager::open(&path).await.unwrap();
        assert_eq!(reopened.snapshot().await, manager.snapshot().await);
        assert_eq!(reopened.pending().await, 2);
    }

    #[tokio::test]
    async fn test_add_merges_only_with_the_last_job() {
        let dir = tempfile::tempdir().unwrap();
        let manager = OfflineJobManager::open(log_path(&dir)).await.unwrap();

        manager
            .add(OfflineJob::set_flags("INBOX", vec![1, 2], seen(), seen()))
            .await
            .unwrap();
        manager
            .add(OfflineJob::set_flags("INBOX", vec![2, 3], seen(), seen()))
            .await
            .unwrap();
        assert_eq!(manager.pending().await, 1);

        manager.add(OfflineJob::append("Sent", 9)).await.unwrap();
        manager
            .add(OfflineJob::set_flags("INBOX", vec![4], seen(), seen()))
            .await
            .unwrap();
        assert_eq!(manager.pending().await, 3);

        let jobs = manager.snapshot().await;
        assert_eq!(
            jobs[0],
            OfflineJob::set_flags("INBOX", vec![1, 2, 3], seen(), seen())
        );
    }

    #[tokio::test]
    async fn test_unreadable_tail_is_dropped_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = log_path(&dir);

        let manager = OfflineJobManager::open(&path).await.unwrap();
        manager.add(OfflineJob::append("Sent", 1)).await.unwrap();
        manager.add(OfflineJob::append("Drafts", 2)).await.unwrap();

        let mut bytes = tokio::fs::read(&path).await.unwrap();
        bytes.extend_from_slice(&[9, 9, 9]);
        tokio::fs::write(&path, &bytes).await.unwrap();

        let reopened = OfflineJobManager::open(&path).await.unwrap();
        assert_eq!(reopened.pending().await, 2);
    }

    #[tokio::test]
    async fn test_apply_selects_once_per_folder_run() {
        let dir = tempfile::tempdir().unwrap();
        let manager = OfflineJobManager::open(log_path(&dir)).await.unwrap();

        manager
            .add(OfflineJob::set_flags("INBOX", vec![1], seen(), seen()))
            .await
            .unwrap();
        manager
            .add(OfflineJob::set_flags(
                "INBOX",
                vec![2],
                Flags::from_bits(Flags::DELETED),
                Flags::from_bits(Flags::DELETED),
            ))
            .await
            .unwrap();
        manager
            .add(OfflineJob::copy(
                "Archive",
                "Trash",
                vec![CopyEntry {
                    uid: 5,
                    id: 105,
                    flags: Flags::new(),
                }],
                false,
            ))
            .await
            .unwrap();
        assert_eq!(manager.pending().await, 3);

        let (mut client, sent) = scripted_client(concat!(
            "* 1 EXISTS\r\nq0002 OK [READ-WRITE] selected\r\n",
            "* 1 FETCH (FLAGS (\\Seen))\r\nq0003 OK done\r\n",
            "* 2 FETCH (FLAGS (\\Deleted))\r\nq0004 OK done\r\n",
            "* 1 EXISTS\r\nq0005 OK [READ-WRITE] selected\r\n",
            "q0006 OK done\r\n",
        ))
        .await;
        let mut store = MemoryStore::default();

        manager.apply(&mut store, &mut client).await.unwrap();
        assert_eq!(manager.pending().await, 0);

        let sent = sent_text(&sent);
        assert_eq!(sent.matches("SELECT \"INBOX\"").count(), 1);
        assert_eq!(sent.matches("SELECT \"Archive\"").count(), 1);
        assert!(sent.contains("q0003 UID STORE 1 +FLAGS (\\Seen)"));
        assert!(sent.contains("q0004 UID STORE 2 +FLAGS (\\Deleted)"));
        assert!(sent.contains("q0006 UID COPY 5 \"Trash\""));
        assert_eq!(store.copied, vec![("Trash".to_string(), vec![105])]);
    }

    #[tokio::test]
    async fn test_apply_stops_at_the_first_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = log_path(&dir);
        let manager = OfflineJobManager::open(&path).await.unwrap();

        manager
            .add(OfflineJob::set_flags("INBOX", vec![1], seen(), seen()))
            .await
            .unwrap();
        manager
            .add(OfflineJob::set_flags(
                "INBOX",
                vec![2],
                Flags::from_bits(Flags::DELETED),
                Flags::from_bits(Flags::DELETED),
            ))
            .await
            .unwrap();
        manager
            .add(OfflineJob::append("Sent", 7))
            .await
            .unwrap();

        let (mut client, _sent) = scripted_client(concat!(
            "q0002 OK selected\r\n",
            "* 1 FETCH (FLAGS (\\Seen))\r\nq0003 OK done\r\n",
            "q0004 NO STORE rejected\r\n",
        ))
        .await;
        let mut store = MemoryStore::default();

        let err = manager.apply(&mut store, &mut client).await.unwrap_err();
        assert!(!err.is_transport());

        assert_eq!(manager.pending().await, 2);
        let reopened = OfflineJobManager::open(&path).await.unwrap();
        assert_eq!(reopened.snapshot().await, manager.snapshot().await);
    }

    #[tokio::test]
    async fn test_apply_uploads_from_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let manager = OfflineJobManager::open(log_path(&dir)).await.unwrap();
        manager.add(OfflineJob::append("Sent", 7)).await.unwrap();

        let (mut client, sent) = scripted_client("+ go ahead\r\nq0002 OK appended\r\n").await;
        let mut store = MemoryStore::default();
        store
            .messages
            .insert(("Sent".to_string(), 7), (b"Subject: hi\r\n\r\nx".to_vec(), seen()));

        manager.apply(&mut store, &mut client).await.unwrap();

        let sent = sent_text(&sent);
        assert!(sent.contains("q0002 APPEND \"Sent\" (\\Seen) {16}"));
        assert!(sent.contains("Subject: hi"));
        assert_eq!(store.uploaded, vec![("Sent".to_string(), 7)]);
    }

    #[tokio::test]
    async fn test_apply_skips_uploads_that_left_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let manager = OfflineJobManager::open(log_path(&dir)).await.unwrap();
        manager.add(OfflineJob::append("Sent", 7)).await.unwrap();

        let (mut client, sent) = scripted_client("").await;
        let mut store = MemoryStore::default();

        manager.apply(&mut store, &mut client).await.unwrap();
        assert_eq!(manager.pending().await, 0);
        assert!(!sent_text(&sent).contains("APPEND"));
    }
}
