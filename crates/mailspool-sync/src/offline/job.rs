//! Queued mutation model.

use mailspool_imap::{Flags, ImapClient, Range, StoreAction};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::Result;
use crate::store::MailStore;

/// Bookkeeping for one message travelling with a queued copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyEntry {
    /// UID of the message in the source folder.
    pub uid: u32,
    /// Store id of the placeholder created in the destination folder
    /// when the copy was queued.
    pub id: u32,
    /// Flags the message had at that point.
    pub flags: Flags,
}

/// One queued mutation, replayed in order once a connection returns.
///
/// Jobs are value types: what they change, where, and enough local
/// bookkeeping to reconcile the store afterwards. The decisions about
/// merging with neighbors and surviving restarts live in
/// [`OfflineJobManager`](super::OfflineJobManager).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OfflineJob {
    /// Upload a locally composed message.
    Append {
        /// Destination folder.
        folder: String,
        /// Store id of the local message to upload.
        id: u32,
    },
    /// Copy, or move, messages between folders on the server.
    Copy {
        /// Source folder.
        from: String,
        /// Destination folder.
        to: String,
        /// Per-message bookkeeping, ascending by source UID.
        entries: Vec<CopyEntry>,
        /// Mark the sources deleted after copying.
        move_messages: bool,
    },
    /// Bring the flags of a UID set to a recorded state.
    SetFlags {
        /// Folder holding the messages.
        folder: String,
        /// Target UIDs, ascending.
        uids: Vec<u32>,
        /// Desired flag state.
        flags: Flags,
        /// Flags the change is allowed to touch.
        mask: Flags,
    },
    /// Bring the label keywords of a UID set to a recorded state.
    SetLabel {
        /// Folder holding the messages.
        folder: String,
        /// Target UIDs, ascending.
        uids: Vec<u32>,
        /// Desired label keywords.
        labels: Flags,
        /// Labels the change is allowed to touch.
        mask: Flags,
    },
}

impl OfflineJob {
    /// Creates an upload job for a locally stored message.
    pub fn append(folder: impl Into<String>, id: u32) -> Self {
        Self::Append {
            folder: folder.into(),
            id,
        }
    }

    /// Creates a copy (or move) job; entries are sorted by source UID.
    pub fn copy(
        from: impl Into<String>,
        to: impl Into<String>,
        mut entries: Vec<CopyEntry>,
        move_messages: bool,
    ) -> Self {
        entries.sort_by_key(|entry| entry.uid);
        entries.dedup_by_key(|entry| entry.uid);
        Self::Copy {
            from: from.into(),
            to: to.into(),
            entries,
            move_messages,
        }
    }

    /// Creates a flag-change job; UIDs are sorted and de-duplicated.
    pub fn set_flags(
        folder: impl Into<String>,
        mut uids: Vec<u32>,
        flags: Flags,
        mask: Flags,
    ) -> Self {
        uids.sort_unstable();
        uids.dedup();
        Self::SetFlags {
            folder: folder.into(),
            uids,
            flags,
            mask,
        }
    }

    /// Creates a label-change job; UIDs are sorted and de-duplicated.
    pub fn set_label(
        folder: impl Into<String>,
        mut uids: Vec<u32>,
        labels: Flags,
        mask: Flags,
    ) -> Self {
        uids.sort_unstable();
        uids.dedup();
        Self::SetLabel {
            folder: folder.into(),
            uids,
            labels,
            mask,
        }
    }

    /// The folder a session must have selected before this job runs,
    /// if any. APPEND addresses its mailbox in the command itself.
    #[must_use]
    pub fn select_folder(&self) -> Option<&str> {
        match self {
            Self::Append { .. } => None,
            Self::Copy { from, .. } => Some(from),
            Self::SetFlags { folder, .. } | Self::SetLabel { folder, .. } => Some(folder),
        }
    }

    /// Tries to absorb `other` into this job.
    ///
    /// Flag changes against the same folder with the same flag state
    /// combine into one UID set; copies along the same route combine
    /// keeping their bookkeeping ordered by source UID. Uploads and
    /// label changes always queue separately. Returns whether `other`
    /// was absorbed.
    pub fn merge(&mut self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::SetFlags {
                    folder,
                    uids,
                    flags,
                    mask,
                },
                Self::SetFlags {
                    folder: other_folder,
                    uids: other_uids,
                    flags: other_flags,
                    mask: other_mask,
                },
            ) if folder == other_folder && flags == other_flags && mask == other_mask => {
                uids.extend_from_slice(other_uids);
                uids.sort_unstable();
                uids.dedup();
                true
            }
            (
                Self::Copy {
                    from,
                    to,
                    entries,
                    move_messages,
                },
                Self::Copy {
                    from: other_from,
                    to: other_to,
                    entries: other_entries,
                    move_messages: other_move,
                },
            ) if from == other_from && to == other_to && move_messages == other_move => {
                entries.extend(other_entries.iter().cloned());
                entries.sort_by_key(|entry| entry.uid);
                entries.dedup_by_key(|entry| entry.uid);
                true
            }
            _ => false,
        }
    }

    /// Replays this job against a live client.
    ///
    /// The caller has already positioned the session on
    /// [`select_folder`](Self::select_folder) when one is required.
    ///
    /// # Errors
    ///
    /// Returns an error when the store or the server rejects the
    /// mutation; the job should stay queued in that case.
    pub async fn apply<T, S>(&self, store: &mut T, client: &mut ImapClient<S>) -> Result<()>
    where
        T: MailStore,
        S: AsyncRead + AsyncWrite + Unpin,
    {
        match self {
            Self::Append { folder, id } => {
                let Some((message, flags)) = store.load_message(folder, *id)? else {
                    tracing::debug!(
                        folder = %folder,
                        id = *id,
                        "skipping upload of a message no longer in the store"
                    );
                    return Ok(());
                };
                let path = store.folder_path(folder);
                client.append(&path, flags, message).await?;
                store.uploaded(folder, *id)?;
            }
            Self::Copy {
                to,
                entries,
                move_messages,
                ..
            } => {
                let uids: Vec<u32> = entries.iter().map(|entry| entry.uid).collect();
                let range = Range::multiple(uids, true);
                let path = store.folder_path(to);
                client.copy(&range, &path).await?;
                if *move_messages {
                    let deleted = Flags::from_bits(Flags::DELETED);
                    client.set_flags(&range, &deleted, &deleted).await?;
                }
                let ids: Vec<u32> = entries.iter().map(|entry| entry.id).collect();
                store.copied(to, &ids)?;
            }
            Self::SetFlags {
                folder,
                uids,
                flags,
                mask,
            } => {
                let range = Range::multiple(uids.clone(), true);
                client.set_flags(&range, flags, mask).await?;
                store.flags_applied(folder, uids, flags, mask)?;
            }
            Self::SetLabel {
                folder,
                uids,
                labels,
                mask,
            } => {
                let range = Range::multiple(uids.clone(), true);
                let removed = labels.removed(mask);
                if !removed.is_empty() {
                    client.store(&range, StoreAction::RemoveSilent(removed)).await?;
                }
                let added = labels.added(mask);
                if !added.is_empty() {
                    client.store(&range, StoreAction::AddSilent(added)).await?;
                }
                store.flags_applied(folder, uids, labels, mask)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn entry(uid: u32, id: u32) -> CopyEntry {
        CopyEntry {
            uid,
            id,
            flags: Flags::new(),
        }
    }

    #[test]
    fn test_set_flags_merge_unions_uids() {
        let seen = Flags::from_bits(Flags::SEEN);
        let mut job = OfflineJob::set_flags("INBOX", vec![1, 2], seen.clone(), seen.clone());
        let other = OfflineJob::set_flags("INBOX", vec![2, 3], seen.clone(), seen.clone());

        assert!(job.merge(&other));
        assert_eq!(
            job,
            OfflineJob::set_flags("INBOX", vec![1, 2, 3], seen.clone(), seen)
        );
    }

    #[test]
    fn test_merge_grouping_does_not_change_the_result() {
        let seen = Flags::from_bits(Flags::SEEN);
        let a = OfflineJob::set_flags("INBOX", vec![5, 1], seen.clone(), seen.clone());
        let b = OfflineJob::set_flags("INBOX", vec![2, 5], seen.clone(), seen.clone());
        let c = OfflineJob::set_flags("INBOX", vec![9], seen.clone(), seen);

        let mut left = a.clone();
        assert!(left.merge(&b));
        assert!(left.merge(&c));

        let mut tail = b;
        assert!(tail.merge(&c));
        let mut right = a;
        assert!(right.merge(&tail));

        assert_eq!(left, right);
    }

    #[test]
    fn test_set_flags_merge_requires_same_change() {
        let seen = Flags::from_bits(Flags::SEEN);
        let deleted = Flags::from_bits(Flags::DELETED);

        let mut job = OfflineJob::set_flags("INBOX", vec![1], seen.clone(), seen.clone());
        assert!(!job.merge(&OfflineJob::set_flags(
            "INBOX",
            vec![2],
            deleted.clone(),
            deleted
        )));
        assert!(!job.merge(&OfflineJob::set_flags(
            "Archive",
            vec![2],
            seen.clone(),
            seen
        )));
    }

    #[test]
    fn test_copy_merge_keeps_entries_parallel() {
        let mut job =
            OfflineJob::copy("INBOX", "Archive", vec![entry(5, 105), entry(1, 101)], false);
        let other = OfflineJob::copy("INBOX", "Archive", vec![entry(3, 103)], false);

        assert!(job.merge(&other));
        let OfflineJob::Copy { entries, .. } = &job else {
            panic!("merge changed the job kind");
        };
        assert_eq!(
            entries.iter().map(|e| (e.uid, e.id)).collect::<Vec<_>>(),
            vec![(1, 101), (3, 103), (5, 105)]
        );
    }

    #[test]
    fn test_copy_merge_requires_same_route() {
        let mut job = OfflineJob::copy("INBOX", "Archive", vec![entry(1, 101)], false);
        assert!(!job.merge(&OfflineJob::copy(
            "INBOX",
            "Trash",
            vec![entry(2, 102)],
            false
        )));
        assert!(!job.merge(&OfflineJob::copy(
            "INBOX",
            "Archive",
            vec![entry(2, 102)],
            true
        )));
    }

    #[test]
    fn test_appends_and_labels_never_merge() {
        let labels = Flags::with_custom(0, vec!["$work".to_string()]);

        let mut append = OfflineJob::append("Sent", 7);
        assert!(!append.merge(&OfflineJob::append("Sent", 7)));

        let mut label =
            OfflineJob::set_label("INBOX", vec![1], labels.clone(), labels.clone());
        assert!(!label.merge(&OfflineJob::set_label("INBOX", vec![2], labels.clone(), labels)));
    }

    #[test]
    fn test_select_folder_per_kind() {
        let seen = Flags::from_bits(Flags::SEEN);
        assert_eq!(OfflineJob::append("Sent", 1).select_folder(), None);
        assert_eq!(
            OfflineJob::copy("INBOX", "Archive", vec![entry(1, 1)], true).select_folder(),
            Some("INBOX")
        );
        assert_eq!(
            OfflineJob::set_flags("Drafts", vec![1], seen.clone(), seen).select_folder(),
            Some("Drafts")
        );
    }

    #[test]
    fn test_constructors_sort_and_dedup() {
        let seen = Flags::from_bits(Flags::SEEN);
        let job = OfflineJob::set_flags("INBOX", vec![9, 3, 3, 1], seen.clone(), seen);
        let OfflineJob::SetFlags { uids, .. } = &job else {
            panic!("wrong kind");
        };
        assert_eq!(uids, &[1, 3, 9]);

        let job = OfflineJob::copy(
            "A",
            "B",
            vec![entry(4, 104), entry(2, 102), entry(4, 999)],
            false,
        );
        let OfflineJob::Copy { entries, .. } = &job else {
            panic!("wrong kind");
        };
        assert_eq!(
            entries.iter().map(|e| (e.uid, e.id)).collect::<Vec<_>>(),
            vec![(2, 102), (4, 104)]
        );
    }
}
