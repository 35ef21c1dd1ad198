//! Message ranges and the wire sequence-set syntax.

/// Set of message numbers or UIDs addressed by one command.
///
/// The `uid` flag selects the `UID`-prefixed command family when the
/// range is used, and tells response handling to key on UIDs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Range {
    /// One message.
    Single {
        /// Message number or UID.
        id: u32,
        /// Whether `id` is a UID.
        uid: bool,
    },
    /// Inclusive run `first:last`.
    Continuous {
        /// First id of the run.
        first: u32,
        /// Last id of the run.
        last: u32,
        /// Whether the ids are UIDs.
        uid: bool,
    },
    /// Arbitrary id list, coalesced into runs on the wire.
    Multiple {
        /// Sorted, de-duplicated ids.
        ids: Vec<u32>,
        /// Whether the ids are UIDs.
        uid: bool,
    },
    /// Caller-supplied raw sequence-set text.
    Text {
        /// Verbatim wire text such as `1:*`.
        text: String,
        /// Whether the text denotes UIDs.
        uid: bool,
    },
    /// Every message in the mailbox (`1:*`).
    All {
        /// Whether to address by UID.
        uid: bool,
    },
}

impl Range {
    /// Creates a single-message range.
    #[must_use]
    pub const fn single(id: u32, uid: bool) -> Self {
        Self::Single { id, uid }
    }

    /// Creates an inclusive `first:last` range.
    #[must_use]
    pub const fn continuous(first: u32, last: u32, uid: bool) -> Self {
        Self::Continuous { first, last, uid }
    }

    /// Creates a range over an arbitrary id list.
    ///
    /// The list is sorted and de-duplicated so the wire form is the
    /// minimal sequence-set for the id set.
    #[must_use]
    pub fn multiple(mut ids: Vec<u32>, uid: bool) -> Self {
        ids.sort_unstable();
        ids.dedup();
        Self::Multiple { ids, uid }
    }

    /// Creates a range from raw sequence-set text.
    pub fn text(text: impl Into<String>, uid: bool) -> Self {
        Self::Text {
            text: text.into(),
            uid,
        }
    }

    /// Creates a range covering the whole mailbox.
    #[must_use]
    pub const fn all(uid: bool) -> Self {
        Self::All { uid }
    }

    /// Whether this range denotes UIDs rather than sequence numbers.
    #[must_use]
    pub const fn is_uid(&self) -> bool {
        match self {
            Self::Single { uid, .. }
            | Self::Continuous { uid, .. }
            | Self::Multiple { uid, .. }
            | Self::Text { uid, .. }
            | Self::All { uid } => *uid,
        }
    }

    /// Whether the range addresses no messages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Multiple { ids, .. } => ids.is_empty(),
            Self::Text { text, .. } => text.is_empty(),
            Self::Single { .. } | Self::Continuous { .. } | Self::All { .. } => false,
        }
    }

    /// Expands a sequence-set string back into the id list it denotes.
    ///
    /// Returns `None` for text that is not a plain sequence-set
    /// (empty, malformed, or using `*`).
    #[must_use]
    pub fn expand(text: &str) -> Option<Vec<u32>> {
        if text.is_empty() {
            return None;
        }
        let mut ids = Vec::new();
        for piece in text.split(',') {
            match piece.split_once(':') {
                Some((first, last)) => {
                    let first: u32 = first.parse().ok()?;
                    let last: u32 = last.parse().ok()?;
                    if first > last {
                        return None;
                    }
                    ids.extend(first..=last);
                }
                None => ids.push(piece.parse().ok()?),
            }
        }
        ids.sort_unstable();
        ids.dedup();
        Some(ids)
    }
}

impl std::fmt::Display for Range {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single { id, .. } => write!(f, "{id}"),
            Self::Continuous { first, last, .. } => write!(f, "{first}:{last}"),
            Self::Multiple { ids, .. } => {
                let mut i = 0;
                while i < ids.len() {
                    let mut j = i;
                    while j + 1 < ids.len() && ids[j + 1] == ids[j] + 1 {
                        j += 1;
                    }
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    if j == i {
                        write!(f, "{}", ids[i])?;
                    } else {
                        write!(f, "{}:{}", ids[i], ids[j])?;
                    }
                    i = j + 1;
                }
                Ok(())
            }
            Self::Text { text, .. } => f.write_str(text),
            Self::All { .. } => f.write_str("1:*"),
        }
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

    mod display_tests {
        use super::*;

        #[test]
        fn single() {
            assert_eq!(Range::single(42, false).to_string(), "42");
        }

        #[test]
        fn continuous() {
            assert_eq!(Range::continuous(1, 100, true).to_string(), "1:100");
        }

        #[test]
        fn multiple_coalesces_runs() {
            let range = Range::multiple(vec![3, 4, 5, 9], false);
            assert_eq!(range.to_string(), "3:5,9");
        }

        #[test]
        fn multiple_sorts_and_dedups() {
            let range = Range::multiple(vec![9, 3, 5, 4, 3], false);
            assert_eq!(range.to_string(), "3:5,9");
        }

        #[test]
        fn multiple_singletons_stay_separate() {
            let range = Range::multiple(vec![1, 3, 5], false);
            assert_eq!(range.to_string(), "1,3,5");
        }

        #[test]
        fn text_passes_through() {
            assert_eq!(Range::text("1:*", true).to_string(), "1:*");
        }

        #[test]
        fn all_is_full_mailbox() {
            assert_eq!(Range::all(false).to_string(), "1:*");
        }
    }

    mod expand_tests {
        use super::*;

        #[test]
        fn expands_runs_and_singles() {
            assert_eq!(Range::expand("3:5,9"), Some(vec![3, 4, 5, 9]));
        }

        #[test]
        fn rejects_star() {
            assert_eq!(Range::expand("1:*"), None);
        }

        #[test]
        fn rejects_reversed_run() {
            assert_eq!(Range::expand("5:3"), None);
        }

        #[test]
        fn rejects_empty() {
            assert_eq!(Range::expand(""), None);
        }
    }

    #[test]
    fn uid_flag_is_preserved() {
        assert!(Range::single(1, true).is_uid());
        assert!(!Range::multiple(vec![1, 2], false).is_uid());
        assert!(Range::text("7", true).is_uid());
    }

    #[test]
    fn empty_multiple_is_empty() {
        assert!(Range::multiple(vec![], false).is_empty());
        assert!(!Range::single(1, false).is_empty());
    }

    proptest! {
        /// The emitted sequence-set string expands back to the same
        /// id set it was built from.
        #[test]
        fn wire_form_round_trips(
            ids in proptest::collection::btree_set(1u32..10_000, 1..40)
        ) {
            let ids: Vec<u32> = ids.into_iter().collect();
            let range = Range::multiple(ids.clone(), false);
            prop_assert_eq!(Range::expand(&range.to_string()), Some(ids));
        }
    }
}
