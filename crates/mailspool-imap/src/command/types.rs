//! Command-related type definitions.

use crate::types::Flags;

/// STATUS items to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusItem {
    /// Number of messages.
    Messages,
    /// Number of recent messages.
    Recent,
    /// Next UID.
    UidNext,
    /// UIDVALIDITY value.
    UidValidity,
    /// Number of unseen messages.
    Unseen,
}

impl StatusItem {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Messages => "MESSAGES",
            Self::Recent => "RECENT",
            Self::UidNext => "UIDNEXT",
            Self::UidValidity => "UIDVALIDITY",
            Self::Unseen => "UNSEEN",
        }
    }
}

/// What a STORE does to the flags of the addressed messages.
///
/// The silent forms suppress the per-message FETCH echoes; use them
/// when nothing digests the echoed flag state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreAction {
    /// Replace the flag set.
    Replace(Flags),
    /// Add flags to the set.
    Add(Flags),
    /// Remove flags from the set.
    Remove(Flags),
    /// Add flags without echoed FETCH responses.
    AddSilent(Flags),
    /// Remove flags without echoed FETCH responses.
    RemoveSilent(Flags),
}

impl StoreAction {
    pub(crate) const fn keyword(&self) -> &'static str {
        match self {
            Self::Replace(_) => "FLAGS",
            Self::Add(_) => "+FLAGS",
            Self::Remove(_) => "-FLAGS",
            Self::AddSilent(_) => "+FLAGS.SILENT",
            Self::RemoveSilent(_) => "-FLAGS.SILENT",
        }
    }

    pub(crate) const fn flags(&self) -> &Flags {
        match self {
            Self::Replace(flags)
            | Self::Add(flags)
            | Self::Remove(flags)
            | Self::AddSilent(flags)
            | Self::RemoveSilent(flags) => flags,
        }
    }
}
