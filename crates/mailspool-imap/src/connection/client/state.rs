//! Runtime connection state.
//!
//! The client tracks where it is in the RFC 3501 lifecycle so that a
//! command issued out of turn fails locally instead of confusing the
//! server. States advance only on confirmed server replies.

use crate::types::Flags;

/// Where the connection stands in its lifecycle.
///
/// ```text
/// Init -> Connected -> CapabilityKnown -> Authenticated <-> Selected
/// ```
///
/// A STARTTLS upgrade loops `CapabilityKnown` back onto itself with a
/// fresh CAPABILITY read, because the pre-TLS announcement is not
/// trustworthy. `Disconnected` is terminal; a session that reaches it
/// is only good for dropping.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Socket open, greeting not yet consumed.
    #[default]
    Init,
    /// Greeting accepted; the server's capabilities are still unknown.
    Connected,
    /// CAPABILITY digested; login, AUTHENTICATE or STARTTLS may run.
    CapabilityKnown,
    /// Credentials accepted; mailbox commands may run.
    Authenticated,
    /// A mailbox is open.
    Selected(SelectedMailbox),
    /// The connection is unusable, whether by LOGOUT, BYE, a transport
    /// failure or a response the parser could not recover from.
    Disconnected,
}

impl SessionState {
    /// Whether credentials have been accepted on this connection.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated | Self::Selected(_))
    }

    /// Whether a mailbox is currently open.
    #[must_use]
    pub const fn is_selected(&self) -> bool {
        matches!(self, Self::Selected(_))
    }

    /// The open mailbox, if any.
    #[must_use]
    pub const fn selected(&self) -> Option<&SelectedMailbox> {
        match self {
            Self::Selected(mailbox) => Some(mailbox),
            _ => None,
        }
    }

    /// Name of the open mailbox, if any.
    #[must_use]
    pub fn selected_mailbox(&self) -> Option<&str> {
        self.selected().map(|m| m.mailbox.as_str())
    }

    /// Short name for diagnostics.
    #[must_use]
    pub const fn describe(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Connected => "connected",
            Self::CapabilityKnown => "capability known",
            Self::Authenticated => "authenticated",
            Self::Selected(_) => "selected",
            Self::Disconnected => "disconnected",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.describe())
    }
}

/// Summary of the mailbox opened by the last SELECT.
///
/// Collected from the untagged data of the SELECT exchange; the counts
/// are a snapshot and later untagged EXISTS/EXPUNGE traffic does not
/// rewrite them here.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SelectedMailbox {
    /// Mailbox name as sent in the SELECT.
    pub mailbox: String,
    /// Whether the server answered READ-ONLY.
    pub read_only: bool,
    /// Number of messages in the mailbox.
    pub exists: u32,
    /// Number of messages with `\Recent`.
    pub recent: u32,
    /// UIDVALIDITY value, when announced.
    pub uid_validity: Option<u32>,
    /// Predicted next UID, when announced.
    pub uid_next: Option<u32>,
    /// Message number of the first unseen message, when announced.
    pub unseen: Option<u32>,
    /// Flags applicable in this mailbox.
    pub flags: Flags,
    /// Flags the client may change permanently, when announced.
    pub permanent_flags: Option<Flags>,
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
    use super::*;

    #[test]
    fn default_is_init() {
        assert_eq!(SessionState::default(), SessionState::Init);
    }

    #[test]
    fn authenticated_covers_selected() {
        assert!(!SessionState::Init.is_authenticated());
        assert!(!SessionState::CapabilityKnown.is_authenticated());
        assert!(SessionState::Authenticated.is_authenticated());
        assert!(
            SessionState::Selected(SelectedMailbox {
                mailbox: "INBOX".to_string(),
                ..SelectedMailbox::default()
            })
            .is_authenticated()
        );
        assert!(!SessionState::Disconnected.is_authenticated());
    }

    #[test]
    fn selected_mailbox_name() {
        assert_eq!(SessionState::Authenticated.selected_mailbox(), None);
        let state = SessionState::Selected(SelectedMailbox {
            mailbox: "Drafts".to_string(),
            read_only: true,
            ..SelectedMailbox::default()
        });
        assert_eq!(state.selected_mailbox(), Some("Drafts"));
        assert!(state.selected().unwrap().read_only);
    }

    #[test]
    fn describe_names_every_state() {
        assert_eq!(SessionState::Init.to_string(), "init");
        assert_eq!(SessionState::Disconnected.to_string(), "disconnected");
    }
}
