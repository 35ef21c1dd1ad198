//! Command framing.
//!
//! A [`Command`] serializes to one `<tag> <verb> <args>\r\n` line.
//! FETCH item lists and SEARCH criteria are carried as prebuilt
//! argument strings; the typed builders for them live with the
//! callers that know what they want to retrieve.

mod serialize;
mod tag_generator;
mod types;

use crate::types::{Flags, Range};

pub use tag_generator::TagGenerator;
pub use types::{StatusItem, StoreAction};

use serialize::{write_flag_list, write_mailbox, write_quoted};

/// One protocol command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// CAPABILITY.
    Capability,
    /// NOOP.
    Noop,
    /// LOGOUT.
    Logout,
    /// STARTTLS.
    StartTls,
    /// LOGIN with literal credentials.
    Login {
        /// Account name.
        username: String,
        /// Account password.
        password: String,
    },
    /// AUTHENTICATE; the mechanism exchange runs over continuations.
    Authenticate {
        /// SASL mechanism name.
        mechanism: String,
    },
    /// SELECT a mailbox.
    Select {
        /// Mailbox to select.
        mailbox: String,
    },
    /// CLOSE the selected mailbox.
    Close,
    /// CREATE a mailbox.
    Create {
        /// Mailbox to create.
        mailbox: String,
    },
    /// DELETE a mailbox.
    Delete {
        /// Mailbox to delete.
        mailbox: String,
    },
    /// RENAME a mailbox.
    Rename {
        /// Current name.
        from: String,
        /// New name.
        to: String,
    },
    /// SUBSCRIBE to a mailbox.
    Subscribe {
        /// Mailbox to subscribe.
        mailbox: String,
    },
    /// UNSUBSCRIBE from a mailbox.
    Unsubscribe {
        /// Mailbox to unsubscribe.
        mailbox: String,
    },
    /// LIST mailboxes.
    List {
        /// Reference name.
        reference: String,
        /// Mailbox pattern.
        pattern: String,
    },
    /// LSUB subscribed mailboxes.
    Lsub {
        /// Reference name.
        reference: String,
        /// Mailbox pattern.
        pattern: String,
    },
    /// NAMESPACE.
    Namespace,
    /// STATUS of a mailbox.
    Status {
        /// Mailbox to ask about.
        mailbox: String,
        /// Items to request.
        items: Vec<StatusItem>,
    },
    /// APPEND a message; the payload follows the continuation.
    Append {
        /// Target mailbox.
        mailbox: String,
        /// Flags to set on the stored message.
        flags: Flags,
        /// Message bytes announced as a literal.
        message: Vec<u8>,
    },
    /// EXPUNGE the selected mailbox.
    Expunge,
    /// SEARCH with raw criteria.
    Search {
        /// CHARSET argument, when the criteria need one.
        charset: Option<String>,
        /// Criteria in wire syntax.
        criteria: String,
        /// Address results by UID.
        uid: bool,
    },
    /// FETCH items for a message range.
    Fetch {
        /// Messages to address; its UID flag selects UID FETCH.
        range: Range,
        /// Item list in wire syntax.
        items: String,
    },
    /// STORE a flag change for a message range.
    Store {
        /// Messages to address; its UID flag selects UID STORE.
        range: Range,
        /// The flag change.
        action: StoreAction,
    },
    /// COPY a message range to another mailbox.
    Copy {
        /// Messages to address; its UID flag selects UID COPY.
        range: Range,
        /// Target mailbox.
        mailbox: String,
    },
}

impl Command {
    /// Serializes the command line for `tag`, CRLF included.
    ///
    /// For APPEND this is only the announcement; the message bytes
    /// follow the server's continuation.
    #[must_use]
    #[allow(clippy::too_many_lines)]
    pub fn serialize(&self, tag: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(tag.as_bytes());
        buf.push(b' ');

        match self {
            Self::Capability => buf.extend_from_slice(b"CAPABILITY"),
            Self::Noop => buf.extend_from_slice(b"NOOP"),
            Self::Logout => buf.extend_from_slice(b"LOGOUT"),
            Self::StartTls => buf.extend_from_slice(b"STARTTLS"),

            Self::Login { username, password } => {
                buf.extend_from_slice(b"LOGIN ");
                write_quoted(&mut buf, username);
                buf.push(b' ');
                write_quoted(&mut buf, password);
            }

            Self::Authenticate { mechanism } => {
                buf.extend_from_slice(b"AUTHENTICATE ");
                buf.extend_from_slice(mechanism.as_bytes());
            }

            Self::Select { mailbox } => {
                buf.extend_from_slice(b"SELECT ");
                write_mailbox(&mut buf, mailbox);
            }

            Self::Close => buf.extend_from_slice(b"CLOSE"),

            Self::Create { mailbox } => {
                buf.extend_from_slice(b"CREATE ");
                write_mailbox(&mut buf, mailbox);
            }

            Self::Delete { mailbox } => {
                buf.extend_from_slice(b"DELETE ");
                write_mailbox(&mut buf, mailbox);
            }

            Self::Rename { from, to } => {
                buf.extend_from_slice(b"RENAME ");
                write_mailbox(&mut buf, from);
                buf.push(b' ');
                write_mailbox(&mut buf, to);
            }

            Self::Subscribe { mailbox } => {
                buf.extend_from_slice(b"SUBSCRIBE ");
                write_mailbox(&mut buf, mailbox);
            }

            Self::Unsubscribe { mailbox } => {
                buf.extend_from_slice(b"UNSUBSCRIBE ");
                write_mailbox(&mut buf, mailbox);
            }

            Self::List { reference, pattern } => {
                buf.extend_from_slice(b"LIST ");
                write_mailbox(&mut buf, reference);
                buf.push(b' ');
                write_mailbox(&mut buf, pattern);
            }

            Self::Lsub { reference, pattern } => {
                buf.extend_from_slice(b"LSUB ");
                write_mailbox(&mut buf, reference);
                buf.push(b' ');
                write_mailbox(&mut buf, pattern);
            }

            Self::Namespace => buf.extend_from_slice(b"NAMESPACE"),

            Self::Status { mailbox, items } => {
                buf.extend_from_slice(b"STATUS ");
                write_mailbox(&mut buf, mailbox);
                buf.extend_from_slice(b" (");
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        buf.push(b' ');
                    }
                    buf.extend_from_slice(item.as_str().as_bytes());
                }
                buf.push(b')');
            }

            Self::Append {
                mailbox,
                flags,
                message,
            } => {
                buf.extend_from_slice(b"APPEND ");
                write_mailbox(&mut buf, mailbox);
                if !flags.is_empty() {
                    buf.push(b' ');
                    write_flag_list(&mut buf, flags);
                }
                buf.extend_from_slice(format!(" {{{}}}", message.len()).as_bytes());
            }

            Self::Expunge => buf.extend_from_slice(b"EXPUNGE"),

            Self::Search {
                charset,
                criteria,
                uid,
            } => {
                if *uid {
                    buf.extend_from_slice(b"UID ");
                }
                buf.extend_from_slice(b"SEARCH ");
                if let Some(charset) = charset {
                    buf.extend_from_slice(b"CHARSET ");
                    buf.extend_from_slice(charset.as_bytes());
                    buf.push(b' ');
                }
                buf.extend_from_slice(criteria.as_bytes());
            }

            Self::Fetch { range, items } => {
                if range.is_uid() {
                    buf.extend_from_slice(b"UID ");
                }
                buf.extend_from_slice(b"FETCH ");
                buf.extend_from_slice(range.to_string().as_bytes());
                buf.push(b' ');
                buf.extend_from_slice(items.as_bytes());
            }

            Self::Store { range, action } => {
                if range.is_uid() {
                    buf.extend_from_slice(b"UID ");
                }
                buf.extend_from_slice(b"STORE ");
                buf.extend_from_slice(range.to_string().as_bytes());
                buf.push(b' ');
                buf.extend_from_slice(action.keyword().as_bytes());
                buf.push(b' ');
                write_flag_list(&mut buf, action.flags());
            }

            Self::Copy { range, mailbox } => {
                if range.is_uid() {
                    buf.extend_from_slice(b"UID ");
                }
                buf.extend_from_slice(b"COPY ");
                buf.extend_from_slice(range.to_string().as_bytes());
                buf.push(b' ');
                write_mailbox(&mut buf, mailbox);
            }
        }

        buf.extend_from_slice(b"\r\n");
        buf
    }

    /// Whether this command's exchange goes through a `+` line before
    /// the tagged status.
    #[must_use]
    pub const fn awaits_continuation(&self) -> bool {
        matches!(self, Self::Authenticate { .. } | Self::Append { .. })
    }

    /// Whether the serialized line carries credentials and must not be
    /// echoed into logs.
    #[must_use]
    pub const fn is_sensitive(&self) -> bool {
        matches!(self, Self::Login { .. })
    }

    /// The protocol verb, for logs.
    #[must_use]
    pub const fn verb(&self) -> &'static str {
        match self {
            Self::Capability => "CAPABILITY",
            Self::Noop => "NOOP",
            Self::Logout => "LOGOUT",
            Self::StartTls => "STARTTLS",
            Self::Login { .. } => "LOGIN",
            Self::Authenticate { .. } => "AUTHENTICATE",
            Self::Select { .. } => "SELECT",
            Self::Close => "CLOSE",
            Self::Create { .. } => "CREATE",
            Self::Delete { .. } => "DELETE",
            Self::Rename { .. } => "RENAME",
            Self::Subscribe { .. } => "SUBSCRIBE",
            Self::Unsubscribe { .. } => "UNSUBSCRIBE",
            Self::List { .. } => "LIST",
            Self::Lsub { .. } => "LSUB",
            Self::Namespace => "NAMESPACE",
            Self::Status { .. } => "STATUS",
            Self::Append { .. } => "APPEND",
            Self::Expunge => "EXPUNGE",
            Self::Search { .. } => "SEARCH",
            Self::Fetch { .. } => "FETCH",
            Self::Store { .. } => "STORE",
            Self::Copy { .. } => "COPY",
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
    use crate::types::{Flag, Flags};

    use super::*;

    #[test]
    fn select_quotes_the_mailbox() {
        let command = Command::Select {
            mailbox: "INBOX".to_string(),
        };
        assert_eq!(command.serialize("q0000"), b"q0000 SELECT \"INBOX\"\r\n");
    }

    #[test]
    fn mailbox_names_travel_in_utf7() {
        let command = Command::Select {
            mailbox: "Entw\u{fc}rfe".to_string(),
        };
        assert_eq!(
            command.serialize("q0001"),
            b"q0001 SELECT \"Entw&APw-rfe\"\r\n"
        );
    }

    #[test]
    fn login_quotes_and_escapes() {
        let command = Command::Login {
            username: "user@example.com".to_string(),
            password: "pa\"ss".to_string(),
        };
        assert_eq!(
            command.serialize("q0002"),
            b"q0002 LOGIN \"user@example.com\" \"pa\\\"ss\"\r\n"
        );
    }

    #[test]
    fn uid_fetch_takes_the_range_flag() {
        let command = Command::Fetch {
            range: Range::continuous(1, 10, true),
            items: "(FLAGS UID)".to_string(),
        };
        assert_eq!(
            command.serialize("q0003"),
            b"q0003 UID FETCH 1:10 (FLAGS UID)\r\n"
        );
    }

    #[test]
    fn plain_fetch_has_no_uid_prefix() {
        let command = Command::Fetch {
            range: Range::single(7, false),
            items: "BODY.PEEK[HEADER]".to_string(),
        };
        assert_eq!(
            command.serialize("q0004"),
            b"q0004 FETCH 7 BODY.PEEK[HEADER]\r\n"
        );
    }

    #[test]
    fn store_writes_the_action_and_flag_list() {
        let command = Command::Store {
            range: Range::single(3, true),
            action: StoreAction::Add([Flag::Seen].into_iter().collect()),
        };
        assert_eq!(
            command.serialize("q0005"),
            b"q0005 UID STORE 3 +FLAGS (\\Seen)\r\n"
        );
    }

    #[test]
    fn silent_store_suppresses_the_echo() {
        let command = Command::Store {
            range: Range::multiple(vec![4, 5, 6], true),
            action: StoreAction::RemoveSilent(
                [Flag::Keyword("$label1".to_string())].into_iter().collect(),
            ),
        };
        assert_eq!(
            command.serialize("q0005"),
            b"q0005 UID STORE 4:6 -FLAGS.SILENT ($label1)\r\n"
        );
    }

    #[test]
    fn search_with_charset() {
        let command = Command::Search {
            charset: Some("UTF-8".to_string()),
            criteria: "UNSEEN SUBJECT \"hello\"".to_string(),
            uid: true,
        };
        assert_eq!(
            command.serialize("q0006"),
            b"q0006 UID SEARCH CHARSET UTF-8 UNSEEN SUBJECT \"hello\"\r\n"
        );
    }

    #[test]
    fn append_announces_the_literal() {
        let command = Command::Append {
            mailbox: "Sent".to_string(),
            flags: [Flag::Seen].into_iter().collect(),
            message: b"From: a@b\r\n\r\nhi".to_vec(),
        };
        assert_eq!(
            command.serialize("q0007"),
            b"q0007 APPEND \"Sent\" (\\Seen) {15}\r\n"
        );
        assert!(command.awaits_continuation());
    }

    #[test]
    fn append_without_flags_skips_the_list() {
        let command = Command::Append {
            mailbox: "Sent".to_string(),
            flags: Flags::new(),
            message: b"x".to_vec(),
        };
        assert_eq!(command.serialize("q0008"), b"q0008 APPEND \"Sent\" {1}\r\n");
    }

    #[test]
    fn status_item_list() {
        let command = Command::Status {
            mailbox: "INBOX".to_string(),
            items: vec![StatusItem::Messages, StatusItem::UidNext],
        };
        assert_eq!(
            command.serialize("q0009"),
            b"q0009 STATUS \"INBOX\" (MESSAGES UIDNEXT)\r\n"
        );
    }

    #[test]
    fn list_quotes_reference_and_pattern() {
        let command = Command::List {
            reference: String::new(),
            pattern: "*".to_string(),
        };
        assert_eq!(command.serialize("q0010"), b"q0010 LIST \"\" \"*\"\r\n");
    }

    #[test]
    fn only_authenticate_and_append_continue() {
        assert!(
            Command::Authenticate {
                mechanism: "CRAM-MD5".to_string(),
            }
            .awaits_continuation()
        );
        assert!(!Command::Noop.awaits_continuation());
        assert!(
            !Command::Login {
                username: String::new(),
                password: String::new(),
            }
            .awaits_continuation()
        );
    }
}
