//! Response data model.

use chrono::{DateTime, FixedOffset};

use crate::Error;
use crate::types::Flags;

/// Status condition of a greeting or status response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    /// Success.
    Ok,
    /// Operational failure.
    No,
    /// Protocol-level rejection.
    Bad,
    /// Greeting on an already-authenticated connection.
    PreAuth,
    /// Connection is closing.
    Bye,
}

/// Structured `[...]` code on a status response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseCode {
    /// Text that must be shown to the user.
    Alert,
    /// Mailbox was renamed while the command ran.
    NewName {
        /// Name the command used.
        old: String,
        /// Name it now has.
        new: String,
    },
    /// Server failed to parse a message header.
    Parse,
    /// Flags the client may change permanently.
    PermanentFlags(Flags),
    /// Mailbox is selected read-only.
    ReadOnly,
    /// Mailbox is selected read-write.
    ReadWrite,
    /// Target mailbox does not exist but may be created.
    TryCreate,
    /// UID validity value of the selected mailbox.
    UidValidity(u32),
    /// Number of the first unseen message.
    Unseen(u32),
    /// Predicted next UID.
    UidNext(u32),
    /// Code this client has no structured reading for.
    Other {
        /// Code atom.
        atom: String,
        /// Argument text after the atom, if any.
        text: Option<String>,
    },
}

/// A tagged or untagged status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct State {
    /// Command tag, or `None` for untagged status.
    pub tag: Option<String>,
    /// OK/NO/BAD/PREAUTH/BYE.
    pub condition: Condition,
    /// Structured bracket code, when present.
    pub code: Option<ResponseCode>,
    /// Human-readable text.
    pub text: String,
}

impl State {
    /// Whether the server reported success.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self.condition, Condition::Ok | Condition::PreAuth)
    }

    /// Whether this is a connection-closing BYE.
    #[must_use]
    pub fn is_bye(&self) -> bool {
        self.condition == Condition::Bye
    }

    /// The failure this status denotes, if any.
    #[must_use]
    pub fn as_error(&self) -> Option<Error> {
        match self.condition {
            Condition::Ok | Condition::PreAuth => None,
            Condition::No => Some(Error::No(self.text.clone())),
            Condition::Bad => Some(Error::Bad(self.text.clone())),
            Condition::Bye => Some(Error::Bye(self.text.clone())),
        }
    }
}

/// One parsed server response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// `* CAPABILITY ...` atom list.
    Capability(Vec<String>),
    /// `+` continuation request.
    Continue {
        /// Prompt text after the `+`, if any.
        text: Option<String>,
    },
    /// `* n EXISTS` message count.
    Exists(u32),
    /// `* n EXPUNGE` removed message number.
    Expunge(u32),
    /// `* n FETCH (...)` data items.
    Fetch(FetchResponse),
    /// `* FLAGS (...)` applicable flags.
    Flags(Flags),
    /// `* LIST ...` or `* LSUB ...` mailbox entry.
    List(ListItem),
    /// `* NAMESPACE ...` prefixes.
    Namespace(Namespace),
    /// `* n RECENT` count.
    Recent(u32),
    /// `* SEARCH n n n` matches.
    Search(Vec<u32>),
    /// Tagged or untagged status line.
    State(State),
    /// `* STATUS mailbox (...)` counters.
    Status(StatusResponse),
}

/// Data items from one `* n FETCH` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    /// Message sequence number.
    pub number: u32,
    /// Message UID, folded out of the item list when the server sent
    /// one.
    pub uid: Option<u32>,
    /// Remaining data items, in server order.
    pub items: Vec<FetchData>,
}

impl FetchResponse {
    /// Flags item, if the response carried one.
    #[must_use]
    pub fn flags(&self) -> Option<&Flags> {
        self.items.iter().find_map(|item| match item {
            FetchData::Flags(flags) => Some(flags),
            _ => None,
        })
    }

    /// Envelope item, if the response carried one.
    #[must_use]
    pub fn envelope(&self) -> Option<&Envelope> {
        self.items.iter().find_map(|item| match item {
            FetchData::Envelope(envelope) => Some(envelope),
            _ => None,
        })
    }

    /// Internal date item, if the response carried one.
    #[must_use]
    pub fn internal_date(&self) -> Option<DateTime<FixedOffset>> {
        self.items.iter().find_map(|item| match item {
            FetchData::InternalDate(date) => Some(*date),
            _ => None,
        })
    }

    /// RFC822.SIZE item, if the response carried one.
    #[must_use]
    pub fn size(&self) -> Option<u32> {
        self.items.iter().find_map(|item| match item {
            FetchData::Size(size) => Some(*size),
            _ => None,
        })
    }

    /// Body structure item, if the response carried one.
    #[must_use]
    pub fn body_structure(&self) -> Option<&BodyStructure> {
        self.items.iter().find_map(|item| match item {
            FetchData::BodyStructure(bs) => Some(bs),
            _ => None,
        })
    }

    /// Moves the body structure out of the item list, leaving the
    /// other items in place.
    pub fn take_body_structure(&mut self) -> Option<BodyStructure> {
        let at = self
            .items
            .iter()
            .position(|item| matches!(item, FetchData::BodyStructure(_)))?;
        match self.items.remove(at) {
            FetchData::BodyStructure(bs) => Some(bs),
            _ => None,
        }
    }

    /// Body content for the section matching `section`.
    #[must_use]
    pub fn body(&self, section: &BodySection) -> Option<&[u8]> {
        self.items.iter().find_map(|item| match item {
            FetchData::Body(body) if body.section == *section => {
                Some(body.content.as_slice())
            }
            _ => None,
        })
    }

    /// All body items, in server order.
    pub fn bodies(&self) -> impl Iterator<Item = &FetchDataBody> {
        self.items.iter().filter_map(|item| match item {
            FetchData::Body(body) => Some(body),
            _ => None,
        })
    }
}

/// One FETCH data item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchData {
    /// `BODY[...]` content.
    Body(FetchDataBody),
    /// `BODYSTRUCTURE` or structural `BODY` tree.
    BodyStructure(BodyStructure),
    /// `ENVELOPE` summary headers.
    Envelope(Envelope),
    /// `FLAGS` set.
    Flags(Flags),
    /// `INTERNALDATE`.
    InternalDate(DateTime<FixedOffset>),
    /// `RFC822.SIZE` in bytes.
    Size(u32),
}

/// Content of one `BODY[...]` item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchDataBody {
    /// Which section the content belongs to.
    pub section: BodySection,
    /// Partial-fetch origin octet, from `<n>` after the section.
    pub origin: Option<u32>,
    /// Content bytes; empty when the server sent NIL.
    pub content: Vec<u8>,
}

/// What a `BODY[...]` section addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    /// Entire message or part.
    Whole,
    /// Full header block.
    Header,
    /// Only the named header fields.
    HeaderFields,
    /// All header fields except the named ones.
    HeaderFieldsNot,
    /// MIME header of a part.
    Mime,
    /// Body text without headers.
    Text,
}

/// Parsed `BODY[...]` section specifier.
#[derive(Debug, Clone, Eq)]
pub struct BodySection {
    /// Dotted part path, 1-based; empty for the whole message.
    pub part: Vec<u32>,
    /// What is addressed within the part.
    pub kind: SectionKind,
    /// Header field names for `HEADER.FIELDS`/`HEADER.FIELDS.NOT`.
    pub fields: Vec<String>,
}

impl PartialEq for BodySection {
    /// Field names compare case-insensitively, so a section built for
    /// a request matches the server's echo of it.
    fn eq(&self, other: &Self) -> bool {
        self.part == other.part
            && self.kind == other.kind
            && self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(&other.fields)
                .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }
}

impl BodySection {
    /// The whole-message section, `BODY[]`.
    #[must_use]
    pub const fn whole() -> Self {
        Self {
            part: Vec::new(),
            kind: SectionKind::Whole,
            fields: Vec::new(),
        }
    }

    /// A part-path section addressing the part's content.
    #[must_use]
    pub const fn for_part(part: Vec<u32>) -> Self {
        Self {
            part,
            kind: SectionKind::Whole,
            fields: Vec::new(),
        }
    }

    /// A part-path section addressing the part's MIME header.
    #[must_use]
    pub const fn mime_of(part: Vec<u32>) -> Self {
        Self {
            part,
            kind: SectionKind::Mime,
            fields: Vec::new(),
        }
    }

    /// Parses the text between the brackets of a section specifier,
    /// e.g. `1.2.MIME` or `HEADER.FIELDS (From To)`.
    ///
    /// Returns `None` for text that is not a section this client ever
    /// requests.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let mut part = Vec::new();
        let mut rest = text.trim();
        loop {
            let digits_len = rest.bytes().take_while(u8::is_ascii_digit).count();
            if digits_len == 0 {
                break;
            }
            let after = &rest[digits_len..];
            // A trailing numeric segment is a part number only when
            // followed by `.` or nothing; otherwise it is malformed.
            match after.bytes().next() {
                None => {
                    part.push(rest[..digits_len].parse().ok()?);
                    rest = "";
                    break;
                }
                Some(b'.') => {
                    part.push(rest[..digits_len].parse().ok()?);
                    rest = &after[1..];
                }
                Some(_) => return None,
            }
        }

        let upper = rest.to_ascii_uppercase();
        let (kind, fields) = if upper.is_empty() {
            (SectionKind::Whole, Vec::new())
        } else if upper == "HEADER" {
            (SectionKind::Header, Vec::new())
        } else if upper == "MIME" {
            (SectionKind::Mime, Vec::new())
        } else if upper == "TEXT" {
            (SectionKind::Text, Vec::new())
        } else if let Some(args) = upper.strip_prefix("HEADER.FIELDS.NOT") {
            (
                SectionKind::HeaderFieldsNot,
                parse_field_list(&rest[rest.len() - args.len()..])?,
            )
        } else if let Some(args) = upper.strip_prefix("HEADER.FIELDS") {
            (
                SectionKind::HeaderFields,
                parse_field_list(&rest[rest.len() - args.len()..])?,
            )
        } else {
            return None;
        };
        Some(Self { part, kind, fields })
    }
}

/// Parses the parenthesized name list after `HEADER.FIELDS[.NOT]`.
fn parse_field_list(text: &str) -> Option<Vec<String>> {
    let inner = text.trim().strip_prefix('(')?.strip_suffix(')')?;
    Some(
        inner
            .split_whitespace()
            .map(|name| name.trim_matches('"').to_string())
            .collect(),
    )
}

impl std::fmt::Display for BodySection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut need_dot = false;
        for number in &self.part {
            if need_dot {
                f.write_str(".")?;
            }
            write!(f, "{number}")?;
            need_dot = true;
        }
        let suffix = match self.kind {
            SectionKind::Whole => None,
            SectionKind::Header => Some("HEADER"),
            SectionKind::HeaderFields => Some("HEADER.FIELDS"),
            SectionKind::HeaderFieldsNot => Some("HEADER.FIELDS.NOT"),
            SectionKind::Mime => Some("MIME"),
            SectionKind::Text => Some("TEXT"),
        };
        if let Some(suffix) = suffix {
            if need_dot {
                f.write_str(".")?;
            }
            f.write_str(suffix)?;
        }
        if matches!(
            self.kind,
            SectionKind::HeaderFields | SectionKind::HeaderFieldsNot
        ) {
            f.write_str(" (")?;
            for (i, field) in self.fields.iter().enumerate() {
                if i > 0 {
                    f.write_str(" ")?;
                }
                f.write_str(field)?;
            }
            f.write_str(")")?;
        }
        Ok(())
    }
}

/// One node of a message's MIME structure.
///
/// Multipart nodes carry `children`; `message/rfc822` nodes carry the
/// enclosed message's `envelope` and a single child for its body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BodyStructure {
    /// Media type, e.g. `text` or `multipart`.
    pub content_type: String,
    /// Media subtype, e.g. `plain` or `mixed`.
    pub content_subtype: String,
    /// Content-Type parameters.
    pub params: Vec<(String, String)>,
    /// Content-ID.
    pub id: Option<String>,
    /// Content-Description.
    pub description: Option<String>,
    /// Content-Transfer-Encoding.
    pub encoding: String,
    /// Size in bytes; 0 when the server sent NIL.
    pub size: u32,
    /// Line count, for text and message parts.
    pub lines: Option<u32>,
    /// Body MD5, rarely sent.
    pub md5: Option<String>,
    /// Content-Disposition type.
    pub disposition: Option<String>,
    /// Content-Disposition parameters.
    pub disposition_params: Vec<(String, String)>,
    /// Content languages.
    pub languages: Vec<String>,
    /// Envelope of an enclosed `message/rfc822`.
    pub envelope: Option<Box<Envelope>>,
    /// Child parts, in order; non-empty only for multipart and
    /// `message/rfc822` nodes.
    pub children: Vec<BodyStructure>,
}

impl BodyStructure {
    /// Whether this node is a multipart container.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.content_type.eq_ignore_ascii_case("multipart")
    }

    /// Whether this node encloses a complete message.
    #[must_use]
    pub fn is_message(&self) -> bool {
        self.content_type.eq_ignore_ascii_case("message")
            && self.content_subtype.eq_ignore_ascii_case("rfc822")
    }

    /// Content-Type parameter by name, ASCII case-insensitively.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Resolves a dotted 1-based part path against this node.
    ///
    /// Follows the numbering servers use for section specifiers: a
    /// multipart's children are its parts; an enclosed message's
    /// parts are numbered as if that message were at top level; part
    /// 1 of a non-multipart node is the node itself.
    #[must_use]
    pub fn part(&self, path: &[u32]) -> Option<&Self> {
        let Some((&head, rest)) = path.split_first() else {
            return Some(self);
        };
        if self.is_multipart() {
            let child = self.children.get(head.checked_sub(1)? as usize)?;
            return child.part(rest);
        }
        if self.is_message() {
            let inner = self.children.first()?;
            if inner.is_multipart() {
                return inner.part(path);
            }
            if head == 1 {
                return inner.part(rest);
            }
            return None;
        }
        if head == 1 && rest.is_empty() {
            return Some(self);
        }
        None
    }
}

/// Summary headers from an `ENVELOPE` item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    /// Date header text.
    pub date: Option<String>,
    /// Subject header text.
    pub subject: Option<String>,
    /// From addresses.
    pub from: Vec<Address>,
    /// Sender addresses.
    pub sender: Vec<Address>,
    /// Reply-To addresses.
    pub reply_to: Vec<Address>,
    /// To addresses.
    pub to: Vec<Address>,
    /// Cc addresses.
    pub cc: Vec<Address>,
    /// Bcc addresses.
    pub bcc: Vec<Address>,
    /// In-Reply-To header text.
    pub in_reply_to: Option<String>,
    /// Message-ID header text.
    pub message_id: Option<String>,
}

/// One address from an envelope address list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Address {
    /// Display name.
    pub name: Option<String>,
    /// Source route, obsolete.
    pub adl: Option<String>,
    /// Local part.
    pub mailbox: Option<String>,
    /// Domain part.
    pub host: Option<String>,
}

impl Address {
    /// `mailbox@host` when both parts are present.
    #[must_use]
    pub fn email(&self) -> Option<String> {
        match (&self.mailbox, &self.host) {
            (Some(mailbox), Some(host)) => Some(format!("{mailbox}@{host}")),
            _ => None,
        }
    }
}

/// Name attributes on a LIST/LSUB entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListAttributes(u32);

impl ListAttributes {
    /// No attributes.
    pub const NONE: Self = Self(0);
    /// `\Noinferiors`: no mailboxes can exist below this one.
    pub const NOINFERIORS: Self = Self(0x01);
    /// `\Noselect`: the name cannot be selected.
    pub const NOSELECT: Self = Self(0x02);
    /// `\Marked`: the mailbox has recent activity.
    pub const MARKED: Self = Self(0x04);
    /// `\Unmarked`: the mailbox has no recent activity.
    pub const UNMARKED: Self = Self(0x08);

    /// Attribute named by a wire atom, or `None` for an unknown one.
    #[must_use]
    pub fn from_atom(atom: &str) -> Option<Self> {
        if atom.eq_ignore_ascii_case("\\NOINFERIORS") {
            Some(Self::NOINFERIORS)
        } else if atom.eq_ignore_ascii_case("\\NOSELECT") {
            Some(Self::NOSELECT)
        } else if atom.eq_ignore_ascii_case("\\MARKED") {
            Some(Self::MARKED)
        } else if atom.eq_ignore_ascii_case("\\UNMARKED") {
            Some(Self::UNMARKED)
        } else {
            None
        }
    }

    /// Whether every attribute in `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for ListAttributes {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for ListAttributes {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// One mailbox from a LIST or LSUB response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListItem {
    /// Name attributes.
    pub attributes: ListAttributes,
    /// Hierarchy delimiter, `None` for a flat namespace.
    pub separator: Option<char>,
    /// Mailbox name, decoded from modified UTF-7.
    pub mailbox: String,
    /// Whether the entry came from LSUB rather than LIST.
    pub lsub: bool,
}

/// One prefix from a NAMESPACE response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceEntry {
    /// Mailbox name prefix, decoded from modified UTF-7.
    pub prefix: String,
    /// Hierarchy delimiter for names under the prefix.
    pub separator: Option<char>,
}

/// Namespace prefixes by class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Namespace {
    /// The user's own mailboxes.
    pub personal: Vec<NamespaceEntry>,
    /// Other users' mailboxes.
    pub others: Vec<NamespaceEntry>,
    /// Shared mailboxes.
    pub shared: Vec<NamespaceEntry>,
}

/// Counters from a `* STATUS` response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusResponse {
    /// Mailbox the counters describe, decoded from modified UTF-7.
    pub mailbox: String,
    /// MESSAGES counter.
    pub messages: Option<u32>,
    /// RECENT counter.
    pub recent: Option<u32>,
    /// UIDNEXT value.
    pub uid_next: Option<u32>,
    /// UIDVALIDITY value.
    pub uid_validity: Option<u32>,
    /// UNSEEN counter.
    pub unseen: Option<u32>,
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

    mod section_tests {
        use super::*;

        #[test]
        fn empty_is_whole_message() {
            let section = BodySection::parse("").unwrap();
            assert_eq!(section, BodySection::whole());
            assert_eq!(section.to_string(), "");
        }

        #[test]
        fn bare_part_path() {
            let section = BodySection::parse("1.2").unwrap();
            assert_eq!(section.part, vec![1, 2]);
            assert_eq!(section.kind, SectionKind::Whole);
            assert_eq!(section.to_string(), "1.2");
        }

        #[test]
        fn part_path_with_mime() {
            let section = BodySection::parse("1.2.MIME").unwrap();
            assert_eq!(section.part, vec![1, 2]);
            assert_eq!(section.kind, SectionKind::Mime);
            assert_eq!(section.to_string(), "1.2.MIME");
        }

        #[test]
        fn header_fields_keeps_names() {
            let section = BodySection::parse("HEADER.FIELDS (From To Subject)").unwrap();
            assert_eq!(section.kind, SectionKind::HeaderFields);
            assert_eq!(section.fields, vec!["From", "To", "Subject"]);
            assert_eq!(section.to_string(), "HEADER.FIELDS (From To Subject)");
        }

        #[test]
        fn header_fields_not() {
            let section = BodySection::parse("HEADER.FIELDS.NOT (Received)").unwrap();
            assert_eq!(section.kind, SectionKind::HeaderFieldsNot);
            assert_eq!(section.fields, vec!["Received"]);
        }

        #[test]
        fn nested_text_section() {
            let section = BodySection::parse("2.1.TEXT").unwrap();
            assert_eq!(section.part, vec![2, 1]);
            assert_eq!(section.kind, SectionKind::Text);
        }

        #[test]
        fn keyword_case_is_normalized() {
            let section = BodySection::parse("1.mime").unwrap();
            assert_eq!(section.kind, SectionKind::Mime);
            assert_eq!(section.to_string(), "1.MIME");
        }

        #[test]
        fn unknown_keyword_is_rejected() {
            assert_eq!(BodySection::parse("1.BOGUS"), None);
        }

        #[test]
        fn quoted_field_names_lose_quotes() {
            let section = BodySection::parse("HEADER.FIELDS (\"From\" \"To\")").unwrap();
            assert_eq!(section.fields, vec!["From", "To"]);
        }
    }

    mod part_path_tests {
        use super::*;

        fn text_part(subtype: &str) -> BodyStructure {
            BodyStructure {
                content_type: "text".to_string(),
                content_subtype: subtype.to_string(),
                encoding: "7bit".to_string(),
                size: 100,
                lines: Some(5),
                ..BodyStructure::default()
            }
        }

        fn multipart(subtype: &str, children: Vec<BodyStructure>) -> BodyStructure {
            BodyStructure {
                content_type: "multipart".to_string(),
                content_subtype: subtype.to_string(),
                children,
                ..BodyStructure::default()
            }
        }

        #[test]
        fn empty_path_is_root() {
            let root = text_part("plain");
            assert_eq!(root.part(&[]), Some(&root));
        }

        #[test]
        fn part_one_of_simple_message_is_itself() {
            let root = text_part("plain");
            assert_eq!(root.part(&[1]), Some(&root));
            assert_eq!(root.part(&[2]), None);
        }

        #[test]
        fn multipart_children_by_index() {
            let root = multipart("alternative", vec![text_part("plain"), text_part("html")]);
            assert_eq!(root.part(&[1]).unwrap().content_subtype, "plain");
            assert_eq!(root.part(&[2]).unwrap().content_subtype, "html");
            assert_eq!(root.part(&[3]), None);
            assert_eq!(root.part(&[0]), None);
        }

        #[test]
        fn nested_multipart_path() {
            let inner = multipart("alternative", vec![text_part("plain"), text_part("html")]);
            let root = multipart("mixed", vec![inner, text_part("x-attachment")]);
            assert_eq!(root.part(&[1, 2]).unwrap().content_subtype, "html");
            assert_eq!(root.part(&[2]).unwrap().content_subtype, "x-attachment");
        }

        #[test]
        fn message_part_numbers_enclosed_body() {
            let enclosed = multipart("alternative", vec![text_part("plain"), text_part("html")]);
            let message = BodyStructure {
                content_type: "message".to_string(),
                content_subtype: "rfc822".to_string(),
                envelope: Some(Box::default()),
                children: vec![enclosed],
                ..BodyStructure::default()
            };
            let root = multipart("mixed", vec![text_part("plain"), message]);
            assert_eq!(root.part(&[2, 1]).unwrap().content_subtype, "plain");
            assert_eq!(root.part(&[2, 2]).unwrap().content_subtype, "html");
        }

        #[test]
        fn message_with_simple_body_uses_part_one() {
            let message = BodyStructure {
                content_type: "message".to_string(),
                content_subtype: "rfc822".to_string(),
                envelope: Some(Box::default()),
                children: vec![text_part("plain")],
                ..BodyStructure::default()
            };
            assert_eq!(message.part(&[1]).unwrap().content_subtype, "plain");
            assert_eq!(message.part(&[2]), None);
        }
    }

    mod fetch_response_tests {
        use super::*;

        fn sample() -> FetchResponse {
            FetchResponse {
                number: 4,
                uid: Some(991),
                items: vec![
                    FetchData::Flags(Flags::from_bits(Flags::SEEN)),
                    FetchData::Size(1234),
                    FetchData::BodyStructure(BodyStructure {
                        content_type: "text".to_string(),
                        content_subtype: "plain".to_string(),
                        ..BodyStructure::default()
                    }),
                ],
            }
        }

        #[test]
        fn accessors_find_items() {
            let fetch = sample();
            assert_eq!(fetch.size(), Some(1234));
            assert!(fetch.flags().unwrap().contains(Flags::SEEN));
            assert_eq!(fetch.body_structure().unwrap().content_type, "text");
            assert_eq!(fetch.envelope(), None);
        }

        #[test]
        fn take_body_structure_removes_item() {
            let mut fetch = sample();
            let bs = fetch.take_body_structure().unwrap();
            assert_eq!(bs.content_subtype, "plain");
            assert!(fetch.body_structure().is_none());
            assert_eq!(fetch.items.len(), 2);
            assert!(fetch.take_body_structure().is_none());
        }

        #[test]
        fn body_lookup_matches_section() {
            let mut fetch = sample();
            fetch.items.push(FetchData::Body(FetchDataBody {
                section: BodySection::parse("1.2").unwrap(),
                origin: None,
                content: b"part content".to_vec(),
            }));
            let wanted = BodySection::parse("1.2").unwrap();
            assert_eq!(fetch.body(&wanted), Some(b"part content".as_slice()));
            assert_eq!(fetch.body(&BodySection::whole()), None);
        }
    }

    mod state_tests {
        use super::*;

        #[test]
        fn ok_and_preauth_are_success() {
            let ok = State {
                tag: Some("q0001".to_string()),
                condition: Condition::Ok,
                code: None,
                text: "done".to_string(),
            };
            assert!(ok.is_ok());
            assert!(ok.as_error().is_none());

            let preauth = State {
                tag: None,
                condition: Condition::PreAuth,
                code: None,
                text: "welcome".to_string(),
            };
            assert!(preauth.is_ok());
        }

        #[test]
        fn failures_map_to_errors() {
            let no = State {
                tag: Some("q0002".to_string()),
                condition: Condition::No,
                code: None,
                text: "denied".to_string(),
            };
            assert!(matches!(no.as_error(), Some(Error::No(text)) if text == "denied"));

            let bye = State {
                tag: None,
                condition: Condition::Bye,
                code: None,
                text: "closing".to_string(),
            };
            assert!(bye.is_bye());
            assert!(matches!(bye.as_error(), Some(Error::Bye(_))));
        }
    }

    mod list_attribute_tests {
        use super::*;

        #[test]
        fn atoms_parse_case_insensitively() {
            assert_eq!(
                ListAttributes::from_atom("\\Noselect"),
                Some(ListAttributes::NOSELECT)
            );
            assert_eq!(
                ListAttributes::from_atom("\\NOINFERIORS"),
                Some(ListAttributes::NOINFERIORS)
            );
            assert_eq!(ListAttributes::from_atom("\\HasChildren"), None);
        }

        #[test]
        fn bitor_accumulates() {
            let mut attrs = ListAttributes::NONE;
            attrs |= ListAttributes::MARKED;
            attrs |= ListAttributes::NOSELECT;
            assert!(attrs.contains(ListAttributes::MARKED));
            assert!(attrs.contains(ListAttributes::NOSELECT));
            assert!(!attrs.contains(ListAttributes::UNMARKED));
        }
    }

    #[test]
    fn address_email_needs_both_parts() {
        let full = Address {
            name: Some("Ann".to_string()),
            adl: None,
            mailbox: Some("ann".to_string()),
            host: Some("example.com".to_string()),
        };
        assert_eq!(full.email(), Some("ann@example.com".to_string()));

        let group_marker = Address {
            name: Some("undisclosed-recipients".to_string()),
            ..Address::default()
        };
        assert_eq!(group_marker.email(), None);
    }
}
