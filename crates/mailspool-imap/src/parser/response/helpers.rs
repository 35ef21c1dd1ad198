//! Extraction helpers over parsed list elements.

use crate::leniency::Leniency;
use crate::parser::Element;
use crate::types::{Flag, Flags};

impl Element {
    /// Atom text, for atom elements.
    pub(crate) fn as_atom(&self) -> Option<&str> {
        match self {
            Self::Atom(text) => Some(text),
            _ => None,
        }
    }

    /// Whether the element is NIL.
    pub(crate) const fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Content bytes of an atom, quoted string, or literal.
    pub(crate) fn into_bytes(self) -> Option<Vec<u8>> {
        match self {
            Self::Atom(text) => Some(text.into_bytes()),
            Self::Bytes(bytes) => Some(bytes),
            Self::Nil | Self::List(_) => None,
        }
    }

    /// Content as text; NIL maps to `None` (nstring semantics).
    pub(crate) fn into_text(self) -> Option<String> {
        match self {
            Self::Atom(text) => Some(text),
            Self::Bytes(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            Self::Nil | Self::List(_) => None,
        }
    }

    /// Nested elements of a list.
    pub(crate) fn into_list(self) -> Option<Vec<Element>> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Numeric value of an atom (or of a quoted number, which some
    /// servers send where an atom belongs).
    pub(crate) fn number(&self) -> Option<u32> {
        match self {
            Self::Atom(text) => text.parse().ok(),
            Self::Bytes(bytes) => std::str::from_utf8(bytes).ok()?.parse().ok(),
            Self::Nil | Self::List(_) => None,
        }
    }

    /// Like [`Self::number`], but NIL counts as zero. Covers servers
    /// that send NIL for an octet count they do not know.
    pub(crate) fn number_or_nil(&self) -> Option<u32> {
        if self.is_nil() {
            Leniency::NilOctetCount.note();
            return Some(0);
        }
        self.number()
    }
}

/// Builds a flag set from the elements of a parenthesized flag list.
/// Non-flag elements are ignored.
pub(crate) fn flags_of(elements: &[Element]) -> Flags {
    elements
        .iter()
        .filter_map(|element| match element {
            Element::Atom(text) => Some(Flag::parse(text)),
            Element::Bytes(bytes) => Some(Flag::parse(&String::from_utf8_lossy(bytes))),
            Element::Nil | Element::List(_) => None,
        })
        .collect()
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
    fn nil_counts_as_zero_octets() {
        assert_eq!(Element::Nil.number_or_nil(), Some(0));
        assert_eq!(Element::Atom("284".to_string()).number_or_nil(), Some(284));
        assert_eq!(Element::Atom("x".to_string()).number_or_nil(), None);
    }

    #[test]
    fn quoted_numbers_still_parse() {
        assert_eq!(Element::Bytes(b"17".to_vec()).number(), Some(17));
    }

    #[test]
    fn nstring_text() {
        assert_eq!(Element::Nil.into_text(), None);
        assert_eq!(
            Element::Bytes(b"subject".to_vec()).into_text(),
            Some("subject".to_string())
        );
    }

    #[test]
    fn flag_list_ignores_non_flags() {
        let elements = vec![
            Element::Atom("\\Seen".to_string()),
            Element::Atom("$Label1".to_string()),
            Element::Nil,
            Element::List(vec![]),
        ];
        let flags = flags_of(&elements);
        assert!(flags.contains(Flags::SEEN));
        assert!(flags.contains_keyword("$Label1"));
    }
}
