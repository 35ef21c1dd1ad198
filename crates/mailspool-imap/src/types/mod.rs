//! Core protocol data types.
//!
//! Flag sets, message ranges, and capability interpretation shared by
//! the parser, the command layer, and callers.

#![allow(clippy::missing_const_for_fn)]

mod capability;
mod flags;
mod range;

pub use capability::{AuthMethods, Capabilities};
pub use flags::{Flag, Flags};
pub use range::Range;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn flags_diff_example() {
        let flags = Flags::from_bits(Flags::SEEN);
        let mask = Flags::from_bits(Flags::SEEN | Flags::DELETED);
        assert_eq!(flags.added(&mask).bits(), Flags::SEEN);
        assert_eq!(flags.removed(&mask).bits(), Flags::DELETED);
    }

    #[test]
    fn range_wire_example() {
        assert_eq!(Range::multiple(vec![3, 4, 5, 9], false).to_string(), "3:5,9");
    }

    #[test]
    fn capability_gating_example() {
        let caps = Capabilities::parse(&["IMAP4REV1", "AUTH=CRAM-MD5", "NAMESPACE"]);
        assert!(caps.auth().contains(AuthMethods::CRAM_MD5));
        assert!(caps.has_namespace());
    }
}
