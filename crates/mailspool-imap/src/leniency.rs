//! Documented deviations from the RFC 3501 grammar that deployed
//! servers ship.
//!
//! Each tolerance is applied at exactly one point of the parse and
//! referenced by name there, so the grammar stays strict everywhere
//! else. None of these widen what a conforming server can send.

/// A named tolerance applied at a specific point of the parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leniency {
    /// iMAIL sends unescaped `"` inside quoted strings. A closing
    /// quote therefore only terminates the string when followed by a
    /// space, separator, or CR; anywhere else it is content.
    EarlyQuoteTermination,
    /// iMAIL omits the space between a list element and an adjacent
    /// `(` or `)`, so both act as separators on their own.
    ListSeparatorSlack,
    /// Exchange 5.5 ends a status trailer's `[CODE]` directly with
    /// CRLF, without the mandatory space and text.
    BracketTrailerCrlf,
    /// Some servers send `NIL` where a numeric octet count belongs;
    /// it reads as size 0.
    NilOctetCount,
    /// iMAIL emits bare strings between the parenthesized groups of
    /// an ENVELOPE address list; they are skipped.
    StrayAddressText,
}

impl Leniency {
    /// The server family the tolerance was written for.
    #[must_use]
    pub const fn server(self) -> &'static str {
        match self {
            Self::EarlyQuoteTermination | Self::ListSeparatorSlack | Self::StrayAddressText => {
                "iMAIL"
            }
            Self::BracketTrailerCrlf => "Exchange 5.5",
            Self::NilOctetCount => "various",
        }
    }

    pub(crate) fn note(self) {
        tracing::trace!(leniency = %self, server = self.server(), "tolerated server bug");
    }
}

impl std::fmt::Display for Leniency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::EarlyQuoteTermination => "early-quote-termination",
            Self::ListSeparatorSlack => "list-separator-slack",
            Self::BracketTrailerCrlf => "bracket-trailer-crlf",
            Self::NilOctetCount => "nil-octet-count",
            Self::StrayAddressText => "stray-address-text",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_stable() {
        assert_eq!(Leniency::EarlyQuoteTermination.to_string(), "early-quote-termination");
        assert_eq!(Leniency::NilOctetCount.to_string(), "nil-octet-count");
    }

    #[test]
    fn servers_are_attributed() {
        assert_eq!(Leniency::ListSeparatorSlack.server(), "iMAIL");
        assert_eq!(Leniency::BracketTrailerCrlf.server(), "Exchange 5.5");
    }
}
