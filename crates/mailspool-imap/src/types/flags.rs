//! Message flags and flag-set diffing for STORE.

/// Message flag as it appears in a parsed response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Flag {
    /// Message has been answered.
    Answered,
    /// Message is flagged for special attention.
    Flagged,
    /// Message is marked for deletion.
    Deleted,
    /// Message has been read.
    Seen,
    /// Message is a draft.
    Draft,
    /// Message is recent (first session to see it).
    Recent,
    /// Custom keyword flag.
    Keyword(String),
}

impl Flag {
    /// Parses a flag string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "\\ANSWERED" => Self::Answered,
            "\\FLAGGED" => Self::Flagged,
            "\\DELETED" => Self::Deleted,
            "\\SEEN" => Self::Seen,
            "\\DRAFT" => Self::Draft,
            "\\RECENT" => Self::Recent,
            _ => Self::Keyword(s.to_string()),
        }
    }

    /// Returns the flag as an IMAP string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Answered => "\\Answered",
            Self::Flagged => "\\Flagged",
            Self::Deleted => "\\Deleted",
            Self::Seen => "\\Seen",
            Self::Draft => "\\Draft",
            Self::Recent => "\\Recent",
            Self::Keyword(s) => s,
        }
    }

    /// The flag's bit in a [`Flags`] set, or `None` for keywords.
    #[must_use]
    pub const fn bit(&self) -> Option<u32> {
        match self {
            Self::Answered => Some(Flags::ANSWERED),
            Self::Flagged => Some(Flags::FLAGGED),
            Self::Deleted => Some(Flags::DELETED),
            Self::Seen => Some(Flags::SEEN),
            Self::Draft => Some(Flags::DRAFT),
            Self::Recent => Some(Flags::RECENT),
            Self::Keyword(_) => None,
        }
    }
}

impl std::fmt::Display for Flag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Set of system flag bits plus ordered custom keywords.
///
/// STORE takes a desired flag set and a mask of the flags the caller
/// is allowed to touch; [`Flags::added`] and [`Flags::removed`] split
/// that pair into the `+FLAGS.SILENT` / `-FLAGS.SILENT` halves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Flags {
    system: u32,
    custom: Vec<String>,
}

impl Flags {
    /// `\Answered` bit.
    pub const ANSWERED: u32 = 0x01;
    /// `\Flagged` bit.
    pub const FLAGGED: u32 = 0x02;
    /// `\Deleted` bit.
    pub const DELETED: u32 = 0x04;
    /// `\Seen` bit.
    pub const SEEN: u32 = 0x08;
    /// `\Draft` bit.
    pub const DRAFT: u32 = 0x10;
    /// `\Recent` bit. Reported by servers, never settable via STORE.
    pub const RECENT: u32 = 0x20;
    /// All bits a STORE may change.
    pub const SETTABLE: u32 =
        Self::ANSWERED | Self::FLAGGED | Self::DELETED | Self::SEEN | Self::DRAFT;

    /// Creates an empty flag set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a flag set from system bits.
    #[must_use]
    pub const fn from_bits(system: u32) -> Self {
        Self {
            system,
            custom: Vec::new(),
        }
    }

    /// Creates a flag set from system bits and custom keywords.
    #[must_use]
    pub const fn with_custom(system: u32, custom: Vec<String>) -> Self {
        Self { system, custom }
    }

    /// The system flag bits.
    #[must_use]
    pub const fn bits(&self) -> u32 {
        self.system
    }

    /// The custom keywords in insertion order.
    #[must_use]
    pub fn custom(&self) -> &[String] {
        &self.custom
    }

    /// Adds one parsed flag to the set.
    pub fn insert(&mut self, flag: Flag) {
        match flag.bit() {
            Some(bit) => self.system |= bit,
            None => {
                if let Flag::Keyword(keyword) = flag {
                    if !self.custom.contains(&keyword) {
                        self.custom.push(keyword);
                    }
                }
            }
        }
    }

    /// Whether the given system bits are all present.
    #[must_use]
    pub const fn contains(&self, bits: u32) -> bool {
        self.system & bits == bits
    }

    /// Whether a custom keyword is present.
    #[must_use]
    pub fn contains_keyword(&self, keyword: &str) -> bool {
        self.custom.iter().any(|c| c == keyword)
    }

    /// Whether the set holds no system bits and no keywords.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.system == 0 && self.custom.is_empty()
    }

    /// The flags to add: present here and permitted by `mask`.
    #[must_use]
    pub fn added(&self, mask: &Self) -> Self {
        Self {
            system: self.system & mask.system,
            custom: self
                .custom
                .iter()
                .filter(|c| mask.contains_keyword(c))
                .cloned()
                .collect(),
        }
    }

    /// The flags to remove: permitted by `mask` but absent here.
    #[must_use]
    pub fn removed(&self, mask: &Self) -> Self {
        Self {
            system: mask.system & !self.system,
            custom: mask
                .custom
                .iter()
                .filter(|c| !self.contains_keyword(c))
                .cloned()
                .collect(),
        }
    }

    /// All flags present in both `self` and `other`.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let mut merged = self.clone();
        merged.system |= other.system;
        for keyword in &other.custom {
            if !merged.custom.contains(keyword) {
                merged.custom.push(keyword.clone());
            }
        }
        merged
    }

    /// Iterates the system flags as [`Flag`] values, low bit first.
    pub fn iter_system(&self) -> impl Iterator<Item = Flag> + '_ {
        [
            Flag::Answered,
            Flag::Flagged,
            Flag::Deleted,
            Flag::Seen,
            Flag::Draft,
            Flag::Recent,
        ]
        .into_iter()
        .filter(|flag| flag.bit().is_some_and(|bit| self.contains(bit)))
    }
}

impl std::fmt::Display for Flags {
    /// Space-joined flag names, system flags first. Callers add the
    /// surrounding parentheses.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for flag in self.iter_system() {
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{flag}")?;
            first = false;
        }
        for keyword in &self.custom {
            if !first {
                f.write_str(" ")?;
            }
            f.write_str(keyword)?;
            first = false;
        }
        Ok(())
    }
}

impl FromIterator<Flag> for Flags {
    fn from_iter<I: IntoIterator<Item = Flag>>(iter: I) -> Self {
        let mut flags = Self::new();
        for flag in iter {
            flags.insert(flag);
        }
        flags
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

    mod flag_tests {
        use super::*;

        #[test]
        fn parse_is_case_insensitive() {
            assert_eq!(Flag::parse("\\Seen"), Flag::Seen);
            assert_eq!(Flag::parse("\\SEEN"), Flag::Seen);
            assert_eq!(Flag::parse("\\seen"), Flag::Seen);
        }

        #[test]
        fn parse_system_flags() {
            assert_eq!(Flag::parse("\\Answered"), Flag::Answered);
            assert_eq!(Flag::parse("\\Flagged"), Flag::Flagged);
            assert_eq!(Flag::parse("\\Deleted"), Flag::Deleted);
            assert_eq!(Flag::parse("\\Draft"), Flag::Draft);
            assert_eq!(Flag::parse("\\Recent"), Flag::Recent);
        }

        #[test]
        fn parse_keyword() {
            assert_eq!(
                Flag::parse("$Forwarded"),
                Flag::Keyword("$Forwarded".to_string())
            );
        }

        #[test]
        fn bit_for_keyword_is_none() {
            assert_eq!(Flag::Keyword("x".to_string()).bit(), None);
            assert_eq!(Flag::Seen.bit(), Some(Flags::SEEN));
        }
    }

    mod flags_tests {
        use super::*;

        #[test]
        fn insert_sets_bits_and_keywords() {
            let mut flags = Flags::new();
            flags.insert(Flag::Seen);
            flags.insert(Flag::Keyword("work".to_string()));
            flags.insert(Flag::Keyword("work".to_string()));
            assert!(flags.contains(Flags::SEEN));
            assert_eq!(flags.custom(), &["work".to_string()]);
        }

        #[test]
        fn display_orders_system_before_custom() {
            let mut flags = Flags::from_bits(Flags::SEEN | Flags::ANSWERED);
            flags.insert(Flag::Keyword("todo".to_string()));
            assert_eq!(flags.to_string(), "\\Answered \\Seen todo");
        }

        #[test]
        fn added_keeps_only_masked_bits() {
            let flags = Flags::from_bits(Flags::SEEN | Flags::DELETED);
            let mask = Flags::from_bits(Flags::SEEN | Flags::FLAGGED);
            assert_eq!(flags.added(&mask).bits(), Flags::SEEN);
        }

        #[test]
        fn removed_is_mask_minus_flags() {
            let flags = Flags::from_bits(Flags::SEEN);
            let mask = Flags::from_bits(Flags::SEEN | Flags::FLAGGED);
            assert_eq!(flags.removed(&mask).bits(), Flags::FLAGGED);
        }

        #[test]
        fn diff_covers_custom_keywords() {
            let flags = Flags::with_custom(0, vec!["keep".to_string()]);
            let mask = Flags::with_custom(0, vec!["keep".to_string(), "drop".to_string()]);
            assert_eq!(flags.added(&mask).custom(), &["keep".to_string()]);
            assert_eq!(flags.removed(&mask).custom(), &["drop".to_string()]);
        }

        #[test]
        fn union_merges_without_duplicates() {
            let a = Flags::with_custom(Flags::SEEN, vec!["x".to_string()]);
            let b = Flags::with_custom(Flags::DRAFT, vec!["x".to_string(), "y".to_string()]);
            let merged = a.union(&b);
            assert_eq!(merged.bits(), Flags::SEEN | Flags::DRAFT);
            assert_eq!(merged.custom(), &["x".to_string(), "y".to_string()]);
        }

        #[test]
        fn from_iterator_of_parsed_flags() {
            let flags: Flags = ["\\Seen", "\\Flagged", "junk"]
                .iter()
                .map(|s| Flag::parse(s))
                .collect();
            assert!(flags.contains(Flags::SEEN | Flags::FLAGGED));
            assert!(flags.contains_keyword("junk"));
        }
    }

    proptest! {
        /// For any (flags, mask) pair the add and remove halves are
        /// disjoint and together cover exactly the masked bits.
        #[test]
        fn added_removed_partition_mask(flags in 0u32..64, mask in 0u32..64) {
            let flags = Flags::from_bits(flags);
            let mask = Flags::from_bits(mask);
            let added = flags.added(&mask);
            let removed = flags.removed(&mask);
            prop_assert_eq!(added.bits() & removed.bits(), 0);
            prop_assert_eq!(added.bits() | removed.bits(), mask.bits());
        }
    }
}
