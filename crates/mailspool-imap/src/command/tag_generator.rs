//! Command tag generation.
//!
//! Tags match commands to their tagged status lines.

/// Monotonic command tags, `q0000` onward, owned by one client.
#[derive(Debug, Default)]
pub struct TagGenerator {
    counter: u32,
}

impl TagGenerator {
    /// The next tag.
    pub fn next(&mut self) -> String {
        let tag = format!("q{:04}", self.counter);
        self.counter = self.counter.wrapping_add(1);
        tag
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
    use super::*;

    #[test]
    fn tags_count_up_zero_padded() {
        let mut tags = TagGenerator::default();
        assert_eq!(tags.next(), "q0000");
        assert_eq!(tags.next(), "q0001");
        assert_eq!(tags.next(), "q0002");
    }

    #[test]
    fn padding_widens_past_four_digits() {
        let mut tags = TagGenerator::default();
        for _ in 0..10_000 {
            let _ = tags.next();
        }
        assert_eq!(tags.next(), "q10000");
    }

    #[test]
    fn each_generator_counts_independently() {
        let mut a = TagGenerator::default();
        let mut b = TagGenerator::default();
        let _ = a.next();
        assert_eq!(b.next(), "q0000");
    }
}
