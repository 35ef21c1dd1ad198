//! Fetch planning for partial message download.

use super::parts::{Part, is_inline_html, is_inline_text};

/// Which rendering of the message text a plan targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextMode {
    /// Plain-text rendering: inline text parts only.
    Plain,
    /// HTML rendering: inline text plus Content-ID referenced parts.
    Html,
}

/// A FETCH item list and what a complete reply to it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPlan {
    /// Parenthesized FETCH item list in wire syntax.
    pub items: String,
    /// Number of `BODY[...]` sections a complete reply holds.
    pub expected: usize,
    /// The plan collapsed to a single whole-body fetch.
    pub whole_body: bool,
}

/// Plans the cheapest fetch that yields the `mode` text of a message.
///
/// A message whose only part is inline text collapses to one
/// whole-body fetch. Anything else takes the main header, then per
/// wanted part its content and its MIME header; `all_mime` extends
/// the MIME headers to every part so reassembly can rebuild the
/// skipped ones from what the server actually stores instead of from
/// the advertised structure.
#[must_use]
pub fn plan_fetch(parts: &[Part<'_>], mode: TextMode, peek: bool, all_mime: bool) -> FetchPlan {
    let body = if peek { "BODY.PEEK" } else { "BODY" };

    if let [only] = parts {
        if is_inline_text(only.structure) {
            return FetchPlan {
                items: format!("({body}[])"),
                expected: 1,
                whole_body: true,
            };
        }
    }

    let mut items = format!("({body}[HEADER]");
    let mut expected = 1;
    for part in parts {
        if part.path.is_empty() {
            continue;
        }
        let wanted = match mode {
            TextMode::Plain => is_inline_text(part.structure),
            TextMode::Html => is_inline_html(part.structure),
        };
        if !wanted && !all_mime {
            continue;
        }
        let path = path_text(&part.path);
        if wanted {
            items.push(' ');
            items.push_str(body);
            items.push('[');
            items.push_str(&path);
            items.push(']');
            expected += 1;
        }
        items.push(' ');
        items.push_str(body);
        items.push('[');
        items.push_str(&path);
        items.push_str(".MIME]");
        expected += 1;
    }
    items.push(')');

    FetchPlan {
        items,
        expected,
        whole_body: false,
    }
}

fn path_text(path: &[u32]) -> String {
    let mut text = String::new();
    for number in path {
        if !text.is_empty() {
            text.push('.');
        }
        text.push_str(&number.to_string());
    }
    text
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
    use crate::parser::BodyStructure;
    use crate::rebuild::collect_parts;

    fn leaf(content_type: &str, subtype: &str) -> BodyStructure {
        BodyStructure {
            content_type: content_type.to_string(),
            content_subtype: subtype.to_string(),
            ..BodyStructure::default()
        }
    }

    fn alternative_with_attachment() -> BodyStructure {
        BodyStructure {
            content_type: "multipart".to_string(),
            content_subtype: "mixed".to_string(),
            children: vec![
                BodyStructure {
                    content_type: "multipart".to_string(),
                    content_subtype: "alternative".to_string(),
                    children: vec![leaf("text", "plain"), leaf("text", "html")],
                    ..BodyStructure::default()
                },
                BodyStructure {
                    disposition: Some("attachment".to_string()),
                    ..leaf("application", "pdf")
                },
            ],
            ..BodyStructure::default()
        }
    }

    #[test]
    fn single_text_part_collapses_to_whole_body() {
        let root = leaf("text", "plain");
        let parts = collect_parts(&root);
        let plan = plan_fetch(&parts, TextMode::Plain, true, false);
        assert_eq!(plan.items, "(BODY.PEEK[])");
        assert_eq!(plan.expected, 1);
        assert!(plan.whole_body);
    }

    #[test]
    fn non_peek_marks_messages_seen() {
        let root = leaf("text", "plain");
        let parts = collect_parts(&root);
        let plan = plan_fetch(&parts, TextMode::Plain, false, false);
        assert_eq!(plan.items, "(BODY[])");
    }

    #[test]
    fn wanted_parts_take_content_and_mime() {
        let root = alternative_with_attachment();
        let parts = collect_parts(&root);
        let plan = plan_fetch(&parts, TextMode::Plain, true, false);
        assert_eq!(
            plan.items,
            "(BODY.PEEK[HEADER] \
             BODY.PEEK[1.1] BODY.PEEK[1.1.MIME] \
             BODY.PEEK[1.2] BODY.PEEK[1.2.MIME])"
        );
        assert_eq!(plan.expected, 5);
        assert!(!plan.whole_body);
    }

    #[test]
    fn all_mime_covers_skipped_parts() {
        let root = alternative_with_attachment();
        let parts = collect_parts(&root);
        let plan = plan_fetch(&parts, TextMode::Plain, true, true);
        assert_eq!(
            plan.items,
            "(BODY.PEEK[HEADER] \
             BODY.PEEK[1.MIME] \
             BODY.PEEK[1.1] BODY.PEEK[1.1.MIME] \
             BODY.PEEK[1.2] BODY.PEEK[1.2.MIME] \
             BODY.PEEK[2.MIME])"
        );
        assert_eq!(plan.expected, 7);
    }

    #[test]
    fn html_mode_pulls_content_id_parts() {
        let root = BodyStructure {
            content_type: "multipart".to_string(),
            content_subtype: "related".to_string(),
            children: vec![
                leaf("text", "html"),
                BodyStructure {
                    id: Some("<logo@example>".to_string()),
                    ..leaf("image", "png")
                },
            ],
            ..BodyStructure::default()
        };
        let parts = collect_parts(&root);

        let plain = plan_fetch(&parts, TextMode::Plain, true, false);
        assert_eq!(plain.items, "(BODY.PEEK[HEADER] BODY.PEEK[1] BODY.PEEK[1.MIME])");

        let html = plan_fetch(&parts, TextMode::Html, true, false);
        assert_eq!(
            html.items,
            "(BODY.PEEK[HEADER] \
             BODY.PEEK[1] BODY.PEEK[1.MIME] \
             BODY.PEEK[2] BODY.PEEK[2.MIME])"
        );
        assert_eq!(html.expected, 5);
    }

    #[test]
    fn attachment_only_message_reduces_to_the_header() {
        let root = BodyStructure {
            disposition: Some("attachment".to_string()),
            ..leaf("application", "pdf")
        };
        let parts = collect_parts(&root);
        let plan = plan_fetch(&parts, TextMode::Plain, true, false);
        assert_eq!(plan.items, "(BODY.PEEK[HEADER])");
        assert_eq!(plan.expected, 1);
        assert!(!plan.whole_body);
    }
}
