//! Part enumeration and inline/attachment classification.

use crate::parser::BodyStructure;

/// One node of a message's structure, with the section path that
/// addresses it on the wire.
#[derive(Debug, Clone)]
pub struct Part<'a> {
    /// The structure node.
    pub structure: &'a BodyStructure,
    /// 1-based dotted part path; empty for the top-level node.
    pub path: Vec<u32>,
}

/// Flattens a structure into pre-order `(node, path)` entries.
///
/// The top-level node comes first with an empty path, and a
/// multipart's children are numbered from 1 in order. Multipart
/// containers appear as entries of their own since reassembly needs
/// their boundaries; an enclosed `message/rfc822` stays atomic, the
/// way fetching treats it.
#[must_use]
pub fn collect_parts(structure: &BodyStructure) -> Vec<Part<'_>> {
    let mut parts = Vec::new();
    push_parts(structure, Vec::new(), &mut parts);
    parts
}

fn push_parts<'a>(node: &'a BodyStructure, path: Vec<u32>, parts: &mut Vec<Part<'a>>) {
    parts.push(Part {
        structure: node,
        path: path.clone(),
    });
    if node.is_multipart() {
        for (number, child) in (1u32..).zip(&node.children) {
            let mut child_path = path.clone();
            child_path.push(number);
            push_parts(child, child_path, parts);
        }
    }
}

/// Whether a part renders as message text rather than as an
/// attachment.
///
/// Text parts and enclosed messages count, unless their disposition
/// says `attachment`.
#[must_use]
pub fn is_inline_text(structure: &BodyStructure) -> bool {
    let attachment = structure
        .disposition
        .as_deref()
        .is_some_and(|disposition| disposition.eq_ignore_ascii_case("attachment"));
    if attachment {
        return false;
    }
    structure.content_type.is_empty()
        || structure.content_type.eq_ignore_ascii_case("text")
        || structure.is_message()
}

/// Whether a part belongs to the HTML rendering: inline text, or
/// anything another part can reference through its Content-ID.
#[must_use]
pub fn is_inline_html(structure: &BodyStructure) -> bool {
    is_inline_text(structure) || structure.id.is_some()
}

/// Whether the message carries anything beyond inline text.
#[must_use]
pub fn has_attachment(structure: &BodyStructure) -> bool {
    if structure.is_multipart() {
        structure.children.iter().any(has_attachment)
    } else {
        !is_inline_text(structure)
    }
}

/// Total advertised size of the inline text, attachments left out.
#[must_use]
pub fn text_size(structure: &BodyStructure) -> u32 {
    if structure.is_multipart() {
        structure.children.iter().map(text_size).sum()
    } else if is_inline_text(structure) {
        structure.size
    } else {
        0
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

    fn leaf(content_type: &str, subtype: &str, size: u32) -> BodyStructure {
        BodyStructure {
            content_type: content_type.to_string(),
            content_subtype: subtype.to_string(),
            size,
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

    fn attachment(content_type: &str, subtype: &str, size: u32) -> BodyStructure {
        BodyStructure {
            disposition: Some("attachment".to_string()),
            ..leaf(content_type, subtype, size)
        }
    }

    mod collect_parts_tests {
        use super::*;

        #[test]
        fn single_part_is_just_the_root() {
            let root = leaf("text", "plain", 10);
            let parts = collect_parts(&root);
            assert_eq!(parts.len(), 1);
            assert!(parts[0].path.is_empty());
        }

        #[test]
        fn preorder_with_one_based_paths() {
            let root = multipart(
                "mixed",
                vec![
                    multipart(
                        "alternative",
                        vec![leaf("text", "plain", 5), leaf("text", "html", 9)],
                    ),
                    attachment("application", "pdf", 100),
                ],
            );
            let parts = collect_parts(&root);
            let paths: Vec<&[u32]> = parts.iter().map(|p| p.path.as_slice()).collect();
            assert_eq!(
                paths,
                vec![
                    &[] as &[u32],
                    &[1],
                    &[1, 1],
                    &[1, 2],
                    &[2],
                ]
            );
        }

        #[test]
        fn enclosed_message_stays_atomic() {
            let inner = multipart("mixed", vec![leaf("text", "plain", 3)]);
            let message = BodyStructure {
                children: vec![inner],
                ..leaf("message", "rfc822", 50)
            };
            let root = multipart("mixed", vec![message]);
            let parts = collect_parts(&root);
            let paths: Vec<&[u32]> = parts.iter().map(|p| p.path.as_slice()).collect();
            assert_eq!(paths, vec![&[] as &[u32], &[1]]);
        }
    }

    mod classification_tests {
        use super::*;

        #[test]
        fn text_and_enclosed_messages_are_inline() {
            assert!(is_inline_text(&leaf("text", "plain", 1)));
            assert!(is_inline_text(&leaf("TEXT", "HTML", 1)));
            assert!(is_inline_text(&leaf("message", "rfc822", 1)));
            assert!(!is_inline_text(&leaf("application", "pdf", 1)));
            assert!(!is_inline_text(&leaf("image", "png", 1)));
        }

        #[test]
        fn attachment_disposition_overrides_type() {
            assert!(!is_inline_text(&attachment("text", "plain", 1)));
            let inline = BodyStructure {
                disposition: Some("inline".to_string()),
                ..leaf("text", "plain", 1)
            };
            assert!(is_inline_text(&inline));
        }

        #[test]
        fn untyped_part_counts_as_text() {
            assert!(is_inline_text(&BodyStructure::default()));
        }

        #[test]
        fn content_id_joins_the_html_rendering() {
            let cid_image = BodyStructure {
                id: Some("<img1@example>".to_string()),
                ..leaf("image", "png", 1)
            };
            assert!(is_inline_html(&cid_image));
            assert!(!is_inline_text(&cid_image));
            assert!(!is_inline_html(&leaf("image", "png", 1)));
        }

        #[test]
        fn attachment_detection_recurses() {
            let clean = multipart(
                "alternative",
                vec![leaf("text", "plain", 1), leaf("text", "html", 1)],
            );
            assert!(!has_attachment(&clean));

            let mixed = multipart(
                "mixed",
                vec![clean.clone(), attachment("application", "zip", 1)],
            );
            assert!(has_attachment(&mixed));

            assert!(has_attachment(&leaf("application", "pdf", 1)));
        }

        #[test]
        fn text_size_sums_inline_parts_only() {
            let root = multipart(
                "mixed",
                vec![
                    leaf("text", "plain", 40),
                    leaf("text", "html", 60),
                    attachment("application", "pdf", 5000),
                ],
            );
            assert_eq!(text_size(&root), 100);
            assert_eq!(text_size(&leaf("image", "png", 7)), 0);
        }
    }
}
