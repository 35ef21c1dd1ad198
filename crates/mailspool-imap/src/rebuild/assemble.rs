//! Welding fetched sections back into one RFC 822 message.

use super::parts::Part;
use crate::error::{Error, Result};
use crate::parser::{Address, BodyStructure, Envelope, FetchDataBody, SectionKind};

/// Rebuilds a complete message from the sections a planned fetch
/// returned.
///
/// `parts` is the enumeration the plan was made from and `bodies` the
/// `BODY[...]` sections that came back, in any order. With
/// `trust_structure` the multipart boundaries are taken from the
/// advertised structure; without it each boundary is read from the
/// fetched header of its container and the advertised value is only a
/// fallback. Parts whose MIME header was not fetched get one
/// synthesized from the structure.
pub fn assemble(
    parts: &[Part<'_>],
    bodies: &[&FetchDataBody],
    trust_structure: bool,
) -> Result<Vec<u8>> {
    let Some((root, rest)) = parts.split_first() else {
        return Err(Error::Protocol(
            "reassembly needs the message structure".to_string(),
        ));
    };
    let Some(header) = main_header(bodies) else {
        return Err(Error::Protocol(
            "reassembly is missing the message header".to_string(),
        ));
    };

    let mut message = header.content.clone();
    let mut stack: Vec<String> = Vec::new();
    let mut previous = root;
    for part in rest {
        if part.path.len() > stack.len() {
            let boundary = boundary_for(previous, bodies, trust_structure);
            append_boundary(&mut message, &boundary, false);
            stack.push(boundary);
        } else {
            while stack.len() > part.path.len() {
                if let Some(closed) = stack.pop() {
                    append_boundary(&mut message, &closed, true);
                }
            }
            if let Some(open) = stack.last() {
                append_boundary(&mut message, open, false);
            }
        }
        match find_body(bodies, &part.path, SectionKind::Mime) {
            Some(mime) => message.extend_from_slice(&mime.content),
            None => message.extend_from_slice(&part_header(part.structure)),
        }
        if let Some(content) = find_body(bodies, &part.path, SectionKind::Whole) {
            message.extend_from_slice(&content.content);
        }
        previous = part;
    }
    while let Some(closed) = stack.pop() {
        append_boundary(&mut message, &closed, true);
    }
    Ok(message)
}

/// Synthesizes a MIME part header from the advertised structure,
/// closed with a blank line.
#[must_use]
pub fn part_header(structure: &BodyStructure) -> Vec<u8> {
    let mut header = Vec::new();
    if !structure.content_type.is_empty() {
        header.extend_from_slice(b"Content-Type: ");
        header.extend_from_slice(structure.content_type.as_bytes());
        header.push(b'/');
        header.extend_from_slice(structure.content_subtype.as_bytes());
        append_params(&mut header, &structure.params);
        header.extend_from_slice(b"\r\n");
    }
    if let Some(disposition) = &structure.disposition {
        header.extend_from_slice(b"Content-Disposition: ");
        header.extend_from_slice(disposition.as_bytes());
        append_params(&mut header, &structure.disposition_params);
        header.extend_from_slice(b"\r\n");
    }
    if !structure.encoding.is_empty() {
        header.extend_from_slice(b"Content-Transfer-Encoding: ");
        header.extend_from_slice(structure.encoding.as_bytes());
        header.extend_from_slice(b"\r\n");
    }
    if let Some(id) = &structure.id {
        header.extend_from_slice(b"Content-Id: ");
        header.extend_from_slice(id.as_bytes());
        header.extend_from_slice(b"\r\n");
    }
    header.extend_from_slice(b"\r\n");
    header
}

/// Renders an envelope as a header block, for messages whose real
/// header has not been downloaded.
#[must_use]
pub fn envelope_header(envelope: &Envelope) -> Vec<u8> {
    let mut header = Vec::new();
    append_text_field(&mut header, "Message-Id", envelope.message_id.as_deref());
    append_text_field(&mut header, "In-Reply-To", envelope.in_reply_to.as_deref());
    append_text_field(&mut header, "Subject", envelope.subject.as_deref());
    append_text_field(&mut header, "Date", envelope.date.as_deref());
    append_address_field(&mut header, "From", &envelope.from);
    append_address_field(&mut header, "Sender", &envelope.sender);
    append_address_field(&mut header, "Reply-To", &envelope.reply_to);
    append_address_field(&mut header, "To", &envelope.to);
    append_address_field(&mut header, "Cc", &envelope.cc);
    append_address_field(&mut header, "Bcc", &envelope.bcc);
    header.extend_from_slice(b"\r\n");
    header
}

fn main_header<'b>(bodies: &[&'b FetchDataBody]) -> Option<&'b FetchDataBody> {
    bodies.iter().copied().find(|body| {
        body.section.part.is_empty()
            && matches!(
                body.section.kind,
                SectionKind::Header | SectionKind::Whole
            )
    })
}

fn find_body<'b>(
    bodies: &[&'b FetchDataBody],
    path: &[u32],
    kind: SectionKind,
) -> Option<&'b FetchDataBody> {
    bodies
        .iter()
        .copied()
        .find(|body| body.section.kind == kind && body.section.part == path)
}

/// Picks the boundary for a multipart container, preferring what the
/// server actually stores over what it advertises when the structure
/// is not trusted.
fn boundary_for(container: &Part<'_>, bodies: &[&FetchDataBody], trust: bool) -> String {
    let advertised = container
        .structure
        .param("boundary")
        .unwrap_or_default()
        .to_string();
    if trust {
        return advertised;
    }
    let header = if container.path.is_empty() {
        main_header(bodies)
    } else {
        find_body(bodies, &container.path, SectionKind::Mime)
    };
    header
        .and_then(|body| boundary_from_header(&body.content))
        .unwrap_or(advertised)
}

fn boundary_from_header(header: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(header);
    let mut unfolded: Vec<String> = Vec::new();
    for line in text.lines() {
        if line.is_empty() {
            break;
        }
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(last) = unfolded.last_mut() {
                last.push(' ');
                last.push_str(line.trim_start());
            }
        } else {
            unfolded.push(line.to_string());
        }
    }
    for line in unfolded {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if name.trim().eq_ignore_ascii_case("content-type") {
            return header_param(value, "boundary");
        }
    }
    None
}

fn header_param(value: &str, name: &str) -> Option<String> {
    for clause in value.split(';').skip(1) {
        let Some((key, raw)) = clause.split_once('=') else {
            continue;
        };
        if !key.trim().eq_ignore_ascii_case(name) {
            continue;
        }
        let raw = raw.trim();
        let bare = raw
            .strip_prefix('"')
            .and_then(|rest| rest.strip_suffix('"'))
            .unwrap_or(raw);
        return Some(bare.to_string());
    }
    None
}

fn append_boundary(message: &mut Vec<u8>, boundary: &str, end: bool) {
    message.extend_from_slice(b"\r\n--");
    message.extend_from_slice(boundary.as_bytes());
    if end {
        message.extend_from_slice(b"--");
    }
    message.extend_from_slice(b"\r\n");
}

fn append_params(header: &mut Vec<u8>, params: &[(String, String)]) {
    for (name, value) in params {
        header.extend_from_slice(b";\r\n\t");
        header.extend_from_slice(name.as_bytes());
        header.push(b'=');
        append_word(header, value);
    }
}

fn append_text_field(header: &mut Vec<u8>, name: &str, value: Option<&str>) {
    if let Some(value) = value {
        header.extend_from_slice(name.as_bytes());
        header.extend_from_slice(b": ");
        header.extend_from_slice(value.as_bytes());
        header.extend_from_slice(b"\r\n");
    }
}

fn append_address_field(header: &mut Vec<u8>, name: &str, addresses: &[Address]) {
    if addresses.is_empty() {
        return;
    }
    header.extend_from_slice(name.as_bytes());
    header.extend_from_slice(b": ");
    let mut separate = false;
    for address in addresses {
        if let Some(host) = &address.host {
            if separate {
                header.extend_from_slice(b",\r\n\t");
            }
            separate = true;
            if let Some(display) = &address.name {
                append_word(header, display);
                header.push(b' ');
            }
            header.push(b'<');
            if let Some(mailbox) = &address.mailbox {
                header.extend_from_slice(mailbox.as_bytes());
            }
            header.push(b'@');
            header.extend_from_slice(host.as_bytes());
            header.push(b'>');
        } else if let Some(group) = &address.mailbox {
            // A group opens with its display name and suspends the
            // separator until the closing semicolon.
            if separate {
                header.extend_from_slice(b",\r\n\t");
            }
            append_word(header, group);
            header.extend_from_slice(b": ");
            separate = false;
        } else {
            header.push(b';');
            separate = true;
        }
    }
    header.extend_from_slice(b"\r\n");
}

fn append_word(buf: &mut Vec<u8>, text: &str) {
    if is_token(text) {
        buf.extend_from_slice(text.as_bytes());
    } else {
        buf.push(b'"');
        for &byte in text.as_bytes() {
            if byte == b'"' || byte == b'\\' {
                buf.push(b'\\');
            }
            buf.push(byte);
        }
        buf.push(b'"');
    }
}

fn is_token(text: &str) -> bool {
    !text.is_empty()
        && text
            .bytes()
            .all(|byte| (0x21..=0x7e).contains(&byte) && !b"()<>@,;:\\\"/[]?=".contains(&byte))
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
    use crate::parser::BodySection;
    use crate::rebuild::collect_parts;

    fn leaf(content_type: &str, subtype: &str) -> BodyStructure {
        BodyStructure {
            content_type: content_type.to_string(),
            content_subtype: subtype.to_string(),
            ..BodyStructure::default()
        }
    }

    fn multipart(subtype: &str, boundary: &str, children: Vec<BodyStructure>) -> BodyStructure {
        BodyStructure {
            content_type: "multipart".to_string(),
            content_subtype: subtype.to_string(),
            params: vec![("boundary".to_string(), boundary.to_string())],
            children,
            ..BodyStructure::default()
        }
    }

    fn body(section: BodySection, content: &str) -> FetchDataBody {
        FetchDataBody {
            section,
            origin: None,
            content: content.as_bytes().to_vec(),
        }
    }

    fn header_body(content: &str) -> FetchDataBody {
        body(
            BodySection {
                part: Vec::new(),
                kind: SectionKind::Header,
                fields: Vec::new(),
            },
            content,
        )
    }

    fn mime_body(path: Vec<u32>, content: &str) -> FetchDataBody {
        body(BodySection::mime_of(path), content)
    }

    fn content_body(path: Vec<u32>, content: &str) -> FetchDataBody {
        body(BodySection::for_part(path), content)
    }

    mod assemble_tests {
        use super::*;

        #[test]
        fn two_part_message_reassembles() {
            let root = multipart(
                "alternative",
                "=b=",
                vec![leaf("text", "plain"), leaf("text", "html")],
            );
            let parts = collect_parts(&root);
            let fetched = vec![
                header_body("Subject: hi\r\n\r\n"),
                mime_body(vec![1], "Content-Type: text/plain\r\n\r\n"),
                content_body(vec![1], "plain text\r\n"),
                mime_body(vec![2], "Content-Type: text/html\r\n\r\n"),
                content_body(vec![2], "<p>hi</p>\r\n"),
            ];
            let refs: Vec<&FetchDataBody> = fetched.iter().collect();

            let message = assemble(&parts, &refs, true).unwrap();
            let expected = concat!(
                "Subject: hi\r\n\r\n",
                "\r\n--=b=\r\n",
                "Content-Type: text/plain\r\n\r\n",
                "plain text\r\n",
                "\r\n--=b=\r\n",
                "Content-Type: text/html\r\n\r\n",
                "<p>hi</p>\r\n",
                "\r\n--=b=--\r\n",
            );
            assert_eq!(String::from_utf8(message).unwrap(), expected);
        }

        #[test]
        fn whole_body_fetch_passes_through() {
            let root = leaf("text", "plain");
            let parts = collect_parts(&root);
            let fetched = vec![body(
                BodySection::whole(),
                "Subject: x\r\n\r\njust the body\r\n",
            )];
            let refs: Vec<&FetchDataBody> = fetched.iter().collect();

            let message = assemble(&parts, &refs, true).unwrap();
            assert_eq!(message, b"Subject: x\r\n\r\njust the body\r\n");
        }

        #[test]
        fn synthesizes_missing_part_headers() {
            let html = BodyStructure {
                params: vec![("charset".to_string(), "utf-8".to_string())],
                ..leaf("text", "html")
            };
            let root = multipart("alternative", "=b=", vec![leaf("text", "plain"), html]);
            let parts = collect_parts(&root);
            let fetched = vec![
                header_body("Subject: hi\r\n\r\n"),
                mime_body(vec![1], "Content-Type: text/plain\r\n\r\n"),
                content_body(vec![1], "plain\r\n"),
                content_body(vec![2], "<p>hi</p>\r\n"),
            ];
            let refs: Vec<&FetchDataBody> = fetched.iter().collect();

            let message = String::from_utf8(assemble(&parts, &refs, true).unwrap()).unwrap();
            assert!(message.contains("Content-Type: text/html;\r\n\tcharset=utf-8\r\n\r\n<p>hi</p>"));
        }

        #[test]
        fn fetched_boundary_wins_when_structure_untrusted() {
            let root = multipart("mixed", "wrong", vec![leaf("text", "plain")]);
            let parts = collect_parts(&root);
            let fetched = vec![
                header_body(
                    "Content-Type: multipart/mixed;\r\n\tboundary=\"real\"\r\n\r\n",
                ),
                mime_body(vec![1], "Content-Type: text/plain\r\n\r\n"),
                content_body(vec![1], "text\r\n"),
            ];
            let refs: Vec<&FetchDataBody> = fetched.iter().collect();

            let trusted = String::from_utf8(assemble(&parts, &refs, true).unwrap()).unwrap();
            assert!(trusted.contains("--wrong\r\n"));

            let verified = String::from_utf8(assemble(&parts, &refs, false).unwrap()).unwrap();
            assert!(verified.contains("--real\r\n"));
            assert!(verified.contains("--real--\r\n"));
            assert!(!verified.contains("--wrong"));
        }

        #[test]
        fn nested_multiparts_close_in_order() {
            let inner = multipart(
                "alternative",
                "inner",
                vec![leaf("text", "plain"), leaf("text", "html")],
            );
            let attachment = BodyStructure {
                disposition: Some("attachment".to_string()),
                ..leaf("application", "pdf")
            };
            let root = multipart("mixed", "outer", vec![inner, attachment]);
            let parts = collect_parts(&root);
            let fetched = vec![
                header_body("Subject: nested\r\n\r\n"),
                mime_body(
                    vec![1],
                    "Content-Type: multipart/alternative;\r\n\tboundary=inner\r\n\r\n",
                ),
                mime_body(vec![1, 1], "Content-Type: text/plain\r\n\r\n"),
                content_body(vec![1, 1], "plain\r\n"),
                mime_body(vec![1, 2], "Content-Type: text/html\r\n\r\n"),
                content_body(vec![1, 2], "<p/>\r\n"),
                mime_body(vec![2], "Content-Type: application/pdf\r\n\r\n"),
            ];
            let refs: Vec<&FetchDataBody> = fetched.iter().collect();

            let message = String::from_utf8(assemble(&parts, &refs, true).unwrap()).unwrap();
            let expected = concat!(
                "Subject: nested\r\n\r\n",
                "\r\n--outer\r\n",
                "Content-Type: multipart/alternative;\r\n\tboundary=inner\r\n\r\n",
                "\r\n--inner\r\n",
                "Content-Type: text/plain\r\n\r\n",
                "plain\r\n",
                "\r\n--inner\r\n",
                "Content-Type: text/html\r\n\r\n",
                "<p/>\r\n",
                "\r\n--inner--\r\n",
                "\r\n--outer\r\n",
                "Content-Type: application/pdf\r\n\r\n",
                "\r\n--outer--\r\n",
            );
            assert_eq!(message, expected);
        }

        #[test]
        fn missing_header_is_an_error() {
            let root = multipart("mixed", "b", vec![leaf("text", "plain")]);
            let parts = collect_parts(&root);
            let fetched = vec![content_body(vec![1], "text\r\n")];
            let refs: Vec<&FetchDataBody> = fetched.iter().collect();

            let err = assemble(&parts, &refs, true).unwrap_err();
            assert!(matches!(err, Error::Protocol(_)));
        }
    }

    mod header_synthesis_tests {
        use super::*;

        #[test]
        fn part_header_renders_every_known_field() {
            let structure = BodyStructure {
                content_type: "application".to_string(),
                content_subtype: "pdf".to_string(),
                params: vec![("name".to_string(), "year report.pdf".to_string())],
                id: Some("<part1@example>".to_string()),
                encoding: "base64".to_string(),
                disposition: Some("attachment".to_string()),
                disposition_params: vec![(
                    "filename".to_string(),
                    "year report.pdf".to_string(),
                )],
                ..BodyStructure::default()
            };
            let header = String::from_utf8(part_header(&structure)).unwrap();
            let expected = concat!(
                "Content-Type: application/pdf;\r\n\tname=\"year report.pdf\"\r\n",
                "Content-Disposition: attachment;\r\n\tfilename=\"year report.pdf\"\r\n",
                "Content-Transfer-Encoding: base64\r\n",
                "Content-Id: <part1@example>\r\n",
                "\r\n",
            );
            assert_eq!(header, expected);
        }

        #[test]
        fn untyped_part_still_ends_the_header_block() {
            let header = part_header(&BodyStructure::default());
            assert_eq!(header, b"\r\n");
        }

        #[test]
        fn envelope_header_renders_addresses() {
            let envelope = Envelope {
                date: Some("Mon, 24 Aug 2026 10:00:00 +0000".to_string()),
                subject: Some("status".to_string()),
                from: vec![Address {
                    name: Some("Ann Example".to_string()),
                    mailbox: Some("ann".to_string()),
                    host: Some("example.net".to_string()),
                    ..Address::default()
                }],
                to: vec![
                    Address {
                        mailbox: Some("bob".to_string()),
                        host: Some("example.net".to_string()),
                        ..Address::default()
                    },
                    Address {
                        mailbox: Some("carol".to_string()),
                        host: Some("example.net".to_string()),
                        ..Address::default()
                    },
                ],
                message_id: Some("<m1@example.net>".to_string()),
                ..Envelope::default()
            };
            let header = String::from_utf8(envelope_header(&envelope)).unwrap();
            let expected = concat!(
                "Message-Id: <m1@example.net>\r\n",
                "Subject: status\r\n",
                "Date: Mon, 24 Aug 2026 10:00:00 +0000\r\n",
                "From: \"Ann Example\" <ann@example.net>\r\n",
                "To: <bob@example.net>,\r\n\t<carol@example.net>\r\n",
                "\r\n",
            );
            assert_eq!(header, expected);
        }

        #[test]
        fn envelope_header_keeps_group_syntax() {
            let envelope = Envelope {
                to: vec![
                    Address {
                        mailbox: Some("undisclosed-recipients".to_string()),
                        ..Address::default()
                    },
                    Address::default(),
                ],
                ..Envelope::default()
            };
            let header = String::from_utf8(envelope_header(&envelope)).unwrap();
            assert_eq!(header, "To: undisclosed-recipients: ;\r\n\r\n");
        }
    }
}
