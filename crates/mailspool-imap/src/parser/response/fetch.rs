//! FETCH response interpretation.
//!
//! Works on the element trees the list parser produced; nothing here
//! touches the wire. ENVELOPE and BODYSTRUCTURE slots are positional,
//! so missing trailing slots fall back to defaults rather than
//! failing the whole response.

use chrono::{DateTime, FixedOffset};

use crate::leniency::Leniency;
use crate::parser::Element;
use crate::{Error, Result};

use super::helpers::flags_of;
use super::types::{
    Address, BodySection, BodyStructure, Envelope, FetchData, FetchDataBody, FetchResponse,
    SectionKind,
};

/// Builds a [`FetchResponse`] from the elements of one `FETCH (...)`
/// list.
pub(crate) fn interpret(number: u32, elements: Vec<Element>) -> Result<FetchResponse> {
    let mut fetch = FetchResponse {
        number,
        uid: None,
        items: Vec::new(),
    };
    let mut elements = elements.into_iter();
    while let Some(key) = elements.next() {
        let Some(name) = key.as_atom().map(str::to_string) else {
            tracing::debug!(message = number, "ignoring non-atom fetch item key");
            continue;
        };
        let Some(value) = elements.next() else {
            return Err(structure_error(format!("fetch item {name} has no value")));
        };
        match name.to_ascii_uppercase().as_str() {
            "FLAGS" => {
                let list = value
                    .into_list()
                    .ok_or_else(|| structure_error("FLAGS value is not a list"))?;
                fetch.items.push(FetchData::Flags(flags_of(&list)));
            }
            "UID" => {
                let uid = value
                    .number()
                    .ok_or_else(|| structure_error("UID value is not a number"))?;
                fetch.uid = Some(uid);
            }
            "RFC822.SIZE" => {
                let size = value
                    .number_or_nil()
                    .ok_or_else(|| structure_error("RFC822.SIZE value is not a number"))?;
                fetch.items.push(FetchData::Size(size));
            }
            "INTERNALDATE" => match value.into_text().as_deref().and_then(internal_date) {
                Some(date) => fetch.items.push(FetchData::InternalDate(date)),
                None => tracing::debug!(message = number, "unreadable INTERNALDATE"),
            },
            "ENVELOPE" => fetch.items.push(FetchData::Envelope(envelope(value)?)),
            "BODY" | "BODYSTRUCTURE" => {
                fetch
                    .items
                    .push(FetchData::BodyStructure(body_structure(value)?));
            }
            "RFC822" => fetch.items.push(content_item(BodySection::whole(), None, value)),
            "RFC822.HEADER" => {
                let section = BodySection {
                    part: Vec::new(),
                    kind: SectionKind::Header,
                    fields: Vec::new(),
                };
                fetch.items.push(content_item(section, None, value));
            }
            "RFC822.TEXT" => {
                let section = BodySection {
                    part: Vec::new(),
                    kind: SectionKind::Text,
                    fields: Vec::new(),
                };
                fetch.items.push(content_item(section, None, value));
            }
            _ => match body_key(&name) {
                Some((section, origin)) => {
                    fetch.items.push(content_item(section, origin, value));
                }
                None => {
                    tracing::debug!(message = number, item = %name, "ignoring unknown fetch item");
                }
            },
        }
    }
    Ok(fetch)
}

/// Wraps section content as a [`FetchData::Body`] item. NIL content
/// becomes an empty byte vector.
fn content_item(section: BodySection, origin: Option<u32>, value: Element) -> FetchData {
    FetchData::Body(FetchDataBody {
        section,
        origin,
        content: value.into_bytes().unwrap_or_default(),
    })
}

/// Splits a `BODY[section]<origin>` item key. The brackets arrive
/// inside the key atom because section text is separator-opaque.
fn body_key(name: &str) -> Option<(BodySection, Option<u32>)> {
    let (prefix, rest) = name.split_at_checked(4)?;
    if !prefix.eq_ignore_ascii_case("BODY") || !rest.starts_with('[') {
        return None;
    }
    let close = rest.rfind(']')?;
    let section = BodySection::parse(&rest[1..close])?;
    let origin = rest[close + 1..]
        .strip_prefix('<')
        .and_then(|text| text.strip_suffix('>'))
        .and_then(|text| text.parse().ok());
    Some((section, origin))
}

/// Reads the ten positional ENVELOPE slots.
fn envelope(element: Element) -> Result<Envelope> {
    let slots = element
        .into_list()
        .ok_or_else(|| structure_error("ENVELOPE is not a list"))?;
    let mut slots = slots.into_iter();
    Ok(Envelope {
        date: slots.next().and_then(Element::into_text),
        subject: slots.next().and_then(Element::into_text),
        from: addresses(slots.next()),
        sender: addresses(slots.next()),
        reply_to: addresses(slots.next()),
        to: addresses(slots.next()),
        cc: addresses(slots.next()),
        bcc: addresses(slots.next()),
        in_reply_to: slots.next().and_then(Element::into_text),
        message_id: slots.next().and_then(Element::into_text),
    })
}

/// Reads an envelope address-list slot. Bare text where an address
/// group belongs is skipped, not fatal.
fn addresses(slot: Option<Element>) -> Vec<Address> {
    let Some(Element::List(items)) = slot else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for item in items {
        match item {
            Element::List(slots) => {
                let mut slots = slots.into_iter();
                out.push(Address {
                    name: slots.next().and_then(Element::into_text),
                    adl: slots.next().and_then(Element::into_text),
                    mailbox: slots.next().and_then(Element::into_text),
                    host: slots.next().and_then(Element::into_text),
                });
            }
            Element::Atom(_) | Element::Bytes(_) => {
                Leniency::StrayAddressText.note();
            }
            Element::Nil => {}
        }
    }
    out
}

/// Builds one node of the body-structure tree.
///
/// A list that opens with another list is a multipart container:
/// child parts run back to back, then the subtype and the multipart
/// extension fields. Anything else is a single part with the fixed
/// seven slots, optional type-specific slots, then the extension
/// fields.
fn body_structure(element: Element) -> Result<BodyStructure> {
    let items = element
        .into_list()
        .ok_or_else(|| structure_error("body structure is not a list"))?;
    let mut items = items.into_iter().peekable();

    if matches!(items.peek(), Some(Element::List(_))) {
        let mut children = Vec::new();
        while let Some(child) = items.next_if(|item| matches!(item, Element::List(_))) {
            children.push(body_structure(child)?);
        }
        let content_subtype = items.next().and_then(Element::into_text).unwrap_or_default();
        let params = items.next().map(params_of).unwrap_or_default();
        let (disposition, disposition_params) = disposition_of(items.next());
        let languages = languages_of(items.next());
        return Ok(BodyStructure {
            content_type: "multipart".to_string(),
            content_subtype,
            params,
            disposition,
            disposition_params,
            languages,
            children,
            ..BodyStructure::default()
        });
    }

    let mut bs = BodyStructure {
        content_type: items.next().and_then(Element::into_text).unwrap_or_default(),
        content_subtype: items.next().and_then(Element::into_text).unwrap_or_default(),
        params: items.next().map(params_of).unwrap_or_default(),
        id: items.next().and_then(Element::into_text),
        description: items.next().and_then(Element::into_text),
        encoding: items.next().and_then(Element::into_text).unwrap_or_default(),
        size: items
            .next()
            .as_ref()
            .and_then(Element::number_or_nil)
            .unwrap_or(0),
        ..BodyStructure::default()
    };

    if bs.is_message() {
        if let Some(slot) = items.next() {
            if !slot.is_nil() {
                bs.envelope = Some(Box::new(envelope(slot)?));
            }
        }
        if let Some(slot) = items.next() {
            if !slot.is_nil() {
                bs.children.push(body_structure(slot)?);
            }
        }
        bs.lines = items.next().as_ref().and_then(Element::number_or_nil);
    } else if bs.content_type.eq_ignore_ascii_case("text") {
        bs.lines = items.next().as_ref().and_then(Element::number_or_nil);
    }

    bs.md5 = items.next().and_then(Element::into_text);
    let (disposition, disposition_params) = disposition_of(items.next());
    bs.disposition = disposition;
    bs.disposition_params = disposition_params;
    bs.languages = languages_of(items.next());
    Ok(bs)
}

/// Reads a `("name" "value" ...)` parameter list; NIL or anything
/// unexpected yields no parameters.
fn params_of(element: Element) -> Vec<(String, String)> {
    let Element::List(items) = element else {
        return Vec::new();
    };
    let mut out = Vec::new();
    let mut items = items.into_iter();
    while let Some(key) = items.next() {
        let Some(value) = items.next() else { break };
        if let (Some(key), Some(value)) = (key.into_text(), value.into_text()) {
            out.push((key, value));
        }
    }
    out
}

/// Reads a `("disposition" (params))` slot.
fn disposition_of(slot: Option<Element>) -> (Option<String>, Vec<(String, String)>) {
    let Some(Element::List(items)) = slot else {
        return (None, Vec::new());
    };
    let mut items = items.into_iter();
    let kind = items.next().and_then(Element::into_text);
    let params = items.next().map(params_of).unwrap_or_default();
    (kind, params)
}

/// Reads a language slot: one tag, a list of tags, or NIL.
fn languages_of(slot: Option<Element>) -> Vec<String> {
    match slot {
        Some(Element::List(items)) => items.into_iter().filter_map(Element::into_text).collect(),
        Some(element) => element.into_text().into_iter().collect(),
        None => Vec::new(),
    }
}

/// Parses an `INTERNALDATE` value such as `17-Jul-1996 02:44:25 -0700`.
fn internal_date(text: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_str(text.trim(), "%d-%b-%Y %H:%M:%S %z").ok()
}

fn structure_error(message: impl Into<String>) -> Error {
    Error::Parse {
        position: 0,
        message: message.into(),
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
    use crate::types::Flags;

    use super::*;

    fn atom(text: &str) -> Element {
        Element::Atom(text.to_string())
    }

    fn bytes(text: &str) -> Element {
        Element::Bytes(text.as_bytes().to_vec())
    }

    fn list(items: Vec<Element>) -> Element {
        Element::List(items)
    }

    mod interpret_tests {
        use super::*;

        #[test]
        fn uid_is_folded_out_of_the_items() {
            let fetch = interpret(
                2,
                vec![
                    atom("UID"),
                    atom("991"),
                    atom("FLAGS"),
                    list(vec![atom("\\Seen")]),
                ],
            )
            .unwrap();
            assert_eq!(fetch.number, 2);
            assert_eq!(fetch.uid, Some(991));
            assert_eq!(fetch.items.len(), 1);
            assert!(fetch.flags().unwrap().contains(Flags::SEEN));
        }

        #[test]
        fn size_and_internal_date() {
            let fetch = interpret(
                1,
                vec![
                    atom("RFC822.SIZE"),
                    atom("44827"),
                    atom("INTERNALDATE"),
                    bytes("17-Jul-1996 02:44:25 -0700"),
                ],
            )
            .unwrap();
            assert_eq!(fetch.size(), Some(44827));
            let date = fetch.internal_date().unwrap();
            assert_eq!(date.timestamp(), 837596665);
        }

        #[test]
        fn unreadable_internal_date_is_dropped() {
            let fetch = interpret(1, vec![atom("INTERNALDATE"), bytes("yesterday")]).unwrap();
            assert!(fetch.internal_date().is_none());
        }

        #[test]
        fn body_section_content() {
            let fetch = interpret(
                3,
                vec![atom("BODY[1.2]"), bytes("part two point one")],
            )
            .unwrap();
            let body = fetch.bodies().next().unwrap();
            assert_eq!(body.section.part, vec![1, 2]);
            assert_eq!(body.origin, None);
            assert_eq!(body.content, b"part two point one");
        }

        #[test]
        fn partial_fetch_origin() {
            let fetch = interpret(3, vec![atom("BODY[]<1024>"), bytes("chunk")]).unwrap();
            let body = fetch.bodies().next().unwrap();
            assert_eq!(body.section, BodySection::whole());
            assert_eq!(body.origin, Some(1024));
        }

        #[test]
        fn nil_body_content_is_empty() {
            let fetch = interpret(3, vec![atom("BODY[2.MIME]"), Element::Nil]).unwrap();
            let body = fetch.bodies().next().unwrap();
            assert_eq!(body.section.kind, SectionKind::Mime);
            assert!(body.content.is_empty());
        }

        #[test]
        fn rfc822_aliases_map_to_sections() {
            let fetch = interpret(
                5,
                vec![
                    atom("RFC822.HEADER"),
                    bytes("From: a@b\r\n\r\n"),
                    atom("RFC822.TEXT"),
                    bytes("hi"),
                ],
            )
            .unwrap();
            let sections: Vec<SectionKind> =
                fetch.bodies().map(|body| body.section.kind).collect();
            assert_eq!(sections, vec![SectionKind::Header, SectionKind::Text]);
        }

        #[test]
        fn unknown_items_are_skipped_in_pairs() {
            let fetch = interpret(
                1,
                vec![
                    atom("X-GM-MSGID"),
                    atom("1278455344230334865"),
                    atom("RFC822.SIZE"),
                    atom("9"),
                ],
            )
            .unwrap();
            assert_eq!(fetch.items.len(), 1);
            assert_eq!(fetch.size(), Some(9));
        }

        #[test]
        fn missing_value_is_an_error() {
            assert!(interpret(1, vec![atom("FLAGS")]).is_err());
        }

        #[test]
        fn uid_must_be_numeric() {
            assert!(interpret(1, vec![atom("UID"), bytes("soon")]).is_err());
        }
    }

    mod envelope_tests {
        use super::*;

        fn address(name: &str, mailbox: &str, host: &str) -> Element {
            list(vec![bytes(name), Element::Nil, bytes(mailbox), bytes(host)])
        }

        #[test]
        fn ten_slots_in_order() {
            let env = envelope(list(vec![
                bytes("Mon, 1 Jul 1996 10:06:00 -0600"),
                bytes("Meeting"),
                list(vec![address("Terry", "gray", "cac.washington.edu")]),
                Element::Nil,
                Element::Nil,
                list(vec![address("", "imap", "cac.washington.edu")]),
                Element::Nil,
                Element::Nil,
                Element::Nil,
                bytes("<B27397-0100000@cac.washington.edu>"),
            ]))
            .unwrap();
            assert_eq!(env.subject.as_deref(), Some("Meeting"));
            assert_eq!(env.from.len(), 1);
            assert_eq!(
                env.from[0].email(),
                Some("gray@cac.washington.edu".to_string())
            );
            assert_eq!(env.to.len(), 1);
            assert!(env.cc.is_empty());
            assert_eq!(
                env.message_id.as_deref(),
                Some("<B27397-0100000@cac.washington.edu>")
            );
        }

        #[test]
        fn stray_text_in_address_list_is_skipped() {
            let env = envelope(list(vec![
                Element::Nil,
                Element::Nil,
                list(vec![
                    bytes("Undisclosed recipients"),
                    address("Real", "real", "example.com"),
                ]),
                Element::Nil,
                Element::Nil,
                Element::Nil,
                Element::Nil,
                Element::Nil,
                Element::Nil,
                Element::Nil,
            ]))
            .unwrap();
            assert_eq!(env.from.len(), 1);
            assert_eq!(env.from[0].mailbox.as_deref(), Some("real"));
        }

        #[test]
        fn short_envelope_defaults_missing_slots() {
            let env = envelope(list(vec![Element::Nil, bytes("only subject")])).unwrap();
            assert_eq!(env.subject.as_deref(), Some("only subject"));
            assert!(env.from.is_empty());
            assert!(env.message_id.is_none());
        }
    }

    mod body_structure_tests {
        use super::*;

        fn text_part(subtype: &str, size: &str, lines: &str) -> Element {
            list(vec![
                bytes("TEXT"),
                bytes(subtype),
                list(vec![bytes("CHARSET"), bytes("US-ASCII")]),
                Element::Nil,
                Element::Nil,
                bytes("7BIT"),
                atom(size),
                atom(lines),
            ])
        }

        #[test]
        fn single_text_part() {
            let bs = body_structure(text_part("PLAIN", "3028", "92")).unwrap();
            assert_eq!(bs.content_type, "TEXT");
            assert_eq!(bs.content_subtype, "PLAIN");
            assert_eq!(bs.param("charset"), Some("US-ASCII"));
            assert_eq!(bs.size, 3028);
            assert_eq!(bs.lines, Some(92));
            assert!(bs.children.is_empty());
        }

        #[test]
        fn nil_size_becomes_zero() {
            let bs = body_structure(list(vec![
                bytes("APPLICATION"),
                bytes("OCTET-STREAM"),
                Element::Nil,
                Element::Nil,
                Element::Nil,
                bytes("BASE64"),
                Element::Nil,
            ]))
            .unwrap();
            assert_eq!(bs.size, 0);
        }

        #[test]
        fn multipart_with_children() {
            let bs = body_structure(list(vec![
                text_part("PLAIN", "100", "4"),
                text_part("HTML", "500", "20"),
                bytes("ALTERNATIVE"),
                list(vec![bytes("BOUNDARY"), bytes("=_b1")]),
            ]))
            .unwrap();
            assert!(bs.is_multipart());
            assert_eq!(bs.content_subtype, "ALTERNATIVE");
            assert_eq!(bs.children.len(), 2);
            assert_eq!(bs.children[1].content_subtype, "HTML");
            assert_eq!(bs.param("boundary"), Some("=_b1"));
        }

        #[test]
        fn message_rfc822_carries_envelope_and_body() {
            let bs = body_structure(list(vec![
                bytes("MESSAGE"),
                bytes("RFC822"),
                Element::Nil,
                Element::Nil,
                Element::Nil,
                bytes("7BIT"),
                atom("3302"),
                list(vec![
                    Element::Nil,
                    bytes("Forwarded"),
                    Element::Nil,
                    Element::Nil,
                    Element::Nil,
                    Element::Nil,
                    Element::Nil,
                    Element::Nil,
                    Element::Nil,
                    Element::Nil,
                ]),
                text_part("PLAIN", "3000", "80"),
                atom("92"),
            ]))
            .unwrap();
            assert!(bs.is_message());
            assert_eq!(
                bs.envelope.as_ref().unwrap().subject.as_deref(),
                Some("Forwarded")
            );
            assert_eq!(bs.children.len(), 1);
            assert_eq!(bs.children[0].content_subtype, "PLAIN");
            assert_eq!(bs.lines, Some(92));
        }

        #[test]
        fn extension_fields_after_lines() {
            let bs = body_structure(list(vec![
                bytes("TEXT"),
                bytes("PLAIN"),
                Element::Nil,
                Element::Nil,
                Element::Nil,
                bytes("7BIT"),
                atom("10"),
                atom("1"),
                Element::Nil,
                list(vec![
                    bytes("attachment"),
                    list(vec![bytes("filename"), bytes("notes.txt")]),
                ]),
                bytes("en"),
            ]))
            .unwrap();
            assert_eq!(bs.disposition.as_deref(), Some("attachment"));
            assert_eq!(bs.disposition_params[0].1, "notes.txt");
            assert_eq!(bs.languages, vec!["en".to_string()]);
        }
    }

    mod body_key_tests {
        use super::*;

        #[test]
        fn section_and_origin() {
            let (section, origin) = body_key("BODY[1.2.MIME]<512>").unwrap();
            assert_eq!(section.part, vec![1, 2]);
            assert_eq!(section.kind, SectionKind::Mime);
            assert_eq!(origin, Some(512));
        }

        #[test]
        fn header_fields_with_inner_parens() {
            let (section, origin) = body_key("BODY[HEADER.FIELDS (From To)]").unwrap();
            assert_eq!(section.kind, SectionKind::HeaderFields);
            assert_eq!(section.fields, vec!["From", "To"]);
            assert_eq!(origin, None);
        }

        #[test]
        fn non_body_keys_are_rejected() {
            assert!(body_key("ENVELOPE").is_none());
            assert!(body_key("BODYSTRUCTURE").is_none());
            assert!(body_key("BODY").is_none());
        }
    }
}
