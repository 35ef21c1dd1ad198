//! Modified UTF-7 mailbox name coding.
//!
//! Mailbox names travel in the RFC 3501 variant of UTF-7: printable
//! ASCII stays literal, `&` becomes `&-`, and everything else rides in
//! `&...-` runs of base64'd UTF-16BE, with `,` standing in for `/` in
//! the alphabet. Decoding is lenient: a run that does not decode is
//! kept verbatim rather than failing the listing that carried it.

use base64::Engine as _;
use base64::alphabet;
use base64::engine::GeneralPurpose;
use base64::engine::general_purpose::NO_PAD;

const B64: GeneralPurpose = GeneralPurpose::new(&alphabet::IMAP_MUTF7, NO_PAD);

/// Encodes a mailbox name for the wire.
pub(crate) fn encode(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut shifted: Vec<u16> = Vec::new();
    for ch in name.chars() {
        if ch == '&' {
            flush(&mut out, &mut shifted);
            out.push_str("&-");
        } else if matches!(ch, ' '..='~') {
            flush(&mut out, &mut shifted);
            out.push(ch);
        } else {
            let mut units = [0u16; 2];
            shifted.extend_from_slice(ch.encode_utf16(&mut units));
        }
    }
    flush(&mut out, &mut shifted);
    out
}

fn flush(out: &mut String, shifted: &mut Vec<u16>) {
    if shifted.is_empty() {
        return;
    }
    let bytes: Vec<u8> = shifted.drain(..).flat_map(u16::to_be_bytes).collect();
    out.push('&');
    out.push_str(&B64.encode(&bytes));
    out.push('-');
}

/// Decodes a mailbox name received from the wire.
pub(crate) fn decode(encoded: &str) -> String {
    let mut out = String::with_capacity(encoded.len());
    let mut rest = encoded;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp + 1..];
        let Some(dash) = tail.find('-') else {
            // Unterminated run: keep it verbatim.
            out.push_str(&rest[amp..]);
            return out;
        };
        let run = &tail[..dash];
        if run.is_empty() {
            out.push('&');
        } else {
            match decode_run(run) {
                Some(text) => out.push_str(&text),
                None => {
                    out.push('&');
                    out.push_str(run);
                    out.push('-');
                }
            }
        }
        rest = &tail[dash + 1..];
    }
    out.push_str(rest);
    out
}

/// One base64 run between `&` and `-`.
fn decode_run(run: &str) -> Option<String> {
    let bytes = B64.decode(run).ok()?;
    if bytes.len() % 2 != 0 {
        return None;
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    Some(String::from_utf16_lossy(&units))
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

    #[test]
    fn ascii_passes_through() {
        assert_eq!(encode("INBOX.Sent Items"), "INBOX.Sent Items");
        assert_eq!(decode("INBOX.Sent Items"), "INBOX.Sent Items");
    }

    #[test]
    fn ampersand_is_its_own_run() {
        assert_eq!(encode("Mail & News"), "Mail &- News");
        assert_eq!(decode("Mail &- News"), "Mail & News");
    }

    #[test]
    fn latin_accents() {
        assert_eq!(encode("Entw\u{fc}rfe"), "Entw&APw-rfe");
        assert_eq!(decode("Entw&APw-rfe"), "Entw\u{fc}rfe");
    }

    #[test]
    fn mixed_script_path() {
        // The RFC 3501 example name.
        let decoded = "~peter/mail/\u{53f0}\u{5317}/\u{65e5}\u{672c}\u{8a9e}";
        let encoded = "~peter/mail/&U,BTFw-/&ZeVnLIqe-";
        assert_eq!(encode(decoded), encoded);
        assert_eq!(decode(encoded), decoded);
    }

    #[test]
    fn control_bytes_are_shifted() {
        assert_eq!(encode("a\tb"), "a&AAk-b");
        assert_eq!(decode("a&AAk-b"), "a\tb");
    }

    #[test]
    fn adjacent_runs() {
        assert_eq!(encode("\u{fc}&\u{fc}"), "&APw-&-&APw-");
        assert_eq!(decode("&APw-&-&APw-"), "\u{fc}&\u{fc}");
    }

    #[test]
    fn malformed_runs_stay_verbatim() {
        assert_eq!(decode("Entw&APw"), "Entw&APw");
        assert_eq!(decode("&!!-x"), "&!!-x");
        assert_eq!(decode("&AP-"), "&AP-");
    }

    proptest! {
        #[test]
        fn any_name_round_trips(name in ".*") {
            prop_assert_eq!(decode(&encode(&name)), name);
        }
    }
}
