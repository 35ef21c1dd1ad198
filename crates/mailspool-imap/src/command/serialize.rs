//! Wire encoding helpers.

use crate::types::Flags;
use crate::utf7;

/// Writes a quoted string, escaping `"` and `\`.
pub(super) fn write_quoted(buf: &mut Vec<u8>, text: &str) {
    buf.push(b'"');
    for byte in text.bytes() {
        if byte == b'"' || byte == b'\\' {
            buf.push(b'\\');
        }
        buf.push(byte);
    }
    buf.push(b'"');
}

/// Writes a mailbox name: modified UTF-7, always quoted.
pub(super) fn write_mailbox(buf: &mut Vec<u8>, name: &str) {
    write_quoted(buf, &utf7::encode(name));
}

/// Writes a parenthesized flag list.
pub(super) fn write_flag_list(buf: &mut Vec<u8>, flags: &Flags) {
    buf.push(b'(');
    buf.extend_from_slice(flags.to_string().as_bytes());
    buf.push(b')');
}
