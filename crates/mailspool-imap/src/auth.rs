//! SASL payload builders for the AUTHENTICATE exchange.
//!
//! Implements:
//! - CRAM-MD5 (RFC 2195) - Challenge/response keyed-digest authentication
//! - PLAIN (RFC 4616) - Basic username/password authentication
//!
//! Each builder returns the base64 text that goes on the wire after the
//! server's `+` continuation; the caller owns the command cycle around
//! it.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use md5::Md5;

use crate::error::{Error, Result};

type HmacMd5 = Hmac<Md5>;

const HEX: &[u8; 16] = b"0123456789abcdef";

/// Generates the CRAM-MD5 challenge response (RFC 2195).
///
/// `challenge` is the base64 text the server sent after its `+`
/// continuation. The reply is `<username> <digest>` base64 encoded,
/// where the digest is the lowercase hex HMAC-MD5 of the decoded
/// challenge keyed by the password.
///
/// # Errors
///
/// Returns [`Error::Auth`] when the challenge is not valid base64.
pub fn cram_md5_response(username: &str, password: &str, challenge: &str) -> Result<String> {
    let decoded = STANDARD
        .decode(challenge.trim())
        .map_err(|e| Error::Auth(format!("invalid CRAM-MD5 challenge: {e}")))?;

    let mut mac = HmacMd5::new_from_slice(password.as_bytes())
        .map_err(|e| Error::Auth(format!("invalid CRAM-MD5 key: {e}")))?;
    mac.update(&decoded);
    let digest = mac.finalize().into_bytes();

    let mut reply = String::with_capacity(username.len() + 1 + digest.len() * 2);
    reply.push_str(username);
    reply.push(' ');
    for byte in digest {
        reply.push(HEX[usize::from(byte >> 4)] as char);
        reply.push(HEX[usize::from(byte & 0x0f)] as char);
    }
    Ok(STANDARD.encode(reply.as_bytes()))
}

/// Generates the PLAIN initial response (RFC 4616).
///
/// Format: `\0<username>\0<password>` (base64 encoded). The leading NUL
/// is the empty authorization identity, meaning "act as the
/// authentication identity".
///
/// # Example
///
/// ```
/// use mailspool_imap::auth::plain_response;
///
/// let response = plain_response("user@example.com", "password123");
/// // Goes on the wire after AUTHENTICATE PLAIN's continuation.
/// ```
#[must_use]
pub fn plain_response(username: &str, password: &str) -> String {
    let auth_string = format!("\0{username}\0{password}");
    STANDARD.encode(auth_string.as_bytes())
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
    fn cram_md5_rfc_2195_vector() {
        // The worked example from RFC 2195 section 2.
        let challenge = STANDARD.encode("<1896.697170952@postoffice.reston.mci.net>");
        let response = cram_md5_response("tim", "tanstaaftanstaaf", &challenge).unwrap();

        let decoded = String::from_utf8(STANDARD.decode(&response).unwrap()).unwrap();
        assert_eq!(decoded, "tim b913a602c7eda7a495b4e6e7334d3890");
        assert_eq!(response, "dGltIGI5MTNhNjAyYzdlZGE3YTQ5NWI0ZTZlNzMzNGQzODkw");
    }

    #[test]
    fn cram_md5_tolerates_challenge_whitespace() {
        let challenge = STANDARD.encode("<1896.697170952@postoffice.reston.mci.net>");
        let padded = format!("  {challenge}\r\n");
        assert_eq!(
            cram_md5_response("tim", "tanstaaftanstaaf", &padded).unwrap(),
            cram_md5_response("tim", "tanstaaftanstaaf", &challenge).unwrap()
        );
    }

    #[test]
    fn cram_md5_rejects_bad_base64() {
        let err = cram_md5_response("tim", "secret", "not*base64!").unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }

    #[test]
    fn plain_response_format() {
        let response = plain_response("test", "pass");
        let decoded = STANDARD.decode(&response).unwrap();
        let decoded_str = String::from_utf8(decoded).unwrap();

        // Exact format per RFC 4616.
        assert_eq!(decoded_str, "\0test\0pass");
    }

    #[test]
    fn plain_response_special_chars() {
        let response = plain_response("user", "pass@word!");
        let decoded = STANDARD.decode(&response).unwrap();
        let decoded_str = String::from_utf8(decoded).unwrap();

        assert_eq!(decoded_str, "\0user\0pass@word!");
    }

    #[test]
    fn responses_are_base64() {
        let response = plain_response("user@example.com", "hunter2");
        assert!(!response.contains("user@example.com"));
        assert!(!response.contains("hunter2"));
        assert!(STANDARD.decode(&response).is_ok());
    }
}
