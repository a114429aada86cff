//! MIME encoding and decoding utilities.
//!
//! Supports Base64, Quoted-Printable body decoding, and percent-decoding of
//! `cid:` URL references (RFC 2392).

use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use percent_encoding::percent_decode_str;
use std::borrow::Cow;

/// Encodes data as Base64 (standard alphabet, padded).
#[must_use]
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decodes Base64 data.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    STANDARD.decode(data).map_err(Into::into)
}

/// Decodes a Base64 body, ignoring line breaks and other whitespace.
///
/// # Errors
///
/// Returns an error if the remaining input is not valid Base64.
pub fn decode_base64_lenient(data: &[u8]) -> Result<Vec<u8>> {
    let cleaned: Vec<u8> = data
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    STANDARD.decode(cleaned).map_err(Into::into)
}

/// Decodes a Quoted-Printable body (RFC 2045).
///
/// # Errors
///
/// Returns an error if the input contains invalid escape sequences.
pub fn decode_quoted_printable(data: &[u8]) -> Result<Vec<u8>> {
    let mut result = Vec::with_capacity(data.len());
    let mut i = 0;

    while i < data.len() {
        let byte = data[i];
        if byte != b'=' {
            result.push(byte);
            i += 1;
            continue;
        }

        // Soft line break
        match data.get(i + 1..) {
            Some([b'\r', b'\n', ..]) => {
                i += 3;
                continue;
            }
            Some([b'\n', ..]) => {
                i += 2;
                continue;
            }
            _ => {}
        }

        // Hex encoded byte
        let hex = data
            .get(i + 1..i + 3)
            .ok_or_else(|| Error::InvalidEncoding("Incomplete escape sequence".to_string()))?;
        let hex = std::str::from_utf8(hex)
            .map_err(|_| Error::InvalidEncoding("Non-ASCII escape sequence".to_string()))?;
        let value = u8::from_str_radix(hex, 16)
            .map_err(|e| Error::InvalidEncoding(format!("Invalid hex {hex:?}: {e}")))?;
        result.push(value);
        i += 3;
    }

    Ok(result)
}

/// Turns an `href` value into the content-ID it references.
///
/// Strips a leading `cid:` scheme (case-insensitive) and percent-decodes the
/// remainder when it contains escapes. Values without the scheme are returned
/// as-is apart from decoding.
///
/// # Errors
///
/// Returns an error if the decoded bytes are not UTF-8.
pub fn content_id_from_href(href: &str) -> Result<Cow<'_, str>> {
    let href = href.trim();
    let raw = match href.get(..4) {
        Some(scheme) if scheme.eq_ignore_ascii_case("cid:") => &href[4..],
        _ => href,
    };

    if !raw.contains('%') {
        return Ok(Cow::Borrowed(raw));
    }

    percent_decode_str(raw)
        .decode_utf8()
        .map_err(|e| Error::InvalidEncoding(format!("Invalid percent-encoding in {raw:?}: {e}")))
}
