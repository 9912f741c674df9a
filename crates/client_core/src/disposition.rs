//! Filename extraction from `Content-Disposition`.

use tracing::debug;

const EXTENDED_PREFIX: &str = "filename*=utf-8''";
const PLAIN_PREFIX: &str = "filename=";

/// Preferred download name carried by a disposition header.
///
/// `filename*=UTF-8''…` wins over `filename="…"` / `filename=…`. If the
/// extended form does not percent-decode to UTF-8 the plain form is used.
pub fn filename_from_disposition(header: &str) -> Option<String> {
    if let Some(encoded) = extended_filename(header) {
        if !escapes_are_well_formed(encoded) {
            debug!(encoded, "disposition: filename* has a malformed escape");
            return plain_filename(header);
        }
        match urlencoding::decode(encoded) {
            Ok(name) if !name.trim().is_empty() => return Some(name.into_owned()),
            Ok(_) => {}
            Err(err) => debug!(encoded, error = %err, "disposition: filename* did not decode"),
        }
    }
    plain_filename(header)
}

pub fn archive_filename(header: Option<&str>, default_name: &str) -> String {
    header
        .and_then(filename_from_disposition)
        .unwrap_or_else(|| default_name.to_string())
}

fn extended_filename(header: &str) -> Option<&str> {
    let start = find_ignore_case(header, EXTENDED_PREFIX)? + EXTENDED_PREFIX.len();
    let value = header[start..].split(';').next()?.trim();
    (!value.is_empty()).then_some(value)
}

fn plain_filename(header: &str) -> Option<String> {
    let start = find_ignore_case(header, PLAIN_PREFIX)? + PLAIN_PREFIX.len();
    let rest = &header[start..];

    if let Some(quoted) = rest.strip_prefix('"') {
        if let Some(end) = quoted.find('"') {
            if end > 0 {
                return Some(quoted[..end].to_string());
            }
        }
    }

    let value = rest.split(';').next()?.trim().trim_matches('"');
    (!value.is_empty()).then(|| value.to_string())
}

/// Every `%` must start a two-digit hex escape.
fn escapes_are_well_formed(encoded: &str) -> bool {
    let bytes = encoded.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let escape = bytes.get(i + 1..i + 3);
            if !escape.is_some_and(|pair| pair.iter().all(u8::is_ascii_hexdigit)) {
                return false;
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    true
}

// ASCII lowercasing keeps byte offsets, so the index is valid in `haystack`.
fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    haystack.to_ascii_lowercase().find(needle)
}
