//! Purpose: Normalize raw transport responses into canonical payloads.
//! Exports: `Payload`, `CanonicalResponse`, `normalize_response`, `media_type`.
//! Role: Content-type classification happens here and nowhere else.
//! Invariants: Only `application/json` and `application/octet-stream` are accepted.
//! Invariants: Text payloads always lose exactly one leading and one trailing character.

use serde_json::Value;

use crate::core::error::{Error, ErrorKind};

pub const MEDIA_TYPE_JSON: &str = "application/json";
pub const MEDIA_TYPE_OCTET_STREAM: &str = "application/octet-stream";

/// Canonical payload: either a parsed JSON structure or unwrapped text.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Object(Value),
    Text(String),
}

impl Payload {
    pub fn as_object(&self) -> Option<&Value> {
        match self {
            Payload::Object(value) => Some(value),
            Payload::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Object(_) => None,
            Payload::Text(text) => Some(text),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CanonicalResponse {
    pub http_success: bool,
    pub status_code: u16,
    pub payload: Payload,
}

pub fn normalize_response(
    status_code: u16,
    content_type: Option<&str>,
    body: &str,
) -> Result<CanonicalResponse, Error> {
    // Redirects are disabled at the agent; one arriving anyway is a
    // transport anomaly, not something to chase or interpret.
    if (300..400).contains(&status_code) {
        return Err(Error::new(ErrorKind::Transport)
            .with_message(format!("redirect response {status_code} was not followed")));
    }
    let declared = content_type.unwrap_or_default();
    let payload = match media_type(declared).as_str() {
        MEDIA_TYPE_JSON => Payload::Object(serde_json::from_str(body).map_err(|err| {
            Error::new(ErrorKind::Transport)
                .with_message("response body is not valid json")
                .with_source(err)
        })?),
        MEDIA_TYPE_OCTET_STREAM => Payload::Text(strip_wrapping_chars(body)),
        _ => {
            return Err(Error::new(ErrorKind::UnrecognizedContentType)
                .with_message("remote returned a content type this client cannot interpret")
                .with_content_type(declared));
        }
    };
    Ok(CanonicalResponse {
        http_success: (200..300).contains(&status_code),
        status_code,
        payload,
    })
}

/// Media type with parameters stripped, trimmed, and lowercased.
pub fn media_type(header: &str) -> String {
    header
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// The remote wraps octet-stream string results in a quote pair; drop the
/// first and last character without inspecting them. Mirrors the historical
/// `substring(1, length - 1)` exactly, including its degenerate behavior:
/// inputs shorter than two characters collapse to the empty string.
fn strip_wrapping_chars(raw: &str) -> String {
    let mut chars = raw.chars();
    chars.next();
    chars.next_back();
    chars.as_str().to_string()
}
