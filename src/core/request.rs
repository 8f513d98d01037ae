//! Purpose: Build concrete transport requests from logical operation descriptors.
//! Exports: `HttpMethod`, `ContentType`, `HttpOptions`, `TransportRequest`, `build_request`.
//! Role: Pure request construction; no I/O happens here.
//! Invariants: Auth headers are merged last and cannot be overridden by encodings.
//! Invariants: Body encoding failures surface before any network activity.

use std::fmt::Write as _;

use serde_json::Value;
use url::Url;

use crate::core::config::Credentials;
use crate::core::error::{Error, ErrorKind};

pub const API_ENDPOINT: &str = "https://api.cloudflare.com/client/v4";
pub const KV_API_PATH: &str = "storage/kv";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// Body encoding selector. `PlainText` JSON-stringifies the body even when
/// it is a bare string, so transmitted string values keep their JSON quotes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContentType {
    None,
    Json,
    PlainText,
    FormData,
}

/// Logical operation descriptor. Immutable per call.
#[derive(Clone, Debug)]
pub struct HttpOptions {
    pub method: HttpMethod,
    pub path: String,
    pub params: Option<Vec<(String, String)>>,
    pub body: Option<Value>,
    pub content_type: ContentType,
}

/// Concrete request handed to the transport. Never mutated after construction.
#[derive(Clone, Debug)]
pub struct TransportRequest {
    pub method: HttpMethod,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

pub fn build_request(
    base_url: &str,
    auth: &Credentials,
    http: &HttpOptions,
) -> Result<TransportRequest, Error> {
    let (body, content_header) = encode_body(http)?;
    let url = build_operation_url(base_url, auth, http)?;
    let mut headers = Vec::new();
    if let Some(value) = content_header {
        headers.push(("Content-Type".to_string(), value));
    }
    headers.push(("X-Auth-Key".to_string(), auth.api_key().to_string()));
    headers.push(("X-Auth-Email".to_string(), auth.account_email().to_string()));
    Ok(TransportRequest {
        method: http.method,
        url,
        headers,
        body,
    })
}

fn build_operation_url(base_url: &str, auth: &Credentials, http: &HttpOptions) -> Result<Url, Error> {
    let joined = format!(
        "{}/accounts/{}/{}/{}",
        base_url.trim_end_matches('/'),
        auth.account_id(),
        KV_API_PATH,
        http.path
    );
    let mut url = Url::parse(&joined).map_err(|err| {
        Error::new(ErrorKind::Transport)
            .with_message("failed to construct request url")
            .with_source(err)
    })?;
    if let Some(params) = http.params.as_ref().filter(|params| !params.is_empty()) {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in params {
            pairs.append_pair(key, value);
        }
    }
    Ok(url)
}

fn encode_body(http: &HttpOptions) -> Result<(Option<Vec<u8>>, Option<String>), Error> {
    match http.content_type {
        ContentType::Json => {
            let Some(body) = &http.body else {
                return Err(Error::new(ErrorKind::EmptyBody)
                    .with_message("json content type requires a request body"));
            };
            Ok((
                Some(encode_json(body)?.into_bytes()),
                Some("application/json".to_string()),
            ))
        }
        ContentType::PlainText => Ok((
            encode_optional_json(http.body.as_ref())?,
            Some("text/plain".to_string()),
        )),
        ContentType::FormData => {
            let Some(body) = &http.body else {
                return Err(Error::new(ErrorKind::InvalidBodyShape)
                    .with_message("form data requires a flat key/value object body"));
            };
            let (bytes, boundary) = encode_form_data(body)?;
            Ok((
                Some(bytes),
                Some(format!("multipart/form-data; boundary={boundary}")),
            ))
        }
        ContentType::None => Ok((encode_optional_json(http.body.as_ref())?, None)),
    }
}

fn encode_optional_json(body: Option<&Value>) -> Result<Option<Vec<u8>>, Error> {
    match body {
        Some(body) => Ok(Some(encode_json(body)?.into_bytes())),
        None => Ok(None),
    }
}

fn encode_json(body: &Value) -> Result<String, Error> {
    serde_json::to_string(body).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode request json")
            .with_source(err)
    })
}

fn encode_form_data(body: &Value) -> Result<(Vec<u8>, String), Error> {
    let Value::Object(fields) = body else {
        return Err(Error::new(ErrorKind::InvalidBodyShape)
            .with_message("form data requires a flat key/value object body"));
    };
    let boundary = form_boundary()?;
    let mut out = Vec::new();
    for (key, value) in fields {
        let rendered = match value {
            Value::String(text) => text.clone(),
            Value::Number(_) | Value::Bool(_) => value.to_string(),
            _ => {
                return Err(Error::new(ErrorKind::InvalidBodyShape)
                    .with_message("form data fields must be scalar values"));
            }
        };
        let mut part = String::new();
        let _ = write!(
            part,
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{key}\"\r\n\r\n{rendered}\r\n"
        );
        out.extend_from_slice(part.as_bytes());
    }
    out.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    Ok((out, boundary))
}

fn form_boundary() -> Result<String, Error> {
    let mut raw = [0u8; 16];
    getrandom::fill(&mut raw).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message(format!("failed to source form boundary entropy: {err}"))
    })?;
    let mut boundary = String::with_capacity(2 + raw.len() * 2);
    boundary.push_str("kv");
    for byte in raw {
        let _ = write!(boundary, "{byte:02x}");
    }
    Ok(boundary)
}
