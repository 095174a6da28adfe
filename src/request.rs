//! Logical requests and their assembly into wire-ready form.
//!
//! [`Request`] is what callers hand to the manager: method, endpoint, query
//! pairs, optional JSON payload, file attachments, audit reason. `assemble`
//! turns one into an [`AssembledRequest`] — final URL, merged headers, and a
//! selected body — applying the header precedence rule: caller headers first,
//! then body headers, then the mandatory set, so nothing can override
//! `User-Agent`, `Authorization`, or the rate-limit precision header.

use std::collections::HashMap;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::Method;
use serde_json::Value;
use url::form_urlencoded;

use crate::error::RestError;
use crate::options::RestOptions;

/// Matches JavaScript's `encodeURIComponent` unreserved set.
const REASON_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'!')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// A named file to upload as one multipart part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttachment {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// A logical API request, before URL templating and header assembly.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub endpoint: String,
    query: Vec<(String, Option<String>)>,
    headers: Vec<(String, String)>,
    data: Option<Value>,
    files: Vec<FileAttachment>,
    auth: bool,
    reason: Option<String>,
}

impl Request {
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            query: Vec::new(),
            headers: Vec::new(),
            data: None,
            files: Vec::new(),
            auth: true,
            reason: None,
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(Method::GET, endpoint)
    }

    pub fn post(endpoint: impl Into<String>) -> Self {
        Self::new(Method::POST, endpoint)
    }

    pub fn patch(endpoint: impl Into<String>) -> Self {
        Self::new(Method::PATCH, endpoint)
    }

    pub fn put(endpoint: impl Into<String>) -> Self {
        Self::new(Method::PUT, endpoint)
    }

    pub fn delete(endpoint: impl Into<String>) -> Self {
        Self::new(Method::DELETE, endpoint)
    }

    /// Append a query pair. Pairs with a `None` value are dropped at
    /// assembly, which lets callers pass optional parameters through
    /// unconditionally.
    pub fn query(mut self, name: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        self.query.push((name.into(), value.map(Into::into)));
        self
    }

    /// Add a caller header. Mandatory headers still win on collision.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// JSON payload. Sent as the body, or as the `payload_json` multipart
    /// field when files are attached.
    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Attach a file; any file switches the body to multipart.
    pub fn file(mut self, name: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.files.push(FileAttachment { name: name.into(), bytes });
        self
    }

    /// Whether the request carries the bot Authorization header (default true).
    pub fn auth(mut self, auth: bool) -> Self {
        self.auth = auth;
        self
    }

    /// Audit-log reason, sent URL-encoded in `X-Audit-Log-Reason`.
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// One part of a multipart body. `payload_json` has no filename; file parts
/// reuse their field name as filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartPart {
    pub name: String,
    pub filename: Option<String>,
    pub bytes: Vec<u8>,
}

/// Body selected during assembly. The multipart boundary itself is attached
/// by the transport when it finalizes the form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Empty,
    Json(String),
    Multipart(Vec<MultipartPart>),
}

/// A request in wire-ready form: final URL, merged headers (lowercased
/// names), selected body.
#[derive(Debug, Clone)]
pub struct AssembledRequest {
    pub method: Method,
    pub url: String,
    headers: HashMap<String, String>,
    pub body: RequestBody,
}

impl AssembledRequest {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// All headers, names lowercased.
    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Assemble a logical request against the configured options and token.
///
/// Fails synchronously with [`RestError::MissingToken`] if the request wants
/// auth and no token is available.
pub fn assemble(
    request: &Request,
    options: &RestOptions,
    token: Option<&str>,
) -> Result<AssembledRequest, RestError> {
    let mut url = format!("{}/v{}{}", options.api_base, options.version, request.endpoint);
    let pairs: Vec<(&str, &str)> = request
        .query
        .iter()
        .filter_map(|(k, v)| v.as_deref().map(|v| (k.as_str(), v)))
        .collect();
    if !pairs.is_empty() {
        url.push('?');
        url.push_str(
            &form_urlencoded::Serializer::new(String::new()).extend_pairs(pairs).finish(),
        );
    }

    let mut headers: HashMap<String, String> = HashMap::new();
    for (name, value) in &request.headers {
        headers.insert(name.to_ascii_lowercase(), value.clone());
    }

    let body = if !request.files.is_empty() {
        let mut parts: Vec<MultipartPart> = request
            .files
            .iter()
            .map(|f| MultipartPart {
                name: f.name.clone(),
                filename: Some(f.name.clone()),
                bytes: f.bytes.clone(),
            })
            .collect();
        if let Some(data) = &request.data {
            parts.push(MultipartPart {
                name: "payload_json".to_string(),
                filename: None,
                bytes: serde_json::to_vec(data)?,
            });
        }
        RequestBody::Multipart(parts)
    } else if let Some(data) = &request.data {
        headers.insert("content-type".to_string(), "application/json".to_string());
        RequestBody::Json(serde_json::to_string(data)?)
    } else {
        RequestBody::Empty
    };

    // Mandatory headers go last so callers cannot override them.
    headers.insert(
        "user-agent".to_string(),
        format!(
            "DiscordBot ({}, {}) {}",
            env!("CARGO_PKG_REPOSITORY"),
            env!("CARGO_PKG_VERSION"),
            options.user_agent_appendix
        ),
    );
    headers.insert("x-ratelimit-precision".to_string(), "millisecond".to_string());
    if request.auth {
        match token {
            Some(token) => {
                headers.insert("authorization".to_string(), format!("Bot {token}"));
            }
            None => return Err(RestError::MissingToken),
        }
    }
    if let Some(reason) = &request.reason {
        headers.insert(
            "x-audit-log-reason".to_string(),
            utf8_percent_encode(reason, REASON_ENCODE_SET).to_string(),
        );
    }

    Ok(AssembledRequest { method: request.method.clone(), url, headers, body })
}
