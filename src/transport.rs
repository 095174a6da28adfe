//! HTTP transport seam.
//!
//! [`HttpTransport`] is the single operation the dispatcher needs from HTTP:
//! issue one assembled request, get back status, headers, and body bytes.
//! [`ReqwestTransport`] is the production implementation over one shared
//! `reqwest::Client` (its pool keeps connections alive across every bucket);
//! [`ReplayTransport`] replays a script for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use crate::error::RestError;
use crate::request::{AssembledRequest, RequestBody};

/// A received HTTP response in transport-neutral form.
#[derive(Debug, Clone, Default)]
pub struct WireResponse {
    pub status: u16,
    headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl WireResponse {
    pub fn new(status: u16) -> Self {
        Self { status, headers: HashMap::new(), body: Vec::new() }
    }

    /// Convenience constructor for a JSON response.
    pub fn json(status: u16, value: serde_json::Value) -> Self {
        Self::new(status)
            .header("content-type", "application/json")
            .with_body(value.to_string().into_bytes())
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Case-insensitive header lookup.
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Canonical reason phrase for the status code.
    pub fn status_text(&self) -> &'static str {
        StatusCode::from_u16(self.status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("Unknown")
    }
}

/// Issues one request and returns the raw response.
///
/// Implementations decide nothing about rate limits or retries; the bucket
/// handler owns all of that. They must keep connections alive across calls.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: &AssembledRequest) -> Result<WireResponse, RestError>;
}

/// Production transport over a shared keep-alive `reqwest::Client`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self { client: Client::new() }
    }

    /// Use a caller-configured client (proxies, custom TLS).
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &AssembledRequest) -> Result<WireResponse, RestError> {
        let mut builder = self.client.request(request.method.clone(), &request.url);

        for (name, value) in request.headers() {
            match (
                reqwest::header::HeaderName::try_from(name),
                reqwest::header::HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => builder = builder.header(name, value),
                _ => tracing::warn!(header = name, "dropping malformed request header"),
            }
        }

        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(json) => builder.body(json.clone()),
            RequestBody::Multipart(parts) => {
                let mut form = reqwest::multipart::Form::new();
                for part in parts {
                    let mut piece = reqwest::multipart::Part::bytes(part.bytes.clone());
                    if let Some(filename) = &part.filename {
                        piece = piece.file_name(filename.clone());
                    }
                    form = form.part(part.name.clone(), piece);
                }
                builder.multipart(form)
            }
        };

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str().to_ascii_lowercase(), value.to_string());
            }
        }
        let body = response.bytes().await?.to_vec();

        Ok(WireResponse { status, headers, body })
    }
}

/// One scripted transport outcome.
#[derive(Debug, Clone)]
pub enum ReplayItem {
    /// Return this response immediately.
    Respond(WireResponse),
    /// Wait, then return this response. Waiting longer than the configured
    /// request timeout exercises the abort path.
    Delay(Duration, WireResponse),
    /// Fail at the transport level with this message.
    Fail(String),
}

/// Test transport that pops scripted outcomes in order and records every
/// request it was asked to send.
#[derive(Debug, Default)]
pub struct ReplayTransport {
    script: Mutex<VecDeque<ReplayItem>>,
    seen: Mutex<Vec<AssembledRequest>>,
}

impl ReplayTransport {
    pub fn new(script: Vec<ReplayItem>) -> Self {
        Self { script: Mutex::new(script.into()), seen: Mutex::new(Vec::new()) }
    }

    /// Append another outcome to the script.
    pub fn push(&self, item: ReplayItem) {
        self.script.lock().unwrap().push_back(item);
    }

    /// Every request sent so far, in order.
    pub fn requests(&self) -> Vec<AssembledRequest> {
        self.seen.lock().unwrap().clone()
    }

    /// Scripted outcomes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpTransport for ReplayTransport {
    async fn send(&self, request: &AssembledRequest) -> Result<WireResponse, RestError> {
        self.seen.lock().unwrap().push(request.clone());
        let item = self.script.lock().unwrap().pop_front();
        match item {
            Some(ReplayItem::Respond(response)) => Ok(response),
            Some(ReplayItem::Delay(duration, response)) => {
                tokio::time::sleep(duration).await;
                Ok(response)
            }
            Some(ReplayItem::Fail(message)) => {
                Err(RestError::Transport(Box::new(std::io::Error::other(message))))
            }
            None => Err(RestError::Transport(Box::new(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "replay script exhausted",
            )))),
        }
    }
}
