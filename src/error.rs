//! Error taxonomy for dispatched requests.

use std::fmt;
use std::time::Duration;

use reqwest::Method;

/// Unified error type for everything a dispatched request can fail with.
///
/// Rate-limit responses (429) never surface here; the bucket handler absorbs
/// them and replays the request. What does surface:
///
/// - [`RestError::Api`] for 4xx responses carrying a server error body,
/// - [`RestError::Http`] for 5xx responses once retries are exhausted,
/// - [`RestError::Timeout`] for aborted calls once retries are exhausted,
/// - [`RestError::Transport`] for connection-level failures,
/// - [`RestError::MissingToken`] before any request is sent, when assembly
///   needs a credential that was never provided,
/// - [`RestError::Decode`] for bodies that claim JSON but are not.
#[derive(Debug)]
pub enum RestError {
    /// The API rejected the request (4xx other than 429).
    Api { message: String, code: u64, status: u16, method: Method, url: String },
    /// The server failed (5xx) on every allowed attempt.
    Http { status: u16, status_text: String, method: Method, url: String },
    /// Every allowed attempt exceeded the request timeout.
    Timeout { timeout: Duration, method: Method, url: String },
    /// An authenticated request was assembled with no token configured.
    MissingToken,
    /// The transport failed below HTTP (DNS, connect, read).
    Transport(Box<dyn std::error::Error + Send + Sync>),
    /// A JSON body could not be decoded.
    Decode(serde_json::Error),
}

impl fmt::Display for RestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Api { message, code, status, method, url } => {
                write!(f, "api error {code} ({status} on {method} {url}): {message}")
            }
            Self::Http { status, status_text, method, url } => {
                write!(f, "http error {status} {status_text} ({method} {url})")
            }
            Self::Timeout { timeout, method, url } => {
                write!(f, "request timed out after {timeout:?} ({method} {url})")
            }
            Self::MissingToken => {
                write!(f, "request requires authorization but no token is set")
            }
            Self::Transport(e) => write!(f, "transport error: {e}"),
            Self::Decode(e) => write!(f, "failed to decode response body: {e}"),
        }
    }
}

impl std::error::Error for RestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e.as_ref()),
            Self::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for RestError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(Box::new(e))
    }
}

impl From<serde_json::Error> for RestError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e)
    }
}

impl RestError {
    /// Check if this is a server-supplied API error.
    pub fn is_api(&self) -> bool {
        matches!(self, Self::Api { .. })
    }

    /// Check if this is a 5xx failure after retries.
    pub fn is_http(&self) -> bool {
        matches!(self, Self::Http { .. })
    }

    /// Check if this is a timeout after retries.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Check if this is a missing-credential configuration error.
    pub fn is_missing_token(&self) -> bool {
        matches!(self, Self::MissingToken)
    }

    /// The server's numeric error code, for API errors.
    pub fn api_code(&self) -> Option<u64> {
        match self {
            Self::Api { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// The HTTP status, for API and HTTP errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } | Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}
