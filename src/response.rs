//! Response body decoding.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::RestError;

/// Decoded body of a completed request.
///
/// JSON responses (any `Content-Type` beginning with `application/json`)
/// decode into [`ResponseBody::Json`]; everything else, including responses
/// with no content type at all, comes back as raw bytes. [`ResponseBody::None`]
/// marks status classes the dispatcher has nothing to return for (1xx/3xx).
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Binary(Vec<u8>),
    None,
}

impl ResponseBody {
    /// Decode `body` according to `content_type`.
    pub fn parse(content_type: Option<&str>, body: &[u8]) -> Result<Self, RestError> {
        match content_type {
            Some(ct) if ct.starts_with("application/json") => {
                Ok(Self::Json(serde_json::from_slice(body)?))
            }
            _ => Ok(Self::Binary(body.to_vec())),
        }
    }

    /// The decoded JSON value, if this body was JSON.
    pub fn json(&self) -> Option<&Value> {
        match self {
            Self::Json(v) => Some(v),
            _ => None,
        }
    }

    /// The raw bytes, if this body was not JSON.
    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// Extract a typed model from a JSON body.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, RestError> {
        match self {
            Self::Json(v) => Ok(serde_json::from_value(v.clone())?),
            Self::Binary(b) => Ok(serde_json::from_slice(b)?),
            Self::None => Err(RestError::Decode(serde::de::Error::custom(
                "response carried no body",
            ))),
        }
    }
}
