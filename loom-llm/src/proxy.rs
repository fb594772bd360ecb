//! Proxy request/response contract

use bytes::Bytes;
use futures_util::stream::BoxStream;
use reqwest::header::HeaderMap;
use thiserror::Error;

/// Byte stream of an upstream SSE response, returned without consuming it.
pub type ByteStream = BoxStream<'static, Result<Bytes, reqwest::Error>>;

/// A composed upstream request. The provider owns URL and auth; callers
/// supply only the JSON body and any extra headers to forward (inbound
/// `Host` is always stripped).
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub body: serde_json::Value,
    pub headers: HeaderMap,
}

impl ProxyRequest {
    pub fn new(body: serde_json::Value) -> Self {
        Self {
            body,
            headers: HeaderMap::new(),
        }
    }
}

/// An upstream response: status and headers plus one of three body shapes.
pub struct ProxyResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: ProxyBody,
}

/// Body of an upstream response, keyed by `Content-Type`.
pub enum ProxyBody {
    /// `application/json`, read to completion and parsed.
    Json(serde_json::Value),
    /// `text/event-stream`, handed back unconsumed.
    Stream(ByteStream),
    /// Anything else, read to completion as text.
    Text(String),
}

impl ProxyResponse {
    /// Whether the upstream replied with a streaming body.
    pub fn is_stream(&self) -> bool {
        matches!(self.body, ProxyBody::Stream(_))
    }
}

impl std::fmt::Debug for ProxyResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let body = match &self.body {
            ProxyBody::Json(_) => "Json",
            ProxyBody::Stream(_) => "Stream",
            ProxyBody::Text(_) => "Text",
        };
        f.debug_struct("ProxyResponse")
            .field("status", &self.status)
            .field("body", &body)
            .finish()
    }
}

/// Failure to reach the upstream at all. Non-2xx upstream statuses are NOT
/// errors - they pass through verbatim as a [`ProxyResponse`].
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    #[error("Upstream unavailable: {message}")]
    Unavailable { message: String },
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        Self::Unavailable {
            message: err.to_string(),
        }
    }
}
