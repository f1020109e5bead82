//! Transport seam between the decoders and the network.
//!
//! Decoders only ever see a `ByteStream`, so tests can substitute any chunking
//! of the body without opening a socket.
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt as _;
use tracing::debug;

use crate::errors::{TaleError, TransportError};

/// Body of an open HTTP response, read lazily.
pub type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<Bytes, TransportError>> + Send + 'static>>;

pub const CONTENT_TYPE_JSON: &str = "application/json";

/// A POST request with a JSON body and bearer authorization.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamRequest {
    url: String,
    bearer_token: String,
    body: serde_json::Value,
}

impl StreamRequest {
    pub fn new(url: impl Into<String>, bearer_token: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            url: url.into(),
            bearer_token: bearer_token.into(),
            body,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Always `POST`; used as the request method by `ReqwestTransport`.
    pub fn method(&self) -> &'static str {
        "POST"
    }

    pub fn bearer_token(&self) -> &str {
        &self.bearer_token
    }

    pub fn body(&self) -> &serde_json::Value {
        &self.body
    }

    /// Header pairs `ReqwestTransport` sends with the request.
    pub fn headers(&self) -> [(&'static str, String); 2] {
        [
            ("Authorization", format!("Bearer {}", self.bearer_token)),
            ("Content-Type", CONTENT_TYPE_JSON.to_string()),
        ]
    }
}

/// Response head plus the still-open body.
pub struct TransportResponse {
    pub status: u16,
    pub body: ByteStream,
}

impl TransportResponse {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    /// Drains the body into a string for error reporting.
    pub async fn text_lossy(mut self) -> String {
        let mut out = Vec::new();
        while let Some(chunk) = self.body.next().await {
            match chunk {
                Ok(bytes) => out.extend_from_slice(&bytes),
                Err(_) => return "<unreadable body>".to_string(),
            }
        }
        String::from_utf8_lossy(&out).into_owned()
    }
}

/// Capability to POST a request and receive its body as a byte stream.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &StreamRequest) -> Result<TransportResponse, TransportError>;
}

/// `Transport` backed by a shared `reqwest::Client`.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, TaleError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TaleError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &StreamRequest) -> Result<TransportResponse, TransportError> {
        debug!(url = %request.url(), "sending streaming request");
        let method = reqwest::Method::from_bytes(request.method().as_bytes())
            .map_err(|e| TransportError::Request(e.to_string()))?;
        let body = serde_json::to_vec(request.body())
            .map_err(|e| TransportError::Request(format!("encode request body: {e}")))?;
        let mut builder = self.client.request(method, request.url());
        for (name, value) in request.headers() {
            builder = builder.header(name, value);
        }
        let response = builder
            .body(body)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| TransportError::Read(e.to_string())));
        Ok(TransportResponse {
            status,
            body: Box::pin(body),
        })
    }
}
