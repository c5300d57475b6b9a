//! HTTP transport for the XRPC client.
//!
//! The [`Transport`] trait is the seam between the client dispatcher and the
//! network. [`HttpTransport`] is the default, built on reqwest; tests swap in
//! a recording fake.

use crate::config::{NetworkConfig, XrpcConfig};
use crate::error::{LexError, Result};
use crate::payload::is_json_encoding;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Read-style (GET) or write-style (POST) request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// An outbound XRPC request.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub method: HttpMethod,
    /// Full URL, including the encoded query string.
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// JSON body, for write-style requests.
    pub body: Option<Value>,
}

/// A successful response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl TransportResponse {
    /// A 200 response with a JSON body.
    pub fn json(body: &Value) -> Self {
        Self {
            status: 200,
            headers: vec![(
                "Content-Type".to_string(),
                XrpcConfig::JSON_CONTENT_TYPE.to_string(),
            )],
            body: body.to_string().into_bytes(),
        }
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether the body is declared to be JSON.
    pub fn is_json(&self) -> bool {
        self.header("Content-Type").is_some_and(is_json_encoding)
    }
}

/// Executes XRPC requests.
///
/// Implementations fail with [`LexError::Transport`] on connection errors
/// and non-success status codes.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse>;
}

/// reqwest-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Create a transport with the default timeout.
    pub fn new() -> Result<Self> {
        Self::with_timeout(NetworkConfig::REQUEST_TIMEOUT)
    }

    /// Create a transport with a custom request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(NetworkConfig::USER_AGENT)
            .build()
            .map_err(|e| LexError::Config {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client })
    }

    /// Wrap an existing reqwest client.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.to_string());
        }

        let response = builder.send().await.map_err(|e| LexError::Transport {
            message: format!("{:?} {} failed: {}", request.method, request.url, e),
            status: None,
        })?;

        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| Some((k.to_string(), v.to_str().ok()?.to_string())))
            .collect();
        let body = response.bytes().await?.to_vec();

        debug!("{} returned {}", request.url, status);

        let response = TransportResponse {
            status: status.as_u16(),
            headers,
            body,
        };

        if !status.is_success() {
            let message = error_message(&response)
                .unwrap_or_else(|| format!("HTTP {} from {}", status, request.url));
            warn!("XRPC call to {} failed: {}", request.url, message);
            return Err(LexError::Transport {
                message,
                status: Some(status.as_u16()),
            });
        }

        Ok(response)
    }
}

/// `"{error}: {message}"` from an XRPC error response body, if it has one.
fn error_message(response: &TransportResponse) -> Option<String> {
    let body: Value = serde_json::from_slice(&response.body).ok()?;
    let message = body.get("message").and_then(Value::as_str);
    match (body.get("error").and_then(Value::as_str), message) {
        (Some(name), Some(message)) => Some(format!("{name}: {message}")),
        (Some(name), None) => Some(name.to_string()),
        (None, Some(message)) => Some(message.to_string()),
        (None, None) => None,
    }
}
