//! Centralized configuration for lexrpc.
//!
//! Constants for the XRPC wire conventions and the HTTP transport, plus the
//! construction-time options shared by clients and servers.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// XRPC wire conventions.
pub struct XrpcConfig;

impl XrpcConfig {
    /// Path prefix every method is served under: `/xrpc/{nsid}`.
    pub const PATH_PREFIX: &'static str = "/xrpc";
    pub const JSON_CONTENT_TYPE: &'static str = "application/json";
    /// Appended to strings shortened by truncation.
    pub const ELLIPSIS: char = '…';
}

/// Network-related configuration for the default HTTP transport.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
    pub const USER_AGENT: &'static str = concat!("lexrpc/", env!("CARGO_PKG_VERSION"));
}

/// Validation behaviour for a client or server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Check parameters, input, output and messages against their schemas.
    pub validate: bool,
    /// Shorten strings longer than their `maxGraphemes` instead of rejecting them.
    pub truncate: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            validate: true,
            truncate: false,
        }
    }
}

/// Server construction options, applied with `ServerBuilder::server_options`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerOptions {
    #[serde(flatten)]
    pub options: Options,
    /// Extra headers added to every HTTP response.
    pub headers: Vec<(String, String)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = Options::default();
        assert!(options.validate);
        assert!(!options.truncate);
    }

    #[test]
    fn test_deserialize_server_options() {
        let options: ServerOptions = serde_json::from_str(
            r#"{"truncate": true, "headers": [["X-Served-By", "lexrpc"]]}"#,
        )
        .unwrap();
        assert!(options.options.validate);
        assert!(options.options.truncate);
        assert_eq!(
            options.headers,
            vec![("X-Served-By".to_string(), "lexrpc".to_string())]
        );
    }
}
