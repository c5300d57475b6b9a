//! Method input and output bodies.
//!
//! Most methods take and return JSON. A body slot may instead declare
//! another `encoding` (eg `image/jpeg`), in which case the body travels as
//! raw bytes and is never decoded.

use crate::config::XrpcConfig;
use serde_json::Value;

/// An input or output body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Bytes { encoding: String, data: Vec<u8> },
}

impl Payload {
    pub fn bytes(encoding: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Payload::Bytes {
            encoding: encoding.into(),
            data: data.into(),
        }
    }

    /// MIME type of the body.
    pub fn encoding(&self) -> &str {
        match self {
            Payload::Json(_) => XrpcConfig::JSON_CONTENT_TYPE,
            Payload::Bytes { encoding, .. } => encoding,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(value) => Some(value),
            Payload::Bytes { .. } => None,
        }
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Json(value)
    }
}

/// Whether `encoding` names JSON, ignoring parameters like `charset`.
pub fn is_json_encoding(encoding: &str) -> bool {
    encoding
        .split(';')
        .next()
        .is_some_and(|mime| mime.trim() == XrpcConfig::JSON_CONTENT_TYPE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encoding() {
        assert_eq!(Payload::from(json!({})).encoding(), "application/json");
        assert_eq!(Payload::bytes("number/int", vec![1]).encoding(), "number/int");
        assert!(Payload::bytes("number/int", vec![1]).as_json().is_none());
    }

    #[test]
    fn test_is_json_encoding() {
        assert!(is_json_encoding("application/json"));
        assert!(is_json_encoding("application/json; charset=utf-8"));
        assert!(!is_json_encoding("number/int"));
        assert!(!is_json_encoding("*/*"));
    }
}
