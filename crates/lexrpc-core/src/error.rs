//! Error types for lexrpc.
//!
//! Every failure in the registry, validator, codec and dispatchers is one of
//! these variants. The HTTP adapter maps them onto status codes and XRPC
//! error names with [`LexError::http_status`] and [`LexError::error_name`].

use crate::validate::Slot;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for lexrpc.
#[derive(Debug, Error)]
pub enum LexError {
    // Lexicon loading errors
    #[error("{0}")]
    MalformedLexicon(String),

    // Dispatch errors
    #[error("{nsid} not found")]
    NotFound { nsid: String },

    #[error("{nsid} is a {def_type}, not a query, procedure or subscription")]
    NotAMethod { nsid: String, def_type: String },

    #[error("Server has no registered methods")]
    NoMethods,

    #[error("{0} is not a valid NSID")]
    InvalidNsid(String),

    // Data errors
    #[error("{nsid} {slot}: {message}")]
    Validation {
        nsid: String,
        slot: Slot,
        message: String,
    },

    #[error("{message}")]
    Decoding { param: String, message: String },

    // Collaborator errors
    #[error("Transport error: {message}")]
    Transport { message: String, status: Option<u16> },

    #[error(transparent)]
    Handler(#[from] XrpcError),

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },
}

/// Result type alias for lexrpc operations.
pub type Result<T> = std::result::Result<T, LexError>;

/// A named error raised by a method handler.
///
/// `name` is the lexicon-declared error, eg `RepoNotFound` for
/// `com.atproto.sync.getRepo`. `message` is human readable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XrpcError {
    pub name: Option<String>,
    pub message: String,
    /// Set when the handler wants the caller sent elsewhere (HTTP 302).
    pub redirect: Option<String>,
}

impl XrpcError {
    /// An unnamed error, reported as `InvalidRequest`.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            name: None,
            message: message.into(),
            redirect: None,
        }
    }

    /// An error with a lexicon-declared name.
    pub fn named(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            message: message.into(),
            redirect: None,
        }
    }

    /// Redirect the caller to `location` instead of returning output.
    pub fn redirect(location: impl Into<String>) -> Self {
        let location = location.into();
        Self {
            name: None,
            message: format!("Redirect to {location}"),
            redirect: Some(location),
        }
    }
}

impl fmt::Display for XrpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for XrpcError {}

impl From<std::io::Error> for LexError {
    fn from(err: std::io::Error) -> Self {
        LexError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for LexError {
    fn from(err: serde_json::Error) -> Self {
        LexError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for LexError {
    fn from(err: reqwest::Error) -> Self {
        LexError::Transport {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

impl LexError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        LexError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create a validation error for a slot of a definition.
    pub fn validation(nsid: impl Into<String>, slot: Slot, message: impl Into<String>) -> Self {
        LexError::Validation {
            nsid: nsid.into(),
            slot,
            message: message.into(),
        }
    }

    /// HTTP status code an XRPC server answers with for this error.
    ///
    /// - 400: invalid identifier, parameters, input or output, handler errors
    /// - 501: unknown method
    /// - 502: upstream transport failure
    /// - 500: everything else
    pub fn http_status(&self) -> u16 {
        match self {
            LexError::NotFound { .. } | LexError::NotAMethod { .. } | LexError::NoMethods => 501,

            LexError::InvalidNsid(_)
            | LexError::Validation { .. }
            | LexError::Decoding { .. }
            | LexError::Handler(_) => 400,

            LexError::Transport { .. } => 502,

            _ => 500,
        }
    }

    /// XRPC error name for the `error` field of an error response body.
    pub fn error_name(&self) -> String {
        match self {
            LexError::Handler(XrpcError {
                name: Some(name), ..
            }) => name.clone(),
            _ => match self.http_status() {
                400 => "InvalidRequest".to_string(),
                501 => "MethodNotImplemented".to_string(),
                502 => "UpstreamFailure".to_string(),
                _ => "InternalServerError".to_string(),
            },
        }
    }

    /// Whether this error means the method isn't available at all.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            LexError::NotFound { .. } | LexError::NotAMethod { .. } | LexError::NoMethods
        )
    }
}
