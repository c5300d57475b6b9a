//! lexrpc - Lexicon-based XRPC client and server.
//!
//! [Lexicons](https://atproto.com/specs/lexicon) are JSON documents that
//! declare namespaced methods (queries, procedures and subscriptions) with
//! typed parameters, input, output and messages. This crate loads them into
//! a [`Registry`], validates call data against them, encodes and decodes
//! query parameters, and dispatches calls:
//!
//! - [`Client`] calls methods on a remote XRPC server through a [`Transport`]
//! - [`Server`] runs locally registered handlers
//!
//! HTTP serving lives in the `lexrpc-server` crate.
//!
//! # Example
//!
//! ```rust,ignore
//! use lexrpc::{Server, XrpcError};
//! use serde_json::json;
//!
//! let server = Server::builder()
//!     .lexicons(lexrpc::load_dir("lexicons")?)
//!     .method("io.example.ping", |params, _input| async move {
//!         Ok(Some(json!({"message": params.get("message")})))
//!     })
//!     .build()?;
//!
//! let output = server.call("io.example.ping", Default::default(), None).await?;
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod lexicon;
pub mod nsid;
pub mod params;
pub mod payload;
pub mod server;
pub mod validate;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::{
    Client, ClientBuilder, HttpMethod, HttpTransport, NsidBuilder, Transport, TransportRequest,
    TransportResponse,
};
pub use config::{NetworkConfig, Options, ServerOptions, XrpcConfig};
pub use error::{LexError, Result, XrpcError};
pub use lexicon::{
    bundled_documents, load_dir, load_file, Body, DefType, Definition, Registry, Schema,
};
pub use nsid::{is_valid_nsid, is_valid_segment, Nsid};
pub use params::{decode_params, encode_params, parse_query};
pub use payload::{is_json_encoding, Payload};
pub use server::{
    HandlerResult, MessageStream, PayloadResult, Server, ServerBuilder, Subscription,
};
pub use validate::{truncate_graphemes, Slot, Validator};
