//! lexrpc-server - serve lexrpc methods over HTTP with axum.
//!
//! Every method is served at `/xrpc/{nsid}`:
//! - queries and procedures accept GET and POST, with parameters in the
//!   query string and JSON input in the body
//! - subscriptions accept websocket upgrades and send each message as a JSON
//!   text frame
//!
//! Errors are returned as `{"error": name, "message": message}` with status
//! 400 for bad requests, 501 for unknown methods and 302 for redirects.
//! Methods declaring a non-JSON input or output encoding exchange raw
//! bodies instead.

mod handler;
mod server;

pub use handler::{forward_messages, lex_error_response, XrpcState};
pub use server::{start_server, xrpc_router};
