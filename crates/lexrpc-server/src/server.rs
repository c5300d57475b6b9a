//! HTTP server implementation using Axum.

use crate::handler::{add_headers, handle_options, handle_xrpc, XrpcState};
use anyhow::Context;
use axum::{
    http::{HeaderName, HeaderValue},
    middleware,
    routing::get,
    Router,
};
use lexrpc::{Server, XrpcConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Build the router serving `server`'s methods at `/xrpc/{nsid}`.
///
/// Every response carries the server's extra headers.
pub fn xrpc_router(server: Server) -> anyhow::Result<Router> {
    let headers = server
        .headers()
        .iter()
        .map(|(name, value)| -> anyhow::Result<(HeaderName, HeaderValue)> {
            Ok((
                HeaderName::try_from(name.as_str())
                    .with_context(|| format!("Invalid header name {name}"))?,
                HeaderValue::try_from(value.as_str())
                    .with_context(|| format!("Invalid value for header {name}"))?,
            ))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let state = Arc::new(XrpcState { server, headers });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let router = Router::new()
        .route(
            &format!("{}/:nsid", XrpcConfig::PATH_PREFIX),
            get(handle_xrpc).post(handle_xrpc).options(handle_options),
        )
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn_with_state(state.clone(), add_headers))
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state);

    Ok(router)
}

/// Start the XRPC HTTP server.
///
/// Returns the actual address the server is bound to (useful when port=0).
pub async fn start_server(server: Server, host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    let app = xrpc_router(server)?;

    // Parse the address
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;

    // Bind to the address
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("XRPC server listening on {}", actual_addr);

    // Spawn the server in the background
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Server error: {}", e);
        }
    });

    Ok(actual_addr)
}
