//! XRPC request handlers.

use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocketUpgrade},
        Path, RawQuery, Request, State,
    },
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use futures::{Sink, SinkExt, StreamExt};
use lexrpc::{
    is_json_encoding, is_valid_nsid, parse_query, DefType, LexError, Payload, Server,
    Subscription, XrpcError,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// State shared across handlers.
pub struct XrpcState {
    pub server: Server,
    /// Added to every response.
    pub headers: Vec<(HeaderName, HeaderValue)>,
}

/// `{"error": name, "message": message}` with the given status.
fn error_response(status: StatusCode, name: &str, message: &str) -> Response {
    (status, Json(json!({"error": name, "message": message}))).into_response()
}

/// Map a dispatch error onto its HTTP response.
pub fn lex_error_response(nsid: &str, err: &LexError) -> Response {
    if let LexError::Handler(XrpcError {
        redirect: Some(location),
        ..
    }) = err
    {
        debug!("{} redirecting to {}", nsid, location);
        return match HeaderValue::from_str(location) {
            Ok(location) => (StatusCode::FOUND, [(header::LOCATION, location)]).into_response(),
            Err(_) => error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                &format!("Invalid redirect location {location}"),
            ),
        };
    }

    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() && status != StatusCode::NOT_IMPLEMENTED {
        error!("XRPC error for {}: {}", nsid, err);
    } else {
        warn!("XRPC error for {}: {}", nsid, err);
    }

    error_response(status, &err.error_name(), &err.to_string())
}

/// Decode a request body by the method's declared input encoding.
///
/// JSON (or undeclared) input is parsed; anything else is passed through
/// as raw bytes tagged with the request's `Content-Type`.
fn decode_input(
    server: &Server,
    nsid: &str,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Option<Payload>, Response> {
    if body.is_empty() {
        return Ok(None);
    }

    let declared = server
        .registry()
        .get(nsid)
        .ok()
        .and_then(|def| def.input.as_ref())
        .and_then(|input| input.encoding.clone());

    match declared {
        Some(declared) if !is_json_encoding(&declared) => {
            let encoding = headers
                .get(header::CONTENT_TYPE)
                .and_then(|ct| ct.to_str().ok())
                .map_or(declared, str::to_string);
            Ok(Some(Payload::bytes(encoding, body.to_vec())))
        }
        _ => serde_json::from_slice::<Value>(&body)
            .map(|input| Some(Payload::Json(input)))
            .map_err(|e| {
                error_response(
                    StatusCode::BAD_REQUEST,
                    "InvalidRequest",
                    &format!("Couldn't decode {nsid} input as JSON: {e}"),
                )
            }),
    }
}

/// 200 with a JSON body, or raw bytes under their own content type.
fn output_response(output: Payload) -> Response {
    match output {
        Payload::Json(output) => (StatusCode::OK, Json(output)).into_response(),
        Payload::Bytes { encoding, data } => {
            let content_type = HeaderValue::try_from(encoding)
                .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
            (StatusCode::OK, [(header::CONTENT_TYPE, content_type)], data).into_response()
        }
    }
}

/// Handle GET and POST `/xrpc/{nsid}`, including websocket upgrades for
/// subscriptions.
pub async fn handle_xrpc(
    State(state): State<Arc<XrpcState>>,
    Path(nsid): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    ws: Option<WebSocketUpgrade>,
    body: Bytes,
) -> Response {
    if !is_valid_nsid(&nsid) {
        return lex_error_response(&nsid, &LexError::InvalidNsid(nsid.clone()));
    }

    let params = parse_query(query.as_deref().unwrap_or_default());
    debug!("XRPC call: {}({:?})", nsid, params);

    let is_subscription = state
        .server
        .registry()
        .get(&nsid)
        .is_ok_and(|def| def.def_type == DefType::Subscription);

    if is_subscription {
        let Some(ws) = ws else {
            return error_response(
                StatusCode::METHOD_NOT_ALLOWED,
                "InvalidRequest",
                &format!("Use websocket for {nsid}, not HTTP"),
            );
        };

        return match state.server.subscribe_raw(&nsid, params) {
            Ok(messages) => ws.on_upgrade(move |socket| async move {
                forward_messages(socket, &nsid, messages).await;
            }),
            Err(e) => lex_error_response(&nsid, &e),
        };
    }

    let input = match decode_input(&state.server, &nsid, &headers, body) {
        Ok(input) => input,
        Err(response) => return response,
    };

    match state.server.call_raw(&nsid, params, input).await {
        Ok(Some(output)) => output_response(output),
        Ok(None) => StatusCode::OK.into_response(),
        Err(e) => lex_error_response(&nsid, &e),
    }
}

/// Plain OPTIONS requests get an empty 200. CORS headers come from the
/// router's `CorsLayer`.
pub async fn handle_options() -> StatusCode {
    StatusCode::OK
}

/// Send each subscription message as a JSON text frame.
///
/// A handler or validation error is sent as a final
/// `{"error": ..., "message": ...}` frame. Stops quietly when the client
/// goes away.
pub async fn forward_messages<S>(sink: S, nsid: &str, mut messages: Subscription)
where
    S: Sink<Message>,
{
    let mut sink = std::pin::pin!(sink);
    while let Some(message) = messages.next().await {
        let (frame, last) = match message {
            Ok(value) => (value.to_string(), false),
            Err(e) => {
                warn!("Subscription {} failed: {}", nsid, e);
                let frame = json!({"error": e.error_name(), "message": e.to_string()});
                (frame.to_string(), true)
            }
        };

        if sink.send(Message::Text(frame)).await.is_err() {
            debug!("Subscriber to {} disconnected", nsid);
            return;
        }
        if last {
            break;
        }
    }

    debug!("Subscription {} finished", nsid);
    let _ = sink.send(Message::Close(None)).await;
}

/// Add the configured extra headers to every response.
pub async fn add_headers(
    State(state): State<Arc<XrpcState>>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    for (name, value) in &state.headers {
        response.headers_mut().insert(name.clone(), value.clone());
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc;
    use futures::stream;
    use lexrpc::testing::example_server;
    use serde_json::Map;

    async fn frames(messages: Subscription) -> Vec<Message> {
        let (tx, rx) = mpsc::unbounded();
        forward_messages(tx, "io.example.subscribe", messages).await;
        rx.collect().await
    }

    fn text(message: &Message) -> Value {
        match message {
            Message::Text(text) => serde_json::from_str(text).unwrap(),
            other => panic!("Expected text frame, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_forward_messages() {
        let server = example_server().unwrap();
        let messages = server
            .subscribe_raw("io.example.subscribe", [("start", "3"), ("end", "6")])
            .unwrap();

        let sent = frames(messages).await;
        assert_eq!(sent.len(), 4);
        assert_eq!(text(&sent[0]), json!({"num": 3}));
        assert_eq!(text(&sent[1]), json!({"num": 4}));
        assert_eq!(text(&sent[2]), json!({"num": 5}));
        assert!(matches!(sent[3], Message::Close(None)));
    }

    #[tokio::test]
    async fn test_forward_messages_error_frame() {
        let messages: Subscription = stream::iter(vec![
            Ok(json!({"num": 1})),
            Err(LexError::from(XrpcError::named("Unhappy", "bye"))),
            Ok(json!({"num": 2})),
        ])
        .boxed();

        let sent = frames(messages).await;
        assert_eq!(sent.len(), 3);
        assert_eq!(
            text(&sent[1]),
            json!({"error": "Unhappy", "message": "bye"})
        );
        assert!(matches!(sent[2], Message::Close(None)));
    }

    #[tokio::test]
    async fn test_forward_messages_client_gone() {
        let (tx, rx) = mpsc::unbounded();
        drop(rx);

        let server = example_server().unwrap();
        let mut params = Map::new();
        params.insert("start".into(), json!(0));
        params.insert("end".into(), json!(100));
        let messages = server.subscribe("io.example.subscribe", params).unwrap();

        // Returns instead of looping over every message
        forward_messages(tx, "io.example.subscribe", messages).await;
    }

    #[test]
    fn test_decode_input() {
        let server = example_server().unwrap();
        let mut headers = HeaderMap::new();

        let input = decode_input(
            &server,
            "io.example.encodings",
            &headers,
            Bytes::from_static(&[0xd5, 0x9e]),
        )
        .unwrap();
        assert_eq!(input, Some(Payload::bytes("number/int", vec![0xd5, 0x9e])));

        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("number/big"));
        let input = decode_input(&server, "io.example.encodings", &headers, Bytes::from_static(b"x"))
            .unwrap();
        assert_eq!(input, Some(Payload::bytes("number/big", b"x".to_vec())));

        let input = decode_input(
            &server,
            "io.example.procedure",
            &HeaderMap::new(),
            Bytes::from_static(br#"{"foo": "x"}"#),
        )
        .unwrap();
        assert_eq!(input, Some(Payload::Json(json!({"foo": "x"}))));

        let response = decode_input(
            &server,
            "io.example.procedure",
            &HeaderMap::new(),
            Bytes::from_static(&[0xd5, 0x9e]),
        )
        .unwrap_err();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        assert_eq!(
            decode_input(&server, "io.example.procedure", &HeaderMap::new(), Bytes::new()).unwrap(),
            None
        );
    }

    #[test]
    fn test_bytes_output_response() {
        let response = output_response(Payload::bytes("number/int", vec![1, 2]));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "number/int");
    }

    #[test]
    fn test_error_responses() {
        let response = lex_error_response(
            "io.unknown",
            &LexError::NotFound {
                nsid: "io.unknown".into(),
            },
        );
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);

        let response =
            lex_error_response("io.example.redirect", &XrpcError::redirect("http://to/here").into());
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "http://to/here");

        let response = lex_error_response(
            "io.example.query",
            &LexError::Transport {
                message: "down".into(),
                status: None,
            },
        );
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
