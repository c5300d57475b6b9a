//! Integration tests for the XRPC HTTP adapter.
//!
//! Each test starts the example server on an ephemeral port and drives it
//! over HTTP with reqwest.

use futures::StreamExt;
use lexrpc::testing::{example_server, example_server_builder, EXAMPLE_BAR};
use lexrpc::{Client, Options, Server, ServerOptions};
use lexrpc_server::start_server;
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;

/// Start the example server and return its base URL.
async fn start() -> String {
    serve(example_server().unwrap()).await
}

async fn start_with(options: ServerOptions) -> String {
    serve(
        example_server_builder()
            .server_options(options)
            .build()
            .unwrap(),
    )
    .await
}

async fn serve(server: Server) -> String {
    let addr = start_server(server, "127.0.0.1", 0)
        .await
        .expect("Failed to start server");
    format!("http://{}", addr)
}

fn http() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(Policy::none())
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_procedure() {
    let base = start().await;
    let input = json!({"foo": "xyz", "bar": 3});

    let resp = http()
        .post(format!("{}/xrpc/io.example.procedure", base))
        .json(&input)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.json::<Value>().await.unwrap(), input);
}

#[tokio::test]
async fn test_query() {
    let base = start().await;

    let resp = http()
        .get(format!("{}/xrpc/io.example.query?x=y", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["Content-Type"], "application/json");
    assert_eq!(
        resp.json::<Value>().await.unwrap(),
        json!({"foo": "y", "bar": EXAMPLE_BAR})
    );
}

#[tokio::test]
async fn test_options() {
    let base = start().await;

    let resp = http()
        .request(
            reqwest::Method::OPTIONS,
            format!("{}/xrpc/io.example.query", base),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["Access-Control-Allow-Origin"], "*");
    assert_eq!(resp.text().await.unwrap(), "");
}

#[tokio::test]
async fn test_no_params_input_output() {
    let base = start().await;

    let resp = http()
        .post(format!("{}/xrpc/io.example.noParamsInputOutput", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "");
}

#[tokio::test]
async fn test_dashed_name() {
    let base = start().await;

    let resp = http()
        .post(format!("{}/xrpc/io.exa-mple.dashedName", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_not_nsid() {
    let base = start().await;

    let resp = http()
        .post(format!("{}/xrpc/not_an*nsid", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(resp.headers()["Content-Type"], "application/json");
    assert_eq!(
        resp.json::<Value>().await.unwrap(),
        json!({
            "error": "InvalidRequest",
            "message": "not_an*nsid is not a valid NSID",
        })
    );
}

#[tokio::test]
async fn test_query_boolean_param() {
    let base = start().await;

    let resp = http()
        .get(format!("{}/xrpc/io.example.query?x=&z=false", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = http()
        .get(format!("{}/xrpc/io.example.query?z=foolz", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        resp.json::<Value>().await.unwrap(),
        json!({
            "error": "InvalidRequest",
            "message": "Got 'foolz' for boolean parameter z, expected true or false",
        })
    );
}

#[tokio::test]
async fn test_procedure_bad_input() {
    let base = start().await;

    for input in [json!({"bar": 3}), json!({"foo": 2, "bar": 3})] {
        let resp = http()
            .post(format!("{}/xrpc/io.example.procedure", base))
            .json(&input)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body = resp.json::<Value>().await.unwrap();
        assert_eq!(body["error"], "InvalidRequest");
        assert!(body["message"]
            .as_str()
            .unwrap()
            .starts_with("io.example.procedure input:"));
    }
}

#[tokio::test]
async fn test_malformed_json_body() {
    let base = start().await;

    let resp = http()
        .post(format!("{}/xrpc/io.example.procedure", base))
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(resp.json::<Value>().await.unwrap()["error"], "InvalidRequest");
}

#[tokio::test]
async fn test_missing_and_integer_params() {
    let base = start().await;

    for query in ["", "?foo=a"] {
        let resp = http()
            .post(format!("{}/xrpc/io.example.params{}", base, query))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(resp.json::<Value>().await.unwrap()["message"]
            .as_str()
            .unwrap()
            .starts_with("io.example.params parameters:"));
    }

    let resp = http()
        .post(format!("{}/xrpc/io.example.params?bar=5", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_array_params() {
    let base = start().await;

    let resp = http()
        .post(format!("{}/xrpc/io.example.array?foo=a&foo=b", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.json::<Value>().await.unwrap(), json!(["a", "b"]));
}

#[tokio::test]
async fn test_raises_value_error() {
    let base = start().await;

    let resp = http()
        .post(format!("{}/xrpc/io.example.valueError", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        resp.json::<Value>().await.unwrap(),
        json!({"error": "InvalidRequest", "message": "foo"})
    );
}

#[tokio::test]
async fn test_raises_named_error() {
    let base = start().await;

    let resp = http()
        .get(format!("{}/xrpc/io.example.xrpcError", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        resp.json::<Value>().await.unwrap(),
        json!({"error": "Foo", "message": "Bar"})
    );
}

#[tokio::test]
async fn test_unknown_methods() {
    let base = start().await;

    let resp = http()
        .get(format!("{}/xrpc/io.unknown", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_IMPLEMENTED);
    assert_eq!(
        resp.json::<Value>().await.unwrap(),
        json!({"error": "MethodNotImplemented", "message": "io.unknown not found"})
    );

    let resp = http()
        .post(format!("{}/xrpc/not.defined", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_IMPLEMENTED);
    assert_eq!(
        resp.json::<Value>().await.unwrap(),
        json!({"error": "MethodNotImplemented", "message": "not.defined not found"})
    );
}

#[tokio::test]
async fn test_redirect() {
    let base = start().await;

    let resp = http()
        .post(format!("{}/xrpc/io.example.redirect", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(resp.headers()["Location"], "http://to/here");
}

#[tokio::test]
async fn test_subscription_http_not_websocket_405s() {
    let base = start().await;

    let resp = http()
        .post(format!("{}/xrpc/io.example.subscribe", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert!(resp.json::<Value>().await.unwrap()["message"]
        .as_str()
        .unwrap()
        .contains("Use websocket"));
}

#[tokio::test]
async fn test_extra_headers() {
    let base = start_with(ServerOptions {
        headers: vec![("X-Served-By".to_string(), "lexrpc".to_string())],
        ..Default::default()
    })
    .await;

    for path in ["io.example.query", "io.unknown"] {
        let resp = http()
            .get(format!("{}/xrpc/{}", base, path))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.headers()["X-Served-By"], "lexrpc");
    }
}

#[tokio::test]
async fn test_validation_disabled() {
    let server = example_server_builder()
        .server_options(ServerOptions {
            options: Options {
                validate: false,
                truncate: false,
            },
            ..Default::default()
        })
        .method("io.example.query", |_params, _input| async move {
            Ok(Some(json!({"bar": "not an integer"})))
        })
        .build()
        .unwrap();
    let base = serve(server).await;

    let resp = http()
        .get(format!("{}/xrpc/io.example.query", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.json::<Value>().await.unwrap(),
        json!({"bar": "not an integer"})
    );
}

#[tokio::test]
async fn test_encodings() {
    let base = start().await;
    let val: u64 = 234892348203948;
    let bytes = val.to_be_bytes();
    let first = bytes.iter().position(|b| *b != 0).unwrap();

    let resp = http()
        .post(format!("{}/xrpc/io.example.encodings", base))
        .body(bytes[first..].to_vec())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["Content-Type"], "number/int");

    let body = resp.bytes().await.unwrap();
    let got = body.iter().fold(0u64, |num, byte| (num << 8) | u64::from(*byte));
    assert_eq!(got, val + 1);
}

#[tokio::test]
async fn test_subscription() {
    let base = start().await;
    let url = format!(
        "{}/xrpc/io.example.subscribe?start=3&end=6",
        base.replacen("http://", "ws://", 1)
    );

    let (mut socket, _) = tokio_tungstenite::connect_async(url).await.unwrap();

    let mut frames = Vec::new();
    while let Some(message) = socket.next().await {
        match message.unwrap() {
            Message::Text(text) => frames.push(serde_json::from_str::<Value>(&text).unwrap()),
            Message::Close(_) => break,
            _ => {}
        }
    }

    assert_eq!(
        frames,
        vec![json!({"num": 3}), json!({"num": 4}), json!({"num": 5})]
    );
}

#[tokio::test]
async fn test_client_against_server() {
    let base = start().await;
    let client = Client::builder(base)
        .lexicons(lexrpc::testing::lexicons())
        .build()
        .unwrap();

    let output = client
        .nsid("io")
        .seg("example")
        .seg("procedure")
        .call(None, Some(json!({"foo": "xyz", "bar": 3})))
        .await
        .unwrap();
    assert_eq!(output, Some(json!({"foo": "xyz", "bar": 3})));

    let mut params = serde_json::Map::new();
    params.insert("x".into(), json!("abc"));
    let output = client
        .call("io.example.query", Some(params), None)
        .await
        .unwrap();
    assert_eq!(output, Some(json!({"foo": "abc", "bar": EXAMPLE_BAR})));

    assert_eq!(
        client
            .call("io.example.noParamsInputOutput", None, None)
            .await
            .unwrap(),
        None
    );

    match client.call("io.example.xrpcError", None, None).await {
        Err(lexrpc::LexError::Transport { status, message }) => {
            assert_eq!(status, Some(400));
            assert_eq!(message, "Foo: Bar");
        }
        other => panic!("Expected Transport error, got: {:?}", other),
    }
}
