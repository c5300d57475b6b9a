//! Test fixtures: example lexicons, a recording transport and an example
//! server.
//!
//! Compiled for this crate's unit tests and, with the `testing` feature, for
//! downstream test suites.

use crate::client::{Transport, TransportRequest, TransportResponse};
use crate::error::{LexError, Result, XrpcError};
use crate::payload::Payload;
use crate::server::{Server, ServerBuilder};
use async_trait::async_trait;
use futures::stream;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Lexicon documents exercising every definition type and slot shape.
pub fn lexicons() -> Vec<Value> {
    vec![
        json!({
            "lexicon": 1,
            "id": "io.example.procedure",
            "defs": {
                "main": {
                    "type": "procedure",
                    "description": "Whatever you want",
                    "parameters": {
                        "type": "params",
                        "properties": {
                            "x": {"type": "string"},
                            "z": {"type": "boolean"},
                        },
                    },
                    "input": {
                        "encoding": "application/json",
                        "schema": {
                            "type": "object",
                            "required": ["foo"],
                            "properties": {
                                "foo": {"type": "string"},
                                "bar": {"type": "integer"},
                            },
                        },
                    },
                    "output": {
                        "encoding": "application/json",
                        "schema": {
                            "type": "object",
                            "required": ["foo"],
                            "properties": {
                                "foo": {"type": "string"},
                                "bar": {"type": "integer"},
                            },
                        },
                    },
                },
            },
        }),
        json!({
            "lexicon": 1,
            "id": "io.example.query",
            "defs": {
                "main": {
                    "type": "query",
                    "parameters": {
                        "type": "params",
                        "properties": {
                            "x": {"type": "string"},
                            "z": {"type": "boolean"},
                        },
                    },
                    "output": {
                        "encoding": "application/json",
                        "schema": {
                            "type": "object",
                            "required": ["foo"],
                            "properties": {
                                "foo": {"type": "string"},
                                "bar": {"type": "integer"},
                            },
                        },
                    },
                },
            },
        }),
        json!({
            "lexicon": 1,
            "id": "io.example.noParamsInputOutput",
            "defs": {"main": {"type": "procedure"}},
        }),
        json!({
            "lexicon": 1,
            "id": "io.exa-mple.dashedName",
            "defs": {"main": {"type": "procedure"}},
        }),
        json!({
            "lexicon": 1,
            "id": "io.example.params",
            "defs": {
                "main": {
                    "type": "procedure",
                    "parameters": {
                        "type": "params",
                        "required": ["bar"],
                        "properties": {
                            "foo": {"type": "string"},
                            "bar": {"type": "integer"},
                        },
                    },
                },
            },
        }),
        json!({
            "lexicon": 1,
            "id": "io.example.array",
            "defs": {
                "main": {
                    "type": "procedure",
                    "parameters": {
                        "type": "params",
                        "properties": {
                            "foo": {"type": "array", "items": {"type": "string"}},
                        },
                    },
                    "input": {
                        "encoding": "application/json",
                        "schema": {"type": "object"},
                    },
                    "output": {
                        "encoding": "application/json",
                        "schema": {"type": "array", "items": {"type": "string"}},
                    },
                },
            },
        }),
        json!({
            "lexicon": 1,
            "id": "io.example.record",
            "defs": {
                "main": {
                    "type": "record",
                    "record": {
                        "required": ["baz"],
                        "properties": {
                            "baz": {"type": "integer"},
                            "biff": {
                                "type": "object",
                                "properties": {"baj": {"type": "string"}},
                            },
                        },
                    },
                },
            },
        }),
        json!({
            "lexicon": 1,
            "id": "io.example.objectArray",
            "defs": {
                "main": {
                    "type": "record",
                    "record": {
                        "type": "object",
                        "properties": {
                            "foo": {
                                "type": "array",
                                "items": {
                                    "type": "object",
                                    "required": ["bar"],
                                    "properties": {
                                        "bar": {"type": "integer"},
                                        "baj": {"type": "string"},
                                    },
                                },
                            },
                        },
                    },
                },
            },
        }),
        json!({
            "lexicon": 1,
            "id": "io.example.nullable",
            "defs": {
                "main": {
                    "type": "record",
                    "record": {
                        "type": "object",
                        "nullable": ["maybe"],
                        "properties": {
                            "maybe": {"type": "string"},
                            "never": {"type": "string"},
                        },
                    },
                },
            },
        }),
        json!({
            "lexicon": 1,
            "id": "io.example.unionArray",
            "defs": {
                "main": {
                    "type": "record",
                    "record": {
                        "type": "object",
                        "properties": {
                            "foo": {
                                "type": "array",
                                "items": {
                                    "type": "union",
                                    "refs": [
                                        "io.example.kitchenSink#object",
                                        "io.example.kitchenSink#subobject",
                                    ],
                                },
                            },
                        },
                    },
                },
            },
        }),
        json!({
            "lexicon": 1,
            "id": "io.example.token",
            "defs": {"main": {"type": "token", "description": "Undefined!"}},
        }),
        json!({
            "lexicon": 1,
            "id": "io.example.defs",
            "defs": {
                "main": {
                    "type": "query",
                    "input": {
                        "encoding": "application/json",
                        "schema": {
                            "type": "object",
                            "properties": {"in": {"type": "string"}},
                        },
                    },
                    "output": {
                        "encoding": "application/json",
                        "schema": {
                            "type": "object",
                            "properties": {"out": {"type": "string"}},
                        },
                    },
                },
            },
        }),
        json!({
            "lexicon": 1,
            "id": "io.example.error",
            "defs": {
                "main": {
                    "type": "query",
                    "errors": [
                        {"name": "OneBad"},
                        {"name": "AnotherBad"},
                        {"name": "ThirdBad"},
                    ],
                },
            },
        }),
        json!({
            "lexicon": 1,
            "id": "io.example.encodings",
            "defs": {
                "main": {
                    "type": "procedure",
                    "input": {"encoding": "number/int"},
                    "output": {"encoding": "number/int"},
                },
            },
        }),
        json!({
            "lexicon": 1,
            "id": "io.example.subscribe",
            "defs": {
                "main": {
                    "type": "subscription",
                    "parameters": {
                        "type": "params",
                        "properties": {
                            "start": {"type": "integer"},
                            "end": {"type": "integer"},
                        },
                    },
                    "message": {
                        "schema": {
                            "type": "object",
                            "properties": {"num": {"type": "integer"}},
                        },
                    },
                    "errors": [{"name": "Unhappy"}],
                },
            },
        }),
        json!({
            "lexicon": 1,
            "id": "io.example.redirect",
            "defs": {"main": {"type": "query"}},
        }),
        json!({
            "lexicon": 1,
            "id": "io.example.valueError",
            "defs": {"main": {"type": "query"}},
        }),
        json!({
            "lexicon": 1,
            "id": "io.example.xrpcError",
            "defs": {
                "main": {
                    "type": "query",
                    "errors": [{"name": "Foo"}],
                },
            },
        }),
        json!({
            "lexicon": 1,
            "id": "com.example.stringLength",
            "defs": {
                "main": {
                    "type": "record",
                    "record": {
                        "type": "object",
                        "properties": {
                            "string": {
                                "type": "string",
                                "maxLength": 20,
                                "maxGraphemes": 10,
                            },
                        },
                    },
                },
            },
        }),
        json!({
            "lexicon": 1,
            "id": "io.example.kitchenSink",
            "defs": {
                "main": {
                    "type": "record",
                    "description": "A record",
                    "key": "tid",
                    "record": {
                        "type": "object",
                        "required": ["object", "array", "boolean", "integer", "string", "datetime"],
                        "properties": {
                            "object": {"type": "ref", "ref": "#object"},
                            "array": {"type": "array", "items": {"type": "string"}},
                            "boolean": {"type": "boolean"},
                            "integer": {"type": "integer"},
                            "string": {"type": "string"},
                            "datetime": {"type": "string", "format": "datetime"},
                        },
                    },
                },
                "object": {
                    "type": "object",
                    "required": ["subobject", "array", "boolean", "integer", "string"],
                    "properties": {
                        "subobject": {"type": "ref", "ref": "#subobject"},
                        "array": {"type": "array", "items": {"type": "string"}},
                        "boolean": {"type": "boolean"},
                        "integer": {"type": "integer"},
                        "string": {"type": "string"},
                    },
                },
                "subobject": {
                    "type": "object",
                    "required": ["boolean"],
                    "properties": {"boolean": {"type": "boolean"}},
                },
            },
        }),
    ]
}

/// Value returned as `bar` by the example server's `io.example.query`.
pub const EXAMPLE_BAR: i64 = 5;

/// A server over [`lexicons`] with handlers for the example methods.
///
/// - `io.example.query` returns `{"foo": params.x, "bar": 5}`
/// - `io.example.procedure` echoes its input
/// - `io.example.params`, `io.example.noParamsInputOutput` and
///   `io.exa-mple.dashedName` return nothing
/// - `io.example.encodings` takes a big-endian `number/int` body and
///   returns it plus one
/// - `io.example.valueError`, `io.example.xrpcError` and
///   `io.example.redirect` fail in their respective ways
/// - `io.example.subscribe` streams `{"num": n}` for `start <= n < end`
pub fn example_server() -> Result<Server> {
    example_server_builder().build()
}

/// The builder behind [`example_server`], for adding options or handlers.
pub fn example_server_builder() -> ServerBuilder {
    ServerBuilder::new()
        .lexicons(lexicons())
        .method("io.example.query", |params, _input| async move {
            let foo = params.get("x").cloned().unwrap_or_else(|| json!(""));
            Ok(Some(json!({"foo": foo, "bar": EXAMPLE_BAR})))
        })
        .method("io.example.procedure", |_params, input| async move {
            Ok(Some(input))
        })
        .method("io.example.params", |_params, _input| async move { Ok(None) })
        .method("io.example.noParamsInputOutput", |_params, _input| async move {
            Ok(None)
        })
        .method("io.exa-mple.dashedName", |_params, _input| async move {
            Ok(None)
        })
        .method("io.example.array", |params, _input| async move {
            Ok(params.get("foo").cloned().or_else(|| Some(json!([]))))
        })
        .payload_method("io.example.encodings", |_params, input| async move {
            let Payload::Bytes { data, .. } = input else {
                return Err(XrpcError::new("expected number/int body"));
            };
            let num = data.iter().fold(0u64, |num, byte| (num << 8) | u64::from(*byte));
            let bytes = num.wrapping_add(1).to_be_bytes();
            let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len() - 1);
            Ok(Some(Payload::bytes("number/int", &bytes[start..])))
        })
        .method("io.example.valueError", |_params, _input| async move {
            Err(XrpcError::new("foo"))
        })
        .method("io.example.xrpcError", |_params, _input| async move {
            Err(XrpcError::named("Foo", "Bar"))
        })
        .method("io.example.redirect", |_params, _input| async move {
            Err(XrpcError::redirect("http://to/here"))
        })
        .subscription("io.example.subscribe", |params| {
            let start = params.get("start").and_then(Value::as_i64).unwrap_or(0);
            let end = params.get("end").and_then(Value::as_i64).unwrap_or(start);
            stream::iter((start..end).map(|num| Ok(json!({"num": num}))))
        })
}

/// A [`Transport`] that records requests and replays canned responses.
///
/// With no queued response it answers 200 with an empty body.
#[derive(Debug, Default)]
pub struct MockTransport {
    requests: Mutex<Vec<TransportRequest>>,
    responses: Mutex<VecDeque<Result<TransportResponse>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a 200 response with a JSON body.
    pub fn respond_json(&self, body: Value) -> &Self {
        self.respond(TransportResponse::json(&body))
    }

    /// Queue a response.
    pub fn respond(&self, response: TransportResponse) -> &Self {
        self.push(Ok(response))
    }

    /// Queue a failure.
    pub fn fail(&self, error: LexError) -> &Self {
        self.push(Err(error))
    }

    fn push(&self, response: Result<TransportResponse>) -> &Self {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push_back(response);
        }
        self
    }

    /// Every request sent so far, in order.
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }

        let next = self
            .responses
            .lock()
            .ok()
            .and_then(|mut responses| responses.pop_front());

        next.unwrap_or_else(|| {
            Ok(TransportResponse {
                status: 200,
                ..Default::default()
            })
        })
    }
}
