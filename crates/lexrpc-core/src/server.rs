//! XRPC server dispatcher.
//!
//! Handlers are registered explicitly per method id with
//! [`ServerBuilder::method`] and [`ServerBuilder::subscription`]. The
//! [`Server`] validates parameters and input before a handler runs and
//! validates its output (or each subscription message) afterwards. It knows
//! nothing about HTTP; see the `lexrpc-server` crate for the axum adapter.
//!
//! Methods whose input or output declares a non-JSON encoding are registered
//! with [`ServerBuilder::payload_method`] and exchange raw [`Payload`]s.

use crate::config::{Options, ServerOptions};
use crate::error::{LexError, Result, XrpcError};
use crate::lexicon::{DefType, Registry};
use crate::params::decode_params;
use crate::payload::Payload;
use crate::validate::{Slot, Validator};
use futures::future::{self, BoxFuture};
use futures::stream::BoxStream;
use futures::{FutureExt, Stream, StreamExt};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a query or procedure handler returns.
pub type HandlerResult = std::result::Result<Option<Value>, XrpcError>;

/// What a [`ServerBuilder::payload_method`] handler returns.
pub type PayloadResult = std::result::Result<Option<Payload>, XrpcError>;

/// Stream of messages produced by a subscription handler.
pub type MessageStream = BoxStream<'static, std::result::Result<Value, XrpcError>>;

/// Stream of validated subscription messages.
pub type Subscription = BoxStream<'static, Result<Value>>;

type MethodHandler =
    Arc<dyn Fn(Map<String, Value>, Payload) -> BoxFuture<'static, PayloadResult> + Send + Sync>;
type SubscriptionHandler = Arc<dyn Fn(Map<String, Value>) -> MessageStream + Send + Sync>;

/// Builder for [`Server`].
#[derive(Default)]
pub struct ServerBuilder {
    lexicons: Option<Vec<Value>>,
    registry: Option<Arc<Registry>>,
    options: Options,
    headers: Vec<(String, String)>,
    methods: HashMap<String, MethodHandler>,
    subscriptions: HashMap<String, SubscriptionHandler>,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lexicon documents to load instead of the bundled set.
    pub fn lexicons(mut self, documents: Vec<Value>) -> Self {
        self.lexicons = Some(documents);
        self
    }

    /// Share an already loaded registry.
    pub fn registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Validation options and extra response headers together.
    pub fn server_options(mut self, options: ServerOptions) -> Self {
        self.options = options.options;
        self.headers = options.headers;
        self
    }

    /// Header an HTTP adapter adds to every response.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Register the handler for a JSON query or procedure.
    ///
    /// The handler gets the decoded, validated parameters and input (`{}`
    /// when the request had none) and returns the output, if any. Raw byte
    /// input is rejected before the handler runs.
    pub fn method<F, Fut>(mut self, nsid: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Map<String, Value>, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let nsid = nsid.into();
        let name = nsid.clone();
        let handler: MethodHandler =
            Arc::new(move |params: Map<String, Value>, input: Payload| match input {
                Payload::Json(input) => handler(params, input)
                    .map(|output| output.map(|output| output.map(Payload::Json)))
                    .boxed(),
                Payload::Bytes { encoding, .. } => future::ready(Err(XrpcError::new(format!(
                    "{name} takes JSON input, got {encoding}"
                ))))
                .boxed(),
            });
        self.methods.insert(nsid, handler);
        self
    }

    /// Register the handler for a query or procedure whose input or output
    /// may be raw bytes.
    pub fn payload_method<F, Fut>(mut self, nsid: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Map<String, Value>, Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = PayloadResult> + Send + 'static,
    {
        let handler: MethodHandler = Arc::new(move |params, input| handler(params, input).boxed());
        self.methods.insert(nsid.into(), handler);
        self
    }

    /// Register the handler for a subscription.
    ///
    /// The handler gets the decoded, validated parameters and returns the
    /// stream of messages to send.
    pub fn subscription<F, S>(mut self, nsid: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Map<String, Value>) -> S + Send + Sync + 'static,
        S: Stream<Item = std::result::Result<Value, XrpcError>> + Send + 'static,
    {
        let handler: SubscriptionHandler = Arc::new(move |params| handler(params).boxed());
        self.subscriptions.insert(nsid.into(), handler);
        self
    }

    /// Check every handler against the registry and build the server.
    pub fn build(self) -> Result<Server> {
        if self.methods.is_empty() && self.subscriptions.is_empty() {
            return Err(LexError::NoMethods);
        }

        let registry = match (self.registry, self.lexicons) {
            (Some(registry), _) => registry,
            (None, Some(documents)) => Arc::new(Registry::load(documents)?),
            (None, None) => Arc::new(Registry::bundled()?),
        };

        for nsid in self.methods.keys() {
            if registry.get_method(nsid)?.def_type == DefType::Subscription {
                return Err(LexError::Config {
                    message: format!("{nsid} is a subscription, register it with subscription()"),
                });
            }
        }
        for nsid in self.subscriptions.keys() {
            let def = registry.get_method(nsid)?;
            if def.def_type != DefType::Subscription {
                return Err(LexError::Config {
                    message: format!("{nsid} is a {}, register it with method()", def.def_type),
                });
            }
        }

        info!(
            "XRPC server ready with {} methods and {} subscriptions",
            self.methods.len(),
            self.subscriptions.len()
        );

        Ok(Server {
            inner: Arc::new(ServerInner {
                validator: Validator::new(registry, self.options),
                headers: self.headers,
                methods: self.methods,
                subscriptions: self.subscriptions,
            }),
        })
    }
}

struct ServerInner {
    validator: Validator,
    headers: Vec<(String, String)>,
    methods: HashMap<String, MethodHandler>,
    subscriptions: HashMap<String, SubscriptionHandler>,
}

/// Dispatches XRPC calls to registered handlers.
///
/// Cheap to clone; clones share the registry and handlers.
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<&str> = self.inner.methods.keys().map(String::as_str).collect();
        methods.sort_unstable();
        let mut subscriptions: Vec<&str> =
            self.inner.subscriptions.keys().map(String::as_str).collect();
        subscriptions.sort_unstable();

        f.debug_struct("Server")
            .field("options", &self.options())
            .field("headers", &self.inner.headers)
            .field("methods", &methods)
            .field("subscriptions", &subscriptions)
            .finish()
    }
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    pub fn registry(&self) -> &Registry {
        self.inner.validator.registry()
    }

    pub fn options(&self) -> Options {
        self.inner.validator.options()
    }

    /// Extra headers for every HTTP response.
    pub fn headers(&self) -> &[(String, String)] {
        &self.inner.headers
    }

    /// Whether `nsid` has a registered subscription handler.
    pub fn is_subscription(&self, nsid: &str) -> bool {
        self.inner.subscriptions.contains_key(nsid)
    }

    /// Call a JSON query or procedure with already decoded parameters.
    pub async fn call(
        &self,
        nsid: &str,
        params: Map<String, Value>,
        input: Option<Value>,
    ) -> Result<Option<Value>> {
        match self.call_payload(nsid, params, input.map(Payload::Json)).await? {
            None => Ok(None),
            Some(Payload::Json(output)) => Ok(Some(output)),
            Some(Payload::Bytes { encoding, .. }) => Err(LexError::validation(
                nsid,
                Slot::Output,
                format!("expected JSON output, got {encoding}"),
            )),
        }
    }

    /// Call a query or procedure with already decoded parameters and a
    /// JSON or raw byte body.
    pub async fn call_payload(
        &self,
        nsid: &str,
        params: Map<String, Value>,
        input: Option<Payload>,
    ) -> Result<Option<Payload>> {
        let handler = self.inner.methods.get(nsid).ok_or_else(|| {
            warn!("No handler for {}", nsid);
            LexError::NotFound {
                nsid: nsid.to_string(),
            }
        })?;
        let validator = &self.inner.validator;

        let params = Value::Object(params);
        let params = into_map(validator.validate(nsid, Slot::Parameters, &params)?.into_owned());
        let input = input.unwrap_or_else(|| Payload::Json(Value::Object(Map::new())));
        let input = validator.validate_payload(nsid, Slot::Input, input)?;

        debug!("Running handler for {}", nsid);
        let output = handler(params, input).await.map_err(|e| {
            debug!("{} handler failed: {}", nsid, e);
            LexError::from(e)
        })?;

        match output {
            Some(output) => Ok(Some(validator.validate_payload(nsid, Slot::Output, output)?)),
            None => {
                validator.validate(nsid, Slot::Output, &Value::Object(Map::new()))?;
                Ok(None)
            }
        }
    }

    /// Call a query or procedure with raw query string parameters.
    pub async fn call_raw<I, K, V>(
        &self,
        nsid: &str,
        params: I,
        input: Option<Payload>,
    ) -> Result<Option<Payload>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let params = decode_params(self.registry().get_method(nsid)?, params)?;
        self.call_payload(nsid, params, input).await
    }

    /// Start a subscription with already decoded parameters.
    ///
    /// Each message is validated before it is yielded. A handler error ends
    /// up in the stream as [`LexError::Handler`].
    pub fn subscribe(&self, nsid: &str, params: Map<String, Value>) -> Result<Subscription> {
        let handler = self.inner.subscriptions.get(nsid).ok_or_else(|| {
            warn!("No subscription handler for {}", nsid);
            LexError::NotFound {
                nsid: nsid.to_string(),
            }
        })?;

        let params = Value::Object(params);
        let params = into_map(
            self.inner
                .validator
                .validate(nsid, Slot::Parameters, &params)?
                .into_owned(),
        );

        debug!("Starting subscription {}", nsid);
        let validator = self.inner.validator.clone();
        let nsid = nsid.to_string();
        let messages = handler(params).map(move |message| -> Result<Value> {
            let message = message?;
            Ok(validator
                .validate(&nsid, Slot::Message, &message)?
                .into_owned())
        });

        Ok(messages.boxed())
    }

    /// Start a subscription with raw query string parameters.
    pub fn subscribe_raw<I, K, V>(&self, nsid: &str, params: I) -> Result<Subscription>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let params = decode_params(self.registry().get_method(nsid)?, params)?;
        self.subscribe(nsid, params)
    }
}

fn into_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
