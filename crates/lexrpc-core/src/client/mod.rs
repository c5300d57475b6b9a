//! XRPC client.
//!
//! [`Client::call`] validates parameters and input against the lexicon,
//! sends the request through a [`Transport`], and validates the output.
//!
//! ```no_run
//! # async fn run() -> lexrpc::Result<()> {
//! let client = lexrpc::Client::builder("https://bsky.social").build()?;
//!
//! let mut params = serde_json::Map::new();
//! params.insert("handle".into(), "snarfed.org".into());
//!
//! let output = client
//!     .nsid("com")
//!     .seg("atproto")
//!     .seg("identity")
//!     .seg("resolveHandle")
//!     .call(Some(params), None)
//!     .await?;
//! println!("{:?}", output);
//! # Ok(())
//! # }
//! ```

mod transport;

pub use transport::{HttpMethod, HttpTransport, Transport, TransportRequest, TransportResponse};

use crate::config::{Options, XrpcConfig};
use crate::error::{LexError, Result};
use crate::lexicon::{DefType, Registry};
use crate::nsid::is_valid_segment;
use crate::params::encode_params;
use crate::validate::{Slot, Validator};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Calls XRPC methods on a single server.
#[derive(Clone)]
pub struct Client {
    address: String,
    validator: Validator,
    transport: Arc<dyn Transport>,
    headers: Vec<(String, String)>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("address", &self.address)
            .field("options", &self.validator.options())
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Start building a client for the server at `address`.
    pub fn builder(address: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(address)
    }

    /// Base URL of the server, without a trailing slash.
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn registry(&self) -> &Registry {
        self.validator.registry()
    }

    pub fn options(&self) -> Options {
        self.validator.options()
    }

    /// Call a query or procedure.
    ///
    /// Queries are sent as GET and everything else as POST with `input` as
    /// the JSON body. Returns the decoded output, or `None` when the
    /// response has no JSON body.
    pub async fn call(
        &self,
        nsid: &str,
        params: Option<Map<String, Value>>,
        input: Option<Value>,
    ) -> Result<Option<Value>> {
        let def = self.registry().get_method(nsid)?;

        let params = Value::Object(params.unwrap_or_default());
        let params = self.validator.validate(nsid, Slot::Parameters, &params)?;
        let input = input.unwrap_or_else(|| Value::Object(Map::new()));
        let input = self.validator.validate(nsid, Slot::Input, &input)?;

        let mut url = format!("{}{}/{}", self.address, XrpcConfig::PATH_PREFIX, nsid);
        if let Value::Object(params) = params.as_ref() {
            let query = encode_params(params);
            if !query.is_empty() {
                url.push('?');
                url.push_str(&query);
            }
        }

        let (method, body) = match def.def_type {
            DefType::Query => (HttpMethod::Get, None),
            _ => (HttpMethod::Post, Some(input.into_owned())),
        };

        let mut headers = vec![(
            "Content-Type".to_string(),
            XrpcConfig::JSON_CONTENT_TYPE.to_string(),
        )];
        headers.extend(self.headers.iter().cloned());

        debug!("Calling {:?} {}", method, url);
        let response = self
            .transport
            .send(TransportRequest {
                method,
                url,
                headers,
                body,
            })
            .await?;

        let output = if !response.body.is_empty() && response.is_json() {
            Some(serde_json::from_slice::<Value>(&response.body).map_err(|e| {
                LexError::Json {
                    message: format!("Failed to parse {} output: {}", nsid, e),
                    source: Some(e),
                }
            })?)
        } else {
            None
        };

        match output {
            Some(output) => Ok(Some(
                self.validator
                    .validate(nsid, Slot::Output, &output)?
                    .into_owned(),
            )),
            None => {
                self.validator
                    .validate(nsid, Slot::Output, &Value::Object(Map::new()))?;
                Ok(None)
            }
        }
    }

    /// Start building a method id segment by segment.
    ///
    /// Underscores become hyphens, so `no_params_input_output` is sent as
    /// `no-params-input-output`.
    pub fn nsid(&self, segment: &str) -> NsidBuilder<'_> {
        NsidBuilder {
            client: self,
            segments: Vec::new(),
            invalid: None,
        }
        .seg(segment)
    }
}

/// A method id under construction. See [`Client::nsid`].
#[derive(Debug, Clone)]
pub struct NsidBuilder<'c> {
    client: &'c Client,
    segments: Vec<String>,
    invalid: Option<String>,
}

impl<'c> NsidBuilder<'c> {
    /// Append a segment.
    pub fn seg(mut self, segment: &str) -> Self {
        let segment = segment.replace('_', "-");
        if self.invalid.is_none() && !is_valid_segment(&segment) {
            self.invalid = Some(segment.clone());
        }
        self.segments.push(segment);
        self
    }

    /// The finished id, or [`LexError::InvalidNsid`] if a segment was bad.
    pub fn finish(&self) -> Result<String> {
        match &self.invalid {
            Some(segment) => Err(LexError::InvalidNsid(segment.clone())),
            None => Ok(self.segments.join(".")),
        }
    }

    /// Call the method this id names.
    pub async fn call(
        self,
        params: Option<Map<String, Value>>,
        input: Option<Value>,
    ) -> Result<Option<Value>> {
        let nsid = self.finish()?;
        self.client.call(&nsid, params, input).await
    }
}

/// Builder for [`Client`].
pub struct ClientBuilder {
    address: String,
    lexicons: Option<Vec<Value>>,
    registry: Option<Arc<Registry>>,
    options: Options,
    headers: Vec<(String, String)>,
    transport: Option<Arc<dyn Transport>>,
}

impl ClientBuilder {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            lexicons: None,
            registry: None,
            options: Options::default(),
            headers: Vec::new(),
            transport: None,
        }
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

    pub fn validate(mut self, validate: bool) -> Self {
        self.options.validate = validate;
        self
    }

    pub fn truncate(mut self, truncate: bool) -> Self {
        self.options.truncate = truncate;
        self
    }

    /// Header sent with every request.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Use a custom transport instead of [`HttpTransport`].
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Result<Client> {
        if !(self.address.starts_with("http://") || self.address.starts_with("https://")) {
            return Err(LexError::Config {
                message: format!(
                    "Server address {} must start with http:// or https://",
                    self.address
                ),
            });
        }
        let address = self.address.trim_end_matches('/').to_string();

        let registry = match (self.registry, self.lexicons) {
            (Some(registry), _) => registry,
            (None, Some(documents)) => Arc::new(Registry::load(documents)?),
            (None, None) => Arc::new(Registry::bundled()?),
        };

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new()?),
        };

        Ok(Client {
            address,
            validator: Validator::new(registry, self.options),
            transport,
            headers: self.headers,
        })
    }
}
