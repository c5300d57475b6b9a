//! Lexicon definition schema.
//!
//! Defines the structure of the definitions inside a lexicon document. Only
//! the fields the validator and dispatchers act on are typed; everything else
//! (`description`, `errors`, `key`, ...) is kept verbatim in `extra`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The `type` of a top-level lexicon definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefType {
    Query,
    Procedure,
    Subscription,
    Object,
    Record,
    Ref,
    Token,
    // Only valid as parameter definitions
    Array,
    Boolean,
    Integer,
    Number,
    String,
}

impl DefType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DefType::Query => "query",
            DefType::Procedure => "procedure",
            DefType::Subscription => "subscription",
            DefType::Object => "object",
            DefType::Record => "record",
            DefType::Ref => "ref",
            DefType::Token => "token",
            DefType::Array => "array",
            DefType::Boolean => "boolean",
            DefType::Integer => "integer",
            DefType::Number => "number",
            DefType::String => "string",
        }
    }

    /// Query, procedure or subscription.
    pub fn is_method(&self) -> bool {
        matches!(
            self,
            DefType::Query | DefType::Procedure | DefType::Subscription
        )
    }
}

impl fmt::Display for DefType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DefType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "query" => DefType::Query,
            "procedure" => DefType::Procedure,
            "subscription" => DefType::Subscription,
            "object" => DefType::Object,
            "record" => DefType::Record,
            "ref" => DefType::Ref,
            "token" => DefType::Token,
            "array" => DefType::Array,
            "boolean" => DefType::Boolean,
            "integer" => DefType::Integer,
            "number" => DefType::Number,
            "string" => DefType::String,
            other => return Err(other.to_string()),
        })
    }
}

/// A schema node: an object, a property, or an array's items.
///
/// `params` slots, `record` slots, `object` definitions and the `schema` of a
/// body all share this shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, Schema>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nullable: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_graphemes: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Target of a `ref` property, eg `#subobject`.
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// Members of a `union` property.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub refs: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Schema {
    pub fn is_required(&self, name: &str) -> bool {
        self.required.iter().any(|r| r == name)
    }

    pub fn is_nullable(&self, name: &str) -> bool {
        self.nullable.iter().any(|n| n == name)
    }

    /// Declared type, `string` when absent (the XRPC parameter default).
    pub fn type_or_string(&self) -> &str {
        self.schema_type.as_deref().unwrap_or("string")
    }
}

/// An `input`, `output` or `message` slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Body {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Schema>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A single lexicon definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Definition {
    #[serde(rename = "type")]
    pub def_type: DefType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Schema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Body>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Body>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Body>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<Schema>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Definition {
    /// Schema of a declared parameter, if any.
    pub fn parameter(&self, name: &str) -> Option<&Schema> {
        self.parameters.as_ref()?.properties.get(name)
    }
}
