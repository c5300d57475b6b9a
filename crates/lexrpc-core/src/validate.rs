//! Schema validation of call data.
//!
//! Checks JSON values against the `parameters`, `input`, `output`, `message`
//! or `record` slot of a lexicon definition, and optionally truncates strings
//! that are longer than their `maxGraphemes`.
//!
//! # Coverage
//!
//! Required and nullable fields, primitive kinds, array item kinds and inline
//! nested objects are checked. `ref`, `union`, `token`, `unknown` and
//! `cid-link` properties, and string `format`s such as `datetime`, are only
//! checked for presence.

use crate::config::{Options, XrpcConfig};
use crate::error::{LexError, Result};
use crate::lexicon::{Definition, Registry, Schema};
use crate::payload::{is_json_encoding, Payload};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;
use unicode_segmentation::UnicodeSegmentation;

/// A named sub-schema of a definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Parameters,
    Input,
    Message,
    Output,
    Record,
}

impl Slot {
    pub fn as_str(&self) -> &'static str {
        match self {
            Slot::Parameters => "parameters",
            Slot::Input => "input",
            Slot::Message => "message",
            Slot::Output => "output",
            Slot::Record => "record",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Slot {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "parameters" => Ok(Slot::Parameters),
            "input" => Ok(Slot::Input),
            "message" => Ok(Slot::Message),
            "output" => Ok(Slot::Output),
            "record" => Ok(Slot::Record),
            other => Err(format!("unknown slot {other}")),
        }
    }
}

/// What a slot declares about its payload.
enum SlotSchema<'d> {
    /// Non-JSON encoding, passed through untouched.
    Opaque,
    /// No schema at all; anything goes.
    Unchecked,
    Schema(&'d Schema),
}

fn slot_schema(def: &Definition, slot: Slot) -> SlotSchema<'_> {
    let schema = match slot {
        Slot::Parameters => def.parameters.as_ref(),
        Slot::Record => def.record.as_ref(),
        Slot::Input | Slot::Output | Slot::Message => {
            let body = match slot {
                Slot::Input => def.input.as_ref(),
                Slot::Output => def.output.as_ref(),
                _ => def.message.as_ref(),
            };
            let Some(body) = body else {
                return SlotSchema::Unchecked;
            };
            if body.encoding.as_deref().is_some_and(|e| !is_json_encoding(e)) {
                return SlotSchema::Opaque;
            }
            body.schema.as_ref()
        }
    };

    schema.map_or(SlotSchema::Unchecked, SlotSchema::Schema)
}

/// Validates values against the definitions in a [`Registry`].
#[derive(Debug, Clone)]
pub struct Validator {
    registry: Arc<Registry>,
    options: Options,
}

impl Validator {
    pub fn new(registry: Arc<Registry>, options: Options) -> Self {
        Self { registry, options }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn options(&self) -> Options {
        self.options
    }

    /// Validate `value` against a slot of the definition `nsid`.
    ///
    /// Returns the value itself, or a truncated copy when truncation is
    /// enabled and a string was too long. `value` is never modified.
    pub fn validate<'v>(&self, nsid: &str, slot: Slot, value: &'v Value) -> Result<Cow<'v, Value>> {
        let def = self.registry.get(nsid)?;

        let schema = match slot_schema(def, slot) {
            SlotSchema::Opaque | SlotSchema::Unchecked => return Ok(Cow::Borrowed(value)),
            SlotSchema::Schema(schema) => schema,
        };

        let value = if self.options.truncate {
            truncate_object(schema, value).map_or(Cow::Borrowed(value), Cow::Owned)
        } else {
            Cow::Borrowed(value)
        };

        if !self.options.validate {
            return Ok(value);
        }

        debug!("Validating {} {}", nsid, slot);
        check_root(schema, &value).map_err(|message| {
            debug!("{} {} failed validation: {}", nsid, slot, message);
            LexError::validation(nsid, slot, message)
        })?;

        Ok(value)
    }

    /// Validate an input or output body.
    ///
    /// JSON bodies go through [`Validator::validate`]. Raw bytes pass when
    /// the slot declares a non-JSON encoding or no schema.
    pub fn validate_payload(&self, nsid: &str, slot: Slot, payload: Payload) -> Result<Payload> {
        match payload {
            Payload::Json(value) => Ok(Payload::Json(
                self.validate(nsid, slot, &value)?.into_owned(),
            )),
            Payload::Bytes { encoding, data } => {
                let def = self.registry.get(nsid)?;
                if self.options.validate && matches!(slot_schema(def, slot), SlotSchema::Schema(_)) {
                    return Err(LexError::validation(
                        nsid,
                        slot,
                        format!("expected {} body, got {}", XrpcConfig::JSON_CONTENT_TYPE, encoding),
                    ));
                }
                Ok(Payload::Bytes { encoding, data })
            }
        }
    }
}

/// Shorten `s` to `max` graphemes, the last one an ellipsis.
///
/// Returns `None` when `s` is already short enough. A `max` of 0 leaves
/// nothing, not even the ellipsis.
pub fn truncate_graphemes(s: &str, max: usize) -> Option<String> {
    if s.graphemes(true).count() <= max {
        return None;
    }
    if max == 0 {
        return Some(String::new());
    }

    let mut truncated: String = s.graphemes(true).take(max.saturating_sub(1)).collect();
    truncated.push(XrpcConfig::ELLIPSIS);
    Some(truncated)
}

/// Copy of `value` with over-long strings truncated, or `None` if unchanged.
fn truncate_object(schema: &Schema, value: &Value) -> Option<Value> {
    let fields = value.as_object()?;
    let mut copy: Option<Map<String, Value>> = None;

    for (name, prop) in &schema.properties {
        let Some(field) = fields.get(name) else {
            continue;
        };

        let replacement = match (prop.max_graphemes, field) {
            (Some(max), Value::String(s)) => truncate_graphemes(s, max).map(Value::String),
            _ if prop.schema_type.as_deref() == Some("object") => truncate_object(prop, field),
            _ => None,
        };

        if let Some(replacement) = replacement {
            copy.get_or_insert_with(|| fields.clone())
                .insert(name.clone(), replacement);
        }
    }

    copy.map(Value::Object)
}

fn check_root(schema: &Schema, value: &Value) -> std::result::Result<(), String> {
    match schema.schema_type.as_deref() {
        None | Some("object" | "params") => {
            let fields = value
                .as_object()
                .ok_or_else(|| format!("expected an object, got {value}"))?;
            check_object(schema, fields, "")
        }
        Some(ty) => check_property(schema, ty, value, "value"),
    }
}

fn check_object(
    schema: &Schema,
    fields: &Map<String, Value>,
    path: &str,
) -> std::result::Result<(), String> {
    for (name, prop) in &schema.properties {
        let field = if path.is_empty() {
            name.clone()
        } else {
            format!("{path}.{name}")
        };

        match fields.get(name) {
            None => {
                if schema.is_required(name) {
                    return Err(format!("missing required property {field}"));
                }
            }
            Some(Value::Null) => {
                if !schema.is_nullable(name) {
                    return Err(format!("property {field} is not nullable"));
                }
            }
            Some(value) => {
                if let Some(ty) = prop.schema_type.as_deref() {
                    check_property(prop, ty, value, &field)?;
                }
            }
        }
    }

    Ok(())
}

fn check_property(
    prop: &Schema,
    ty: &str,
    value: &Value,
    field: &str,
) -> std::result::Result<(), String> {
    if !kind_matches(ty, value) {
        return Err(format!("unexpected value for {ty} property {field}: {value}"));
    }

    match (ty, value) {
        ("array", Value::Array(items)) => {
            let Some(item_schema) = prop.items.as_deref() else {
                return Ok(());
            };
            let Some(item_ty) = item_schema.schema_type.as_deref() else {
                return Ok(());
            };
            for (i, item) in items.iter().enumerate() {
                if !kind_matches(item_ty, item) {
                    return Err(format!(
                        "unexpected item for {ty} property {field}: {item}"
                    ));
                }
                if let Value::Object(item_fields) = item {
                    if item_ty == "object" {
                        check_object(item_schema, item_fields, &format!("{field}[{i}]"))?;
                    }
                }
            }
            Ok(())
        }
        ("object", Value::Object(fields)) => check_object(prop, fields, field),
        _ => Ok(()),
    }
}

/// Whether `value`'s runtime kind matches the declared lexicon type.
///
/// Types that aren't checked structurally always match.
fn kind_matches(ty: &str, value: &Value) -> bool {
    match ty {
        "null" => value.is_null(),
        "boolean" => value.is_boolean(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "string" => value.is_string(),
        "bytes" => value.get("$bytes").is_some_and(Value::is_string),
        "array" => value.is_array(),
        "object" | "blob" => value.is_object(),
        // ref, union, token, unknown, cid-link
        _ => true,
    }
}
