//! Query parameter encoding and decoding.
//!
//! XRPC parameters travel in the URL query string. Booleans are the literal
//! strings `true` and `false`, arrays are repeated `name=value` pairs, and
//! everything else uses its plain string form.

use crate::error::{LexError, Result};
use crate::lexicon::Definition;
use serde_json::{Map, Number, Value};
use url::form_urlencoded;

/// Encode decoded parameter values as a URL query string.
///
/// `null` values are left out.
pub fn encode_params(params: &Map<String, Value>) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());

    for (name, value) in params {
        match value {
            Value::Array(items) => {
                for item in items {
                    if let Some(encoded) = encode_scalar(item) {
                        serializer.append_pair(name, &encoded);
                    }
                }
            }
            other => {
                if let Some(encoded) = encode_scalar(other) {
                    serializer.append_pair(name, &encoded);
                }
            }
        }
    }

    serializer.finish()
}

fn encode_scalar(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(true) => Some("true".to_string()),
        Value::Bool(false) => Some("false".to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// Split a raw query string into name/value pairs, preserving repeats.
pub fn parse_query(query: &str) -> Vec<(String, String)> {
    form_urlencoded::parse(query.trim_start_matches('?').as_bytes())
        .into_owned()
        .collect()
}

/// Decode raw query parameter pairs against a method's parameter schema.
///
/// Undeclared parameters are decoded as strings. Repeated `array`
/// parameters accumulate in order.
pub fn decode_params<I, K, V>(def: &Definition, params: I) -> Result<Map<String, Value>>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut decoded = Map::new();

    for (name, raw) in params {
        let (name, raw) = (name.as_ref(), raw.as_ref());
        let schema = def.parameter(name);
        let ty = schema.map_or("string", |s| s.type_or_string());

        if ty == "array" {
            let item_ty = schema
                .and_then(|s| s.items.as_deref())
                .map_or("string", |items| items.type_or_string());
            let item = decode_scalar(name, item_ty, raw)?;

            match decoded
                .entry(name)
                .or_insert_with(|| Value::Array(Vec::new()))
            {
                Value::Array(items) => items.push(item),
                other => *other = Value::Array(vec![item]),
            }
        } else {
            decoded.insert(name.to_string(), decode_scalar(name, ty, raw)?);
        }
    }

    Ok(decoded)
}

fn decode_scalar(name: &str, ty: &str, raw: &str) -> Result<Value> {
    match ty {
        "boolean" => match raw {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(LexError::Decoding {
                param: name.to_string(),
                message: format!("Got '{raw}' for boolean parameter {name}, expected true or false"),
            }),
        },
        "integer" => raw
            .parse::<i64>()
            .map(Value::from)
            .map_err(|e| LexError::Decoding {
                param: name.to_string(),
                message: format!("{e}: '{raw}' for integer parameter {name}"),
            }),
        "number" => raw
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| LexError::Decoding {
                param: name.to_string(),
                message: format!("could not convert '{raw}' to float for number parameter {name}"),
            }),
        _ => Ok(Value::String(raw.to_string())),
    }
}
