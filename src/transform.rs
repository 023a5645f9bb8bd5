//! Coerces report cells to the types declared in a stream schema.
//!
//! Reports are text, so every cell starts as a JSON string. Each property
//! lists its allowed types; the first type the cell converts to wins.

use std::collections::BTreeSet;

use serde_json::{Map, Number, Value};
use tracing::debug;

use crate::config::parse_timestamp;
use crate::error::TapError;

/// Transformer bound to one stream's schema.
pub struct Transformer {
    stream: String,
    properties: Map<String, Value>,
    dropped: BTreeSet<String>,
}

impl Transformer {
    pub fn new(stream: &str, schema: &Value) -> Result<Self, TapError> {
        let properties = schema
            .get("properties")
            .and_then(Value::as_object)
            .cloned()
            .ok_or_else(|| TapError::schema(stream, "schema has no `properties` object"))?;

        Ok(Self {
            stream: stream.to_string(),
            properties,
            dropped: BTreeSet::new(),
        })
    }

    /// Coerce every field of `record`. Fields unknown to the schema are removed.
    pub fn transform(&mut self, record: Map<String, Value>) -> Result<Map<String, Value>, TapError> {
        let mut out = Map::new();
        for (field, value) in record {
            let Some(property) = self.properties.get(&field) else {
                if self.dropped.insert(field.clone()) {
                    debug!(stream = %self.stream, field = %field, "Dropping field not in schema");
                }
                continue;
            };
            let coerced = coerce(&value, property).ok_or_else(|| {
                TapError::schema(
                    &self.stream,
                    format!(
                        "field `{}` value {} does not match {}",
                        field,
                        value,
                        property.get("type").unwrap_or(&Value::Null)
                    ),
                )
            })?;
            out.insert(field, coerced);
        }
        Ok(out)
    }

    /// Fields removed so far because the schema does not declare them.
    pub fn dropped_fields(&self) -> impl Iterator<Item = &str> {
        self.dropped.iter().map(String::as_str)
    }
}

fn declared_types(property: &Value) -> Vec<&str> {
    match property.get("type") {
        Some(Value::String(t)) => vec![t.as_str()],
        Some(Value::Array(types)) => types.iter().filter_map(Value::as_str).collect(),
        // An untyped property accepts anything.
        _ => Vec::new(),
    }
}

fn coerce(value: &Value, property: &Value) -> Option<Value> {
    let types = declared_types(property);
    if types.is_empty() {
        return Some(value.clone());
    }
    let format = property.get("format").and_then(Value::as_str);

    let is_blank = matches!(value, Value::Null) || value.as_str().is_some_and(|s| s.is_empty());
    if is_blank && types.contains(&"null") {
        return Some(Value::Null);
    }

    types
        .iter()
        .find_map(|ty| coerce_to(value, ty, format))
}

fn coerce_to(value: &Value, ty: &str, format: Option<&str>) -> Option<Value> {
    match (ty, value) {
        ("null", Value::Null) => Some(Value::Null),
        ("integer", Value::Number(n)) if n.is_i64() || n.is_u64() => Some(value.clone()),
        ("integer", Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::from),
        ("number", Value::Number(_)) => Some(value.clone()),
        ("number", Value::String(s)) => parse_number(s.trim()),
        ("boolean", Value::Bool(_)) => Some(value.clone()),
        ("boolean", Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        ("string", Value::String(s)) if format == Some("date-time") => {
            parse_timestamp(s).map(|_| value.clone())
        }
        ("string", Value::String(_)) => Some(value.clone()),
        ("string", Value::Number(n)) => Some(Value::String(n.to_string())),
        ("object", Value::Object(_)) | ("array", Value::Array(_)) => Some(value.clone()),
        _ => None,
    }
}

/// Integral text stays an integer; anything else must be a finite float.
fn parse_number(s: &str) -> Option<Value> {
    if let Ok(i) = s.parse::<i64>() {
        return Some(Value::from(i));
    }
    s.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}
