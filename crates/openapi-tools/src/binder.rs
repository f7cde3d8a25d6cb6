//! Argument binder: caller arguments + [`ToolSchema`] → [`BoundRequest`].
//!
//! Binding is all-or-nothing: either every argument is validated, coerced and routed to its
//! request location, or the first problem is reported as an [`InvocationError`].

use crate::compiler::{FieldSource, InputField, ToolSchema};
use crate::error::InvocationError;
use crate::model::{FieldType, HttpMethod};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

type BindResult<T> = std::result::Result<T, InvocationError>;

/// A fully validated HTTP request, independent of how it will be executed.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundRequest {
    pub method: HttpMethod,
    /// Path template with every placeholder replaced by its percent-encoded value.
    pub resolved_path: String,
    /// Unencoded name/value pairs in argument order; arrays repeat the key.
    pub query_params: Vec<(String, String)>,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
    pub body_media_type: Option<String>,
    /// Coerced arguments keyed by tool field name.
    pub arguments: Map<String, Value>,
}

impl BoundRequest {
    /// First query value for `name`.
    #[must_use]
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query_params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// Validate `arguments` against `schema` and route them into a request.
///
/// `null` is accepted as an empty argument object.
///
/// # Errors
///
/// - [`InvocationError::TypeMismatch`] on field `arguments` when the arguments are not an object
/// - [`InvocationError::MissingArgument`] for the first absent (or `null`) required field
/// - [`InvocationError::UnknownArgument`] for the first argument the schema does not declare
/// - [`InvocationError::TypeMismatch`] when a value cannot be losslessly coerced
pub fn bind(schema: &ToolSchema, arguments: &Value) -> BindResult<BoundRequest> {
    let empty = Map::new();
    let args = match arguments {
        Value::Object(map) => map,
        Value::Null => &empty,
        other => {
            return Err(InvocationError::TypeMismatch {
                field: "arguments".to_string(),
                expected: "object".to_string(),
                received: other.clone(),
            });
        }
    };

    for field in schema.fields.iter().filter(|f| f.required) {
        if args.get(&field.name).is_none_or(Value::is_null) {
            return Err(InvocationError::MissingArgument(field.name.clone()));
        }
    }

    if let Some(unknown) = args.keys().find(|k| schema.field(k).is_none()) {
        return Err(InvocationError::UnknownArgument(unknown.clone()));
    }

    let mut bound = BoundRequest {
        method: schema.method,
        resolved_path: schema.path.clone(),
        query_params: Vec::new(),
        headers: BTreeMap::new(),
        body: None,
        body_media_type: schema.body_media_type.clone(),
        arguments: Map::new(),
    };
    let mut body_fields: Option<Map<String, Value>> = None;

    for field in &schema.fields {
        let Some(raw) = args.get(&field.name).filter(|v| !v.is_null()) else {
            continue;
        };
        let value = coerce(&field.name, &field.field_type, raw)?;
        route(&mut bound, &mut body_fields, field, &value);
        bound.arguments.insert(field.name.clone(), value);
    }

    if bound.body.is_none() {
        bound.body = match body_fields {
            Some(fields) => Some(Value::Object(fields)),
            None if schema.body_required && has_field_body(schema) => {
                Some(Value::Object(Map::new()))
            }
            None => None,
        };
    }

    Ok(bound)
}

fn has_field_body(schema: &ToolSchema) -> bool {
    schema.fields.iter().any(|f| f.source == FieldSource::Body)
        || (schema.body_media_type.is_some()
            && !schema.fields.iter().any(|f| f.source == FieldSource::WholeBody))
}

fn route(
    bound: &mut BoundRequest,
    body_fields: &mut Option<Map<String, Value>>,
    field: &InputField,
    value: &Value,
) {
    match field.source {
        FieldSource::Path => {
            let placeholder = format!("{{{}}}", field.name);
            let encoded = encode_path_segment(&value_to_string(value));
            bound.resolved_path = bound.resolved_path.replace(&placeholder, &encoded);
        }
        FieldSource::Query => match value {
            Value::Array(items) => bound.query_params.extend(
                items
                    .iter()
                    .map(|item| (field.name.clone(), value_to_string(item))),
            ),
            other => bound
                .query_params
                .push((field.name.clone(), value_to_string(other))),
        },
        FieldSource::Header => {
            let rendered = match value {
                Value::Array(items) => items
                    .iter()
                    .map(value_to_string)
                    .collect::<Vec<_>>()
                    .join(","),
                other => value_to_string(other),
            };
            bound.headers.insert(field.name.clone(), rendered);
        }
        FieldSource::Body => {
            body_fields
                .get_or_insert_with(Map::new)
                .insert(field.name.clone(), value.clone());
        }
        FieldSource::WholeBody => bound.body = Some(value.clone()),
    }
}

/// Coerce `value` to `expected` when the conversion is lossless.
fn coerce(field: &str, expected: &FieldType, value: &Value) -> BindResult<Value> {
    let mismatch = || InvocationError::TypeMismatch {
        field: field.to_string(),
        expected: expected.name(),
        received: value.clone(),
    };

    match expected {
        FieldType::String => match value {
            Value::String(_) => Ok(value.clone()),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            _ => Err(mismatch()),
        },
        FieldType::Integer => match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value.clone()),
            Value::Number(n) => n
                .as_f64()
                .and_then(integral_f64)
                .map(Value::from)
                .ok_or_else(mismatch),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| mismatch()),
            _ => Err(mismatch()),
        },
        FieldType::Number => match value {
            Value::Number(_) => Ok(value.clone()),
            Value::String(s) => {
                let s = s.trim();
                if let Ok(i) = s.parse::<i64>() {
                    return Ok(Value::from(i));
                }
                s.parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .ok_or_else(mismatch)
            }
            _ => Err(mismatch()),
        },
        FieldType::Boolean => match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
            Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
            _ => Err(mismatch()),
        },
        FieldType::Array(item) => match (value, item) {
            (Value::Array(items), Some(item_type)) => items
                .iter()
                .enumerate()
                .map(|(i, v)| coerce(&format!("{field}[{i}]"), item_type, v))
                .collect::<BindResult<Vec<_>>>()
                .map(Value::Array),
            (Value::Array(_), None) => Ok(value.clone()),
            _ => Err(mismatch()),
        },
        FieldType::Object => match value {
            Value::Object(_) => Ok(value.clone()),
            _ => Err(mismatch()),
        },
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn integral_f64(f: f64) -> Option<i64> {
    (f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64)
        .then_some(f as i64)
}

/// Convert a JSON value to a string for path/query/header parameters.
pub(crate) fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => value.to_string(),
    }
}

/// Percent-encode everything except RFC 3986 unreserved characters.
pub(crate) fn encode_path_segment(s: &str) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = String::with_capacity(s.len());
    for &b in s.as_bytes() {
        if is_unreserved(b) {
            out.push(b as char);
        } else {
            out.push('%');
            out.push(HEX[(b >> 4) as usize] as char);
            out.push(HEX[(b & 0x0F) as usize] as char);
        }
    }
    out
}

fn is_unreserved(b: u8) -> bool {
    matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~')
}
