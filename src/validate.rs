//! Field validators for loosely-typed callable payloads.
//!
//! Payloads arrive as arbitrary JSON, so every field is checked for both
//! presence and JSON type before it reaches the store.

use std::fmt;

use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum FieldError {
    /// Field absent, `null`, or the payload is not an object.
    Missing(&'static str),
    /// Field present but not a non-empty string.
    NotString(&'static str),
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldError::Missing(field) | FieldError::NotString(field) => {
                write!(f, "{field} is required and must be a non-empty string.")
            }
        }
    }
}

fn field<'a>(data: &'a Value, name: &str) -> Option<&'a Value> {
    data.as_object()
        .and_then(|obj| obj.get(name))
        .filter(|v| !v.is_null())
}

pub fn required_string<'a>(data: &'a Value, name: &'static str) -> Result<&'a str, FieldError> {
    match field(data, name) {
        None => Err(FieldError::Missing(name)),
        Some(Value::String(s)) if !s.is_empty() => Ok(s.as_str()),
        Some(_) => Err(FieldError::NotString(name)),
    }
}

/// A non-empty string if one was supplied; anything else counts as absent.
pub fn optional_string<'a>(data: &'a Value, name: &str) -> Option<&'a str> {
    field(data, name)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// A JSON boolean if one was supplied. `false` is a value, not an absence.
pub fn optional_bool(data: &Value, name: &str) -> Option<bool> {
    field(data, name).and_then(Value::as_bool)
}
