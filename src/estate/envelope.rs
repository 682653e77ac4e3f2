//! Vendor envelope handling.
//!
//! Listing detail responses look like `{"realestates.apartmentRent": {...}}`:
//! a single key naming the listing type wrapping the actual body. The JSON
//! is a mechanical conversion of the vendor's XML, so collections holding a
//! single element arrive as a bare object instead of an array.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("envelope is not a json object")]
    NotAnObject,
    #[error("envelope is empty")]
    Empty,
    #[error("envelope has no declared type key among {0:?}")]
    Ambiguous(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Unwrapped {
    pub type_tag: String,
    pub body: Value,
}

/// Splits an envelope into its type tag and body.
///
/// The tag is the first key starting with `type_prefix`. Envelopes with a
/// single undeclared key are still accepted for compatibility with older
/// listing types; anything else is rejected instead of guessing.
pub fn unwrap_envelope(envelope: Value, type_prefix: &str) -> Result<Unwrapped, EnvelopeError> {
    let Value::Object(mut map) = envelope else {
        return Err(EnvelopeError::NotAnObject);
    };
    if map.is_empty() {
        return Err(EnvelopeError::Empty);
    }

    let declared = map.keys().find(|key| key.starts_with(type_prefix)).cloned();
    let tag = match declared {
        Some(tag) => tag,
        None if map.len() == 1 => match map.keys().next() {
            Some(only) => only.clone(),
            None => return Err(EnvelopeError::Empty),
        },
        None => return Err(EnvelopeError::Ambiguous(map.keys().cloned().collect())),
    };

    let body = map.remove(&tag).unwrap_or(Value::Null);
    Ok(Unwrapped {
        type_tag: tag,
        body,
    })
}

/// Treats arrays as-is, `null` as empty and any other value as a
/// one-element list.
pub fn as_list(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

/// Walks object keys in order. Keys may contain dots, so the path is a list.
pub fn value_at_path<'a, S: AsRef<str>>(value: &'a Value, path: &[S]) -> Option<&'a Value> {
    path.iter()
        .try_fold(value, |current, key| current.get(key.as_ref()))
}

/// Listing identifiers come as strings or numbers depending on the endpoint.
pub fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
