//! Key-path navigation and typed decoding of JSON response bodies.
//!
//! A key path is a dot-delimited address such as `data.items` or
//! `errors.0.message`. Object members are addressed by name and array
//! elements by decimal index. The empty path addresses the whole document.

use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::DecodeError;

/// Borrow the node at `path`, if any.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Move the node at `path` out of `value`, if any.
pub fn extract(value: Value, path: &str) -> Option<Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |node, segment| match node {
        Value::Object(mut map) => map.remove(segment),
        Value::Array(items) => {
            let index = segment.parse::<usize>().ok()?;
            items.into_iter().nth(index)
        }
        _ => None,
    })
}

/// Parse `body` as JSON. An empty body is treated as `null`.
pub fn parse_body(body: &[u8]) -> Result<Value, DecodeError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body).map_err(DecodeError::InvalidJson)
}

/// Decode `body` into `T`, first unwrapping the node at `key_path` if given.
pub fn decode<T: DeserializeOwned>(body: &[u8], key_path: Option<&str>) -> Result<T, DecodeError> {
    decode_value(parse_body(body)?, key_path)
}

/// Decode an already parsed document into `T`, unwrapping `key_path` first.
pub fn decode_value<T: DeserializeOwned>(
    value: Value,
    key_path: Option<&str>,
) -> Result<T, DecodeError> {
    let node = match key_path {
        Some(path) => {
            extract(value, path).ok_or_else(|| DecodeError::MissingKeyPath(path.to_string()))?
        }
        None => value,
    };
    serde_json::from_value(node).map_err(DecodeError::TypeMismatch)
}

/// String found at `key_path` in an error body, or an empty string.
///
/// Never fails: unreadable bodies, missing paths and non-string nodes all
/// yield `""`.
pub fn error_message(body: &[u8], key_path: &str) -> String {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|json| lookup(&json, key_path).and_then(Value::as_str).map(str::to_string))
        .unwrap_or_default()
}

/// Result type for endpoints whose payload is irrelevant.
///
/// Decodes from any JSON document, including `null` and an empty body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Nothing;

impl<'de> Deserialize<'de> for Nothing {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        IgnoredAny::deserialize(deserializer)?;
        Ok(Nothing)
    }
}
