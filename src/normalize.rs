//! Coercion of loosely-shaped client fields into canonical values.
//!
//! List fields arrive as arrays, JSON-encoded arrays, comma-separated strings
//! or nested objects depending on the client. They are normalized once, while
//! deserializing a request body, into a [`StringList`].

use std::ops::Deref;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Normalize any JSON value into an ordered list of trimmed, non-empty strings.
///
/// - arrays: string elements are trimmed, numbers and booleans rendered,
///   everything else dropped;
/// - strings: parsed as JSON first; a JSON array is handled as above, a JSON
///   string is unquoted and comma split, anything else falls back to a comma
///   split of the raw text;
/// - null, objects and other scalars: empty.
pub fn normalize_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(element_to_string).collect(),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Array(items)) => items.iter().filter_map(element_to_string).collect(),
            Ok(Value::String(inner)) => split_commas(&inner),
            _ => split_commas(s),
        },
        _ => Vec::new(),
    }
}

/// Like [`normalize_list`], but an object is searched for `key` and that inner
/// value normalized instead, e.g. `{"inclusions": ["Meals"]}` under the key
/// `inclusions`.
pub fn normalize_list_field(value: &Value, key: &str) -> Vec<String> {
    match value {
        Value::Object(map) => map.get(key).map(normalize_list).unwrap_or_default(),
        other => normalize_list(other),
    }
}

fn element_to_string(element: &Value) -> Option<String> {
    let text = match element {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn split_commas(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

/// Canonical ordered list of strings.
///
/// Deserializes from any JSON shape through [`normalize_list`] and never
/// fails; serializes as a plain array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct StringList(Vec<String>);

impl StringList {
    pub fn new(items: Vec<String>) -> Self {
        Self(normalize_list(&Value::Array(
            items.into_iter().map(Value::String).collect(),
        )))
    }

    pub fn into_inner(self) -> Vec<String> {
        self.0
    }
}

impl Deref for StringList {
    type Target = [String];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'de> Deserialize<'de> for StringList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self(normalize_list(&value)))
    }
}

impl From<Vec<&str>> for StringList {
    fn from(items: Vec<&str>) -> Self {
        Self::new(items.into_iter().map(str::to_string).collect())
    }
}

/// Deserialize an optional number that may arrive as a JSON number or as a
/// numeric string (`"1200"`, `" 4.5 "`). Empty strings and null become `None`.
pub fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    parse_number(&value).map_err(serde::de::Error::custom)
}

/// Integer variant of [`lenient_f64`]; fractional input is truncated.
pub fn lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(parse_number(&value)
        .map_err(serde::de::Error::custom)?
        .map(|n| n as i64))
}

/// Integer with `0` for null, empty or missing input.
pub fn lenient_i64_or_zero<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    Ok(lenient_i64(deserializer)?.unwrap_or(0))
}

/// `inclusions` list that may arrive wrapped as `{"inclusions": [...]}`.
pub fn inclusions_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<StringList, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(StringList(normalize_list_field(&value, "inclusions")))
}

/// `exclusions` list that may arrive wrapped as `{"exclusions": [...]}`.
pub fn exclusions_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<StringList, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(StringList(normalize_list_field(&value, "exclusions")))
}

/// List of structured items given either as an array or as a JSON-encoded
/// array string. Null, empty strings and other shapes yield an empty list;
/// malformed elements are an error.
pub fn lenient_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    let items = match value {
        Value::Array(items) => items,
        Value::String(s) if s.trim().is_empty() => return Ok(Vec::new()),
        Value::String(s) => match serde_json::from_str::<Value>(&s) {
            Ok(Value::Array(items)) => items,
            _ => return Err(serde::de::Error::custom("expected a JSON array")),
        },
        _ => return Ok(Vec::new()),
    };

    items
        .into_iter()
        .map(|item| serde_json::from_value(item).map_err(serde::de::Error::custom))
        .collect()
}

fn parse_number(value: &Value) -> Result<Option<f64>, String> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(n.as_f64()),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| format!("expected a number, got '{}'", s)),
        other => Err(format!("expected a number, got {}", other)),
    }
}
