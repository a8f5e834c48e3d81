//! Typed reads over loosely shaped marketplace payloads.
//!
//! Every optional field is read through an ordered list of candidate
//! `(payload, path)` pairs; the first candidate that resolves to a usable
//! value wins. Paths are dot separated, numeric segments index arrays, and an
//! empty path names the payload itself.

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Conversion from a JSON node, rejecting nulls, empty strings and
/// values of the wrong shape.
pub trait FromJson: Sized {
    fn from_json(value: &Value) -> Option<Self>;
}

impl FromJson for String {
    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

impl FromJson for f64 {
    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl FromJson for i64 {
    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl FromJson for bool {
    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(*b),
            Value::String(s) if s.eq_ignore_ascii_case("true") => Some(true),
            Value::String(s) if s.eq_ignore_ascii_case("false") => Some(false),
            _ => None,
        }
    }
}

impl FromJson for DateTime<Utc> {
    fn from_json(value: &Value) -> Option<Self> {
        let raw = value.as_str()?;
        DateTime::parse_from_rfc3339(raw.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

impl FromJson for Value {
    fn from_json(value: &Value) -> Option<Self> {
        (!value.is_null()).then(|| value.clone())
    }
}

/// Walk `path` from `root`. Nulls count as absent.
pub fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let node = if path.is_empty() {
        root
    } else {
        path.split('.').try_fold(root, |node, segment| match node {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })?
    };
    (!node.is_null()).then_some(node)
}

/// Typed read of a single path.
pub fn get<T: FromJson>(root: &Value, path: &str) -> Option<T> {
    lookup(root, path).and_then(T::from_json)
}

/// Typed read from a payload that may be missing.
pub fn get_opt<T: FromJson>(root: Option<&Value>, path: &str) -> Option<T> {
    root.and_then(|r| get(r, path))
}

/// First candidate that yields a usable `T`. Missing payloads are skipped.
pub fn first_present<T: FromJson>(candidates: &[(Option<&Value>, &str)]) -> Option<T> {
    candidates
        .iter()
        .find_map(|(root, path)| root.and_then(|r| get(r, path)))
}

/// First candidate that resolves to an array; empty when none does.
pub fn first_array<'a>(candidates: &[(Option<&'a Value>, &str)]) -> &'a [Value] {
    candidates
        .iter()
        .find_map(|(root, path)| {
            root.and_then(|r| lookup(r, path))
                .and_then(Value::as_array)
                .map(Vec::as_slice)
        })
        .unwrap_or(&[])
}

/// All non-empty strings of an array node.
pub fn strings(root: Option<&Value>, path: &str) -> Vec<String> {
    first_array(&[(root, path)])
        .iter()
        .filter_map(String::from_json)
        .collect()
}
