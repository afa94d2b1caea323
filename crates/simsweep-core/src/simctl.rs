//! Parsing for `xcrun simctl runtime list -j`.
//!
//! Different Xcode releases print the runtime list in different shapes:
//!
//! - an object with a `runtimes` (or `Runtimes`) array of runtime objects
//! - a flat object mapping runtime identifier to runtime object
//! - a bare array of runtime objects
//!
//! [`parse_simctl_runtime_list`] accepts all three. Entries without an
//! identifier are skipped rather than reported; only invalid JSON is an error.
//!
//! # Example
//!
//! ```
//! use simsweep_core::simctl::parse_simctl_runtime_list;
//!
//! let json = r#"{"runtimes": [{"identifier": "com.apple.CoreSimulator.SimRuntime.iOS-18-6", "name": "iOS 18.6"}]}"#;
//! let runtimes = parse_simctl_runtime_list(json).unwrap();
//! assert_eq!(runtimes[0].name, "iOS 18.6");
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors from reading the runtime list.
#[derive(Error, Debug)]
pub enum RuntimeListError {
    /// The output was not JSON.
    #[error("Failed to parse simctl runtime list: {0}")]
    JsonParse(#[from] serde_json::Error),
}

/// One installed simulator runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeInfo {
    /// Reverse-DNS identifier, e.g. `com.apple.CoreSimulator.SimRuntime.iOS-18-6`. Never empty.
    pub identifier: String,
    /// Display name, `"Unknown"` when absent.
    pub name: String,
    /// OS version string.
    pub version: String,
    /// Build string.
    pub build: String,
    /// Runtime state as reported by simctl (e.g. `Ready`).
    pub state: String,
    /// On-disk size in bytes, 0 when unknown.
    pub size_bytes: u64,
}

type Fields = Map<String, Value>;

fn objects(items: Vec<Value>) -> Vec<Fields> {
    items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(fields) => Some(fields),
            _ => None,
        })
        .collect()
}

/// Normalizes every accepted top-level shape into a list of raw field maps.
fn runtime_entries(payload: Value) -> Vec<Fields> {
    match payload {
        Value::Object(mut map) => {
            for key in ["runtimes", "Runtimes"] {
                if let Some(Value::Array(_)) = map.get(key) {
                    if let Some(Value::Array(items)) = map.remove(key) {
                        return objects(items);
                    }
                }
            }
            map.into_iter()
                .filter_map(|(runtime_id, info)| match info {
                    Value::Object(mut fields) => {
                        // An explicit identifier inside the entry wins over the mapping key.
                        fields
                            .entry("identifier")
                            .or_insert(Value::String(runtime_id));
                        Some(fields)
                    }
                    _ => None,
                })
                .collect()
        }
        Value::Array(items) => objects(items),
        _ => Vec::new(),
    }
}

fn non_empty_str<'a>(fields: &'a Fields, key: &str) -> Option<&'a str> {
    fields
        .get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
}

fn size_field(fields: &Fields, key: &str) -> Option<u64> {
    match fields.get(key)? {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| number.as_f64().filter(|f| *f > 0.0).map(|f| f as u64)),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
    .filter(|size| *size > 0)
}

fn runtime_from_fields(fields: &Fields) -> Option<RuntimeInfo> {
    let identifier = non_empty_str(fields, "identifier").or_else(|| non_empty_str(fields, "id"))?;
    Some(RuntimeInfo {
        identifier: identifier.to_string(),
        name: fields
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("Unknown")
            .to_string(),
        version: fields
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        build: non_empty_str(fields, "build")
            .or_else(|| non_empty_str(fields, "buildversion"))
            .unwrap_or_default()
            .to_string(),
        state: fields
            .get("state")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        size_bytes: size_field(fields, "sizeBytes")
            .or_else(|| size_field(fields, "bundleSize"))
            .unwrap_or(0),
    })
}

/// Parses already-decoded runtime list JSON.
pub fn runtimes_from_value(payload: Value) -> Vec<RuntimeInfo> {
    runtime_entries(payload)
        .iter()
        .filter_map(runtime_from_fields)
        .collect()
}

/// Parses `xcrun simctl runtime list -j` output.
///
/// # Errors
///
/// [`RuntimeListError::JsonParse`] if `text` is not valid JSON. Valid JSON in
/// an unexpected shape yields an empty list, not an error.
pub fn parse_simctl_runtime_list(text: &str) -> Result<Vec<RuntimeInfo>, RuntimeListError> {
    let payload: Value = serde_json::from_str(text)?;
    Ok(runtimes_from_value(payload))
}
