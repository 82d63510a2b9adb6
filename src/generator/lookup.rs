//! JSON-path post-processing of retrieved values
//!
//! When a token carries a key path (`|a.b.c`), the retrieved value is treated
//! as JSON and the sub-value under `$..a.b.c` is extracted. Values that are
//! not JSON pass through unchanged; an ambiguous or missing match yields an
//! empty string.

use crate::domain::ParsedToken;
use serde_json_path::JsonPath;
use tracing::debug;

/// Extract the key-path sub-value from a retrieved value
///
/// Rules, in order:
/// - no key path on the token: value unchanged
/// - value is not valid JSON, or the key path is not a valid query: value
///   unchanged
/// - exactly one match of string kind: the unquoted string
/// - exactly one match of any other kind: its JSON stringification
/// - zero or multiple matches: empty string
pub(crate) fn key_path_lookup(token: &ParsedToken, value: &str) -> String {
    let key_path = token.key_path();
    if key_path.is_empty() {
        return value.to_string();
    }

    let Ok(json) = serde_json::from_str::<serde_json::Value>(value) else {
        debug!(token = %token, "value is not valid JSON, returning as is");
        return value.to_string();
    };

    let query = format!("$..{}", key_path);
    let Ok(path) = JsonPath::parse(&query) else {
        debug!(token = %token, query = %query, "invalid key path query, returning value as is");
        return value.to_string();
    };

    let nodes = path.query(&json).all();
    match nodes.as_slice() {
        [node] => match node {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        },
        _ => {
            debug!(token = %token, matches = nodes.len(), "no single value found at key path");
            String::new()
        }
    }
}
