//! Deterministic request fingerprinting.
//!
//! A fingerprint is `"{endpoint}:{canonical_params}"` where the canonical
//! form serializes object keys in sorted order at every nesting level.
//! Identical logical requests therefore always produce the same fingerprint
//! regardless of parameter ordering, and distinct parameter sets never
//! collide (canonical serialization, not a hash).

use serde_json::Value;

/// Compute the cache fingerprint for a request.
pub fn fingerprint(endpoint: &str, params: &Value) -> String {
    let mut out = String::with_capacity(endpoint.len() + 16);
    out.push_str(endpoint);
    out.push(':');
    write_canonical(params, &mut out);
    out
}

/// Serialize a JSON value with object keys sorted recursively.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Key escaping via serde_json keeps the form valid JSON.
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}
