//! Natural idempotency keys for scheduled casts.
//!
//! Two scheduling attempts with the same template and arguments must collapse
//! onto one job, so the key has to come out identical no matter how the
//! argument object was assembled.

use serde_json::Value;

use crate::schema::CastTemplate;

/// Serialize `value` with object keys sorted lexicographically at every level.
///
/// Key insertion order never changes the output, so logically identical
/// arguments always produce the same string.
pub fn stable_serialize(value: &Value) -> String {
    let mut out = String::new();
    write_value(value, &mut out);
    out
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            out.push('{');
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_value(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

/// Derive the natural key for a `(template, payload args)` pair.
pub fn job_key(template: CastTemplate, payload_args: &Value) -> String {
    format!("{}:{}", template.as_str(), stable_serialize(payload_args))
}
