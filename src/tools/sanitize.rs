//! Argument sanitization for model-issued tool calls.
//!
//! The model's structured output is unreliable: wrong JSON types, placeholder
//! tokens standing in for intentionally-omitted identifiers, stray keys.
//! Sanitization absorbs that noise before strict schema validation runs, so
//! a validation failure afterwards signals a genuine contract violation.

use serde_json::{Map, Value};

/// Placeholder tokens the model emits for "no value". Compared after
/// trimming, case-insensitively.
const PLACEHOLDER_TOKENS: &[&str] = &["", "null", "none", "nil", "<null>", "<none>", "<nil>"];

/// Sanitize raw tool arguments against the tool's parameter schema.
///
/// Pure and idempotent: applying it twice yields the same map. Per declared
/// parameter: fill defaults, absorb placeholders to null, coerce mistyped
/// scalars, clamp declared numeric bounds, and finally drop undeclared keys.
pub fn sanitize_args(schema: &Value, raw: &Value) -> Map<String, Value> {
    let props = match schema.get("properties").and_then(|p| p.as_object()) {
        Some(p) => p,
        None => return Map::new(),
    };

    let mut clean = raw.as_object().cloned().unwrap_or_default();

    // Fill schema defaults for absent parameters
    for (key, prop) in props {
        if !clean.contains_key(key) {
            if let Some(default) = prop.get("default") {
                clean.insert(key.clone(), default.clone());
            }
        }
    }

    for (key, prop) in props {
        let value = match clean.get(key) {
            Some(v) => v.clone(),
            None => continue,
        };
        if value.is_null() {
            continue;
        }

        // Placeholder string -> explicit absence
        if let Some(s) = value.as_str() {
            let token = s.trim().to_lowercase();
            if PLACEHOLDER_TOKENS.contains(&token.as_str()) {
                clean.insert(key.clone(), Value::Null);
                continue;
            }
        }

        let expected = declared_type(prop);

        match expected {
            Some("integer") => {
                if let Some(s) = value.as_str() {
                    if let Ok(i) = s.trim().parse::<i64>() {
                        clean.insert(key.clone(), Value::from(i));
                    }
                }
                if let Some(i) = clean.get(key).and_then(Value::as_i64) {
                    let clamped = clamp_i64(i, prop);
                    clean.insert(key.clone(), Value::from(clamped));
                }
            }
            Some("number") => {
                if let Some(s) = value.as_str() {
                    if let Ok(f) = s.trim().replace(',', ".").parse::<f64>() {
                        clean.insert(key.clone(), Value::from(f));
                    }
                }
                if let Some(f) = clean.get(key).and_then(Value::as_f64) {
                    let clamped = clamp_f64(f, prop);
                    clean.insert(key.clone(), Value::from(clamped));
                }
            }
            Some("boolean") => {
                if let Some(s) = value.as_str() {
                    match s.trim().to_lowercase().as_str() {
                        "true" | "1" | "yes" | "y" => {
                            clean.insert(key.clone(), Value::Bool(true));
                        }
                        "false" | "0" | "no" | "n" => {
                            clean.insert(key.clone(), Value::Bool(false));
                        }
                        _ => {}
                    }
                }
            }
            Some("string") => {
                if value.is_number() || value.is_boolean() {
                    clean.insert(key.clone(), Value::String(value.to_string()));
                }
            }
            _ => {}
        }
    }

    // Drop keys the schema does not declare
    clean.retain(|k, _| props.contains_key(k));

    clean
}

/// Resolve the declared type for a property, collapsing `[T, "null"]` unions
/// to the sole non-null branch when unambiguous.
fn declared_type(prop: &Value) -> Option<&str> {
    match prop.get("type") {
        Some(Value::String(t)) => Some(t.as_str()),
        Some(Value::Array(types)) => {
            let non_null: Vec<&str> = types
                .iter()
                .filter_map(|t| t.as_str())
                .filter(|t| *t != "null")
                .collect();
            if non_null.len() == 1 {
                Some(non_null[0])
            } else {
                None
            }
        }
        _ => None,
    }
}

fn clamp_i64(v: i64, prop: &Value) -> i64 {
    let mut out = v;
    if let Some(min) = prop.get("minimum").and_then(Value::as_i64) {
        out = out.max(min);
    }
    if let Some(max) = prop.get("maximum").and_then(Value::as_i64) {
        out = out.min(max);
    }
    out
}

fn clamp_f64(v: f64, prop: &Value) -> f64 {
    let mut out = v;
    if let Some(min) = prop.get("minimum").and_then(Value::as_f64) {
        out = out.max(min);
    }
    if let Some(max) = prop.get("maximum").and_then(Value::as_f64) {
        out = out.min(max);
    }
    out
}
