use crate::body::Body;
use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;

/// Serialized info bodies above this size get shallow-truncated.
pub const MAX_INFO_BYTES: usize = 512 * 1024;

/// Longest string field the store accepts before the oversized-field retry
/// shortens it.
pub const MAX_FIELD_CHARS: usize = 1000;

pub const TRUNCATED_MARKER: &str = "TRUNCATED";

#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("circular structure in payload")]
    Circular,
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Resolve a [`Body`] into an acyclic [`Value`] and its serialized text.
///
/// A direct pass is tried first; it fails only when the payload contains a
/// true cycle. On that failure the substitution pass runs instead: any
/// object node seen a second time becomes `"[Circular->" + key + "]"` (key
/// at the second encounter) and callable leaves become
/// `"<Constructor> <name>()"`. Whatever comes out is what the record keeps,
/// so downstream consumers never see cycles. Any other serialization error
/// propagates.
pub fn safe_serialize(body: &Body, pretty: bool) -> Result<(String, Value), SerializeError> {
    let value = resolve(body)?;
    let text = if pretty {
        serde_json::to_string_pretty(&value)?
    } else {
        serde_json::to_string(&value)?
    };
    Ok((text, value))
}

/// Resolve a [`Body`] into an acyclic [`Value`], falling back to the
/// substitution pass on cycles.
pub fn resolve(body: &Body) -> Result<Value, SerializeError> {
    let mut path = Vec::new();
    match resolve_direct(body, &mut path) {
        Ok(Some(value)) => Ok(value),
        // Undefined or callable at the root serializes as null.
        Ok(None) => Ok(Value::Null),
        Err(SerializeError::Circular) => {
            let mut seen = HashSet::new();
            Ok(substitute(body, "", &mut seen))
        }
        Err(e) => Err(e),
    }
}

/// Direct pass. `None` marks a value that is dropped from objects and
/// nulled inside arrays (undefined and callable leaves). Fails with
/// [`SerializeError::Circular`] when an object node repeats on the current
/// path.
fn resolve_direct(body: &Body, path: &mut Vec<usize>) -> Result<Option<Value>, SerializeError> {
    match body {
        Body::Null => Ok(Some(Value::Null)),
        Body::Undefined | Body::Callable { .. } => Ok(None),
        Body::Bool(b) => Ok(Some(Value::Bool(*b))),
        Body::Number(n) => Ok(Some(Value::Number(n.clone()))),
        Body::String(s) => Ok(Some(Value::String(s.clone()))),
        Body::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(resolve_direct(item, path)?.unwrap_or(Value::Null));
            }
            Ok(Some(Value::Array(out)))
        }
        Body::Object(map) => {
            let addr = std::sync::Arc::as_ptr(map) as usize;
            if path.contains(&addr) {
                return Err(SerializeError::Circular);
            }
            path.push(addr);
            let guard = map.lock();
            let mut out = serde_json::Map::new();
            for (key, value) in guard.iter() {
                if let Some(resolved) = resolve_direct(value, path)? {
                    out.insert(key.clone(), resolved);
                }
            }
            drop(guard);
            path.pop();
            Ok(Some(Value::Object(out)))
        }
    }
}

/// Substitution pass: tolerates cycles and shared subtrees by replacing any
/// object node encountered twice with a reference token.
fn substitute(body: &Body, key: &str, seen: &mut HashSet<usize>) -> Value {
    match body {
        Body::Null | Body::Undefined => Value::Null,
        Body::Bool(b) => Value::Bool(*b),
        Body::Number(n) => Value::Number(n.clone()),
        Body::String(s) => Value::String(s.clone()),
        Body::Callable { constructor, name } => Value::String(format!("{constructor} {name}()")),
        Body::Array(items) => Value::Array(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| substitute(item, &i.to_string(), seen))
                .collect(),
        ),
        Body::Object(map) => {
            let addr = std::sync::Arc::as_ptr(map) as usize;
            if !seen.insert(addr) {
                return Value::String(format!("[Circular->{key}]"));
            }
            let guard = map.lock();
            Value::Object(
                guard
                    .iter()
                    .map(|(k, v)| (k.clone(), substitute(v, k, seen)))
                    .collect(),
            )
        }
    }
}

/// Size guard for the info path: object-valued fields of a plain-object
/// body collapse to the truncation marker, scalar fields stay intact; any
/// other body shape is replaced wholesale.
pub fn shallow_truncate(body: &mut Value) {
    match body {
        Value::Object(map) => {
            for value in map.values_mut() {
                if value.is_object() {
                    *value = Value::String(TRUNCATED_MARKER.to_string());
                }
            }
        }
        other => *other = Value::String(TRUNCATED_MARKER.to_string()),
    }
}

/// Cap every string in the tree at `max` characters, appending an ellipsis
/// and the truncation marker. Used by the oversized-field retry.
pub fn truncate_long_strings(body: &mut Value, max: usize) {
    match body {
        Value::String(s) => {
            if s.chars().count() > max {
                let mut capped: String = s.chars().take(max).collect();
                capped.push_str("...");
                capped.push_str(TRUNCATED_MARKER);
                *s = capped;
            }
        }
        Value::Array(items) => {
            for item in items {
                truncate_long_strings(item, max);
            }
        }
        Value::Object(map) => {
            for value in map.values_mut() {
                truncate_long_strings(value, max);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_bodies_pass_through() {
        let body = Body::from(json!({"a": 1, "b": "two"}));
        let (text, value) = safe_serialize(&body, false).unwrap();
        assert_eq!(value, json!({"a": 1, "b": "two"}));
        assert_eq!(text, serde_json::to_string(&value).unwrap());
    }

    #[test]
    fn self_reference_becomes_token() {
        let root = Body::object();
        root.set("name", "cyclic");
        root.set("self", root.clone());

        let (_, value) = safe_serialize(&root, false).unwrap();
        assert_eq!(value["self"], json!("[Circular->self]"));
        assert_eq!(value["name"], json!("cyclic"));
        // the resolved value is fully acyclic and re-serializable
        serde_json::to_string(&value).unwrap();
    }

    #[test]
    fn shared_subtree_is_tokenized_on_second_encounter() {
        let shared = Body::object();
        shared.set("k", 1i64);
        let root = Body::object();
        root.set("a", shared.clone());
        root.set("b", shared.clone());
        // a cycle somewhere forces the substitution pass over everything
        root.set("loop", root.clone());

        let (_, value) = safe_serialize(&root, false).unwrap();
        assert_eq!(value["a"], json!({"k": 1}));
        assert_eq!(value["b"], json!("[Circular->b]"));
    }

    #[test]
    fn callables_render_as_signature_in_substitution_pass() {
        let root = Body::object();
        root.set(
            "cb",
            Body::Callable {
                constructor: "Function".to_string(),
                name: "handler".to_string(),
            },
        );
        root.set("self", root.clone());

        let (_, value) = safe_serialize(&root, false).unwrap();
        assert_eq!(value["cb"], json!("Function handler()"));
    }

    #[test]
    fn callables_are_dropped_on_the_direct_pass() {
        let root = Body::object();
        root.set(
            "cb",
            Body::Callable {
                constructor: "Function".to_string(),
                name: "handler".to_string(),
            },
        );
        root.set("kept", true);

        let (_, value) = safe_serialize(&root, false).unwrap();
        assert_eq!(value, json!({"kept": true}));
    }

    #[test]
    fn undefined_is_omitted_from_objects_and_nulled_in_arrays() {
        let root = Body::object();
        root.set("gone", Body::Undefined);
        root.set("list", Body::Array(vec![Body::Undefined, Body::Bool(true)]));

        let (_, value) = safe_serialize(&root, false).unwrap();
        assert_eq!(value, json!({"list": [null, true]}));
    }

    #[test]
    fn shallow_truncate_keeps_scalars() {
        let mut body = json!({"big": {"nested": "x"}, "small": 7, "list": [1, 2]});
        shallow_truncate(&mut body);
        assert_eq!(body, json!({"big": "TRUNCATED", "small": 7, "list": [1, 2]}));
    }

    #[test]
    fn shallow_truncate_replaces_non_objects() {
        let mut body = json!("a".repeat(8));
        shallow_truncate(&mut body);
        assert_eq!(body, json!("TRUNCATED"));
    }

    #[test]
    fn long_strings_are_capped_with_marker() {
        let mut body = json!({"field": "x".repeat(1500), "short": "ok"});
        truncate_long_strings(&mut body, MAX_FIELD_CHARS);
        let capped = body["field"].as_str().unwrap();
        assert_eq!(capped.len(), MAX_FIELD_CHARS + "...TRUNCATED".len());
        assert!(capped.ends_with("...TRUNCATED"));
        assert_eq!(body["short"], json!("ok"));
    }
}
