use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Shared, internally mutable object node of a [`Body`] tree.
///
/// Object nodes are reference counted so a caller can build payload graphs
/// that point back at themselves; the safe serializer detects the repeat by
/// pointer identity and substitutes a reference token instead of recursing
/// forever.
pub type BodyMap = Arc<Mutex<BTreeMap<String, Body>>>;

/// Structured payload handed to the logger.
///
/// Mirrors the JSON data model plus two extra leaves: `Undefined`, which is
/// omitted from objects and nulled inside arrays, and `Callable`, which is
/// rendered as a textual signature when the substitution pass runs.
#[derive(Clone, Debug)]
pub enum Body {
    Null,
    Undefined,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Array(Vec<Body>),
    Object(BodyMap),
    Callable { constructor: String, name: String },
}

pub(crate) fn new_map() -> BodyMap {
    Arc::new(Mutex::new(BTreeMap::new()))
}

impl Body {
    /// Empty object node.
    pub fn object() -> Body {
        Body::Object(new_map())
    }

    pub fn object_from<K, V, I>(entries: I) -> Body
    where
        K: Into<String>,
        V: Into<Body>,
        I: IntoIterator<Item = (K, V)>,
    {
        let map: BTreeMap<String, Body> = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Body::Object(Arc::new(Mutex::new(map)))
    }

    pub fn as_object(&self) -> Option<&BodyMap> {
        match self {
            Body::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Insert a key into an object node. No-op on any other variant.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Body>) {
        if let Body::Object(map) = self {
            map.lock().insert(key.into(), value.into());
        }
    }
}

impl From<Value> for Body {
    fn from(value: Value) -> Body {
        match value {
            Value::Null => Body::Null,
            Value::Bool(b) => Body::Bool(b),
            Value::Number(n) => Body::Number(n),
            Value::String(s) => Body::String(s),
            Value::Array(items) => Body::Array(items.into_iter().map(Body::from).collect()),
            Value::Object(map) => {
                Body::object_from(map.into_iter().map(|(k, v)| (k, Body::from(v))))
            }
        }
    }
}

impl From<&str> for Body {
    fn from(value: &str) -> Body {
        Body::String(value.to_string())
    }
}

impl From<String> for Body {
    fn from(value: String) -> Body {
        Body::String(value)
    }
}

impl From<bool> for Body {
    fn from(value: bool) -> Body {
        Body::Bool(value)
    }
}

impl From<i64> for Body {
    fn from(value: i64) -> Body {
        Body::Number(value.into())
    }
}

impl From<u64> for Body {
    fn from(value: u64) -> Body {
        Body::Number(value.into())
    }
}

impl From<f64> for Body {
    fn from(value: f64) -> Body {
        match serde_json::Number::from_f64(value) {
            Some(n) => Body::Number(n),
            None => Body::Null,
        }
    }
}

impl From<Vec<Body>> for Body {
    fn from(value: Vec<Body>) -> Body {
        Body::Array(value)
    }
}
