use crate::body::{Body, BodyMap};
use crate::error::LoggedError;
use crate::record::{Base, Direction};
use serde_json::{json, Value};

/// One free-form argument of a warn/error call.
#[derive(Debug, Clone)]
pub enum Arg {
    /// Error-like object; the first one becomes the call's error.
    Error(LoggedError),
    /// Base-record hint; the first one seeds connection id, direction,
    /// protocol, path and body.
    Base(Base),
    /// Classified by the string rules below.
    Str(String),
    /// Anything else ends up in the body as extra data.
    Value(Body),
}

impl From<LoggedError> for Arg {
    fn from(value: LoggedError) -> Arg {
        Arg::Error(value)
    }
}

impl From<Base> for Arg {
    fn from(value: Base) -> Arg {
        Arg::Base(value)
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Arg {
        Arg::Str(value.to_string())
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Arg {
        Arg::Str(value)
    }
}

impl From<Body> for Arg {
    fn from(value: Body) -> Arg {
        Arg::Value(value)
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Arg {
        Arg::Value(Body::from(value))
    }
}

/// Build a warn/error argument list without spelling out [`Arg`]
/// conversions at the call site.
#[macro_export]
macro_rules! args {
    ($($arg:expr),* $(,)?) => {
        vec![$($crate::classify::Arg::from($arg)),*]
    };
}

/// Role a string argument plays in the merged record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StringRole {
    Direction(Direction),
    Message,
    Protocol,
    Path,
    Extra,
}

/// Ordered string-classification rules. First match wins:
/// literal IN/OUT, then the error message while it is still empty, then a
/// short all-uppercase protocol tag, then the first path-looking string,
/// then extra data.
pub(crate) fn classify_string(value: &str, message_set: bool, path_set: bool) -> StringRole {
    if let Some(direction) = Direction::parse(value) {
        return StringRole::Direction(direction);
    }
    if !message_set {
        return StringRole::Message;
    }
    if value.chars().count() < 5 && value.to_uppercase() == value {
        return StringRole::Protocol;
    }
    if !path_set && (value.contains(':') || value.contains('/')) {
        return StringRole::Path;
    }
    StringRole::Extra
}

/// Partition a free-form argument list into a merged [`Base`] plus the
/// (possibly synthesized) error, normalized and marked as logged.
pub fn format_args(args: Vec<Arg>) -> (Base, LoggedError) {
    let mut rest = args;

    let mut error = match take_first(&mut rest, |a| matches!(a, Arg::Error(_))) {
        Some(Arg::Error(e)) => e,
        _ => LoggedError::new(""),
    };

    let hint = match take_first(&mut rest, |a| matches!(a, Arg::Base(_))) {
        Some(Arg::Base(b)) => Some(b),
        _ => None,
    };
    let had_hint = hint.is_some();
    let hint = hint.unwrap_or_default();

    let connection_id = hint.connection_id;
    let mut direction = hint.direction.unwrap_or(Direction::In);
    let mut protocol = hint.protocol.filter(|p| !p.is_empty());
    let mut path = hint.path;
    let body = hint_body(hint.body);

    let mut leftover = Vec::new();
    for arg in rest {
        let Arg::Str(value) = arg else {
            leftover.push(arg);
            continue;
        };
        match classify_string(&value, !error.message().is_empty(), !path.is_empty()) {
            StringRole::Direction(d) => direction = d,
            StringRole::Message => error.set_message(value),
            StringRole::Protocol => protocol = Some(value),
            StringRole::Path => path = value,
            StringRole::Extra => push_extra_string(&body, value),
        }
    }

    let stack: Vec<Value> = error
        .stack()
        .iter()
        .filter(|line| !line.contains(file!()))
        .map(|line| Value::String(line.clone()))
        .collect();
    body.lock()
        .insert("stack".to_string(), Body::from(Value::Array(stack)));

    for (key, attachment) in [
        ("query", error.query.clone()),
        ("param", error.param.clone()),
        ("formatted", error.formatted.clone()),
    ] {
        if let Some(value) = attachment {
            body.lock().insert(key.to_string(), Body::from(value));
        }
    }

    if !body.lock().contains_key("code") {
        let code = error
            .code
            .clone()
            .filter(|c| !c.is_empty())
            .or_else(|| Some(error.message().to_string()).filter(|m| !m.is_empty()))
            .unwrap_or_else(|| path.clone());
        body.lock().insert("code".to_string(), Body::String(code));
    }

    if leftover.len() == 1 {
        let value = arg_to_body(leftover.remove(0));
        if had_hint {
            body.lock().insert("extra".to_string(), value);
        } else if let Body::Object(map) = value {
            let entries: Vec<(String, Body)> = map
                .lock()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            let mut guard = body.lock();
            for (key, item) in entries {
                guard.insert(key, item);
            }
        }
    } else if leftover.len() > 1 {
        let mut guard = body.lock();
        for (i, arg) in leftover.into_iter().enumerate() {
            guard.insert(i.to_string(), arg_to_body(arg));
        }
    }

    if error.message().is_empty() {
        if let Some(Body::String(code)) = body.lock().get("code").cloned() {
            error.set_message(code);
        }
    }

    error.mark_logged();

    let base = Base {
        connection_id,
        direction: Some(direction),
        protocol,
        path,
        body: Some(Body::Object(body)),
    };
    (base, error)
}

fn take_first(args: &mut Vec<Arg>, pred: impl Fn(&Arg) -> bool) -> Option<Arg> {
    let idx = args.iter().position(pred)?;
    Some(args.remove(idx))
}

/// Hint bodies are mutated in place, so the classifier works on the
/// caller's own object node when one was provided.
fn hint_body(body: Option<Body>) -> BodyMap {
    match body {
        Some(Body::Object(map)) => map,
        Some(Body::Undefined) | None => crate::body::new_map(),
        Some(other) => {
            let map = crate::body::new_map();
            map.lock().insert("value".to_string(), other);
            map
        }
    }
}

fn push_extra_string(body: &BodyMap, value: String) {
    let mut guard = body.lock();
    let entry = guard
        .entry("strings".to_string())
        .or_insert_with(|| Body::Array(Vec::new()));
    if let Body::Array(items) = entry {
        items.push(Body::String(value));
    }
}

fn arg_to_body(arg: Arg) -> Body {
    match arg {
        Arg::Value(body) => body,
        Arg::Str(value) => Body::String(value),
        Arg::Error(e) => Body::from(json!({
            "message": e.message(),
            "code": e.code,
        })),
        // Additional base hints past the first are kept as plain data.
        Arg::Base(b) => Body::from(json!({
            "connectionId": b.connection_id,
            "direction": b.direction.map(|d| d.as_str()),
            "protocol": b.protocol,
            "path": b.path,
        })),
    }
}
