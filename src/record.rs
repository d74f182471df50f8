use crate::body::Body;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "OUT")]
    Out,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::In => "IN",
            Direction::Out => "OUT",
        }
    }

    pub fn invert(self) -> Direction {
        match self {
            Direction::In => Direction::Out,
            Direction::Out => Direction::In,
        }
    }

    pub fn parse(value: &str) -> Option<Direction> {
        match value {
            "IN" => Some(Direction::In),
            "OUT" => Some(Direction::Out),
            _ => None,
        }
    }
}

/// Configuration-style input for building a [`Record`]. All defaulting is
/// silent; nothing here validates.
#[derive(Debug, Clone, Default)]
pub struct Base {
    pub connection_id: String,
    pub direction: Option<Direction>,
    pub protocol: Option<String>,
    pub path: String,
    pub body: Option<Body>,
}

impl Base {
    /// The body to serialize: absent bodies default to an empty object, an
    /// explicitly unset ([`Body::Undefined`]) body keeps a visible marker
    /// instead of losing the field.
    pub fn body_or_default(&self) -> Body {
        match &self.body {
            None => Body::object(),
            Some(Body::Undefined) => Body::String("undefined".to_string()),
            Some(body) => body.clone(),
        }
    }
}

/// The unit of logging, as persisted and as handed to the renderer.
#[derive(Debug, Clone, Serialize)]
pub struct Record {
    pub level: Level,
    #[serde(rename = "connectionId")]
    pub connection_id: String,
    pub direction: Direction,
    pub protocol: String,
    pub path: String,
    pub body: Value,
    pub timestamp: DateTime<Utc>,
    pub server: String,
}

impl Record {
    /// Stamp `timestamp` and `server` and apply the remaining defaults:
    /// direction OUT, protocol falling back to the level name when missing
    /// or empty.
    pub fn build(level: Level, base: &Base, body: Value, server: &str) -> Record {
        Record {
            level,
            connection_id: base.connection_id.clone(),
            direction: base.direction.unwrap_or(Direction::Out),
            protocol: base
                .protocol
                .clone()
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| level.as_str().to_string()),
            path: base.path.clone(),
            body,
            timestamp: Utc::now(),
            server: server.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_fill_in_silently() {
        let record = Record::build(Level::Info, &Base::default(), json!({}), "host-1");
        assert_eq!(record.direction, Direction::Out);
        assert_eq!(record.protocol, "info");
        assert_eq!(record.path, "");
        assert_eq!(record.connection_id, "");
        assert_eq!(record.server, "host-1");
    }

    #[test]
    fn empty_protocol_counts_as_unspecified() {
        let base = Base {
            protocol: Some(String::new()),
            ..Base::default()
        };
        let record = Record::build(Level::Error, &base, json!({}), "h");
        assert_eq!(record.protocol, "error");
    }

    #[test]
    fn unset_body_keeps_a_visible_marker() {
        let base = Base {
            body: Some(Body::Undefined),
            ..Base::default()
        };
        assert!(matches!(base.body_or_default(), Body::String(s) if s == "undefined"));
    }

    #[test]
    fn record_serializes_with_wire_keys() {
        let base = Base {
            connection_id: "abc123".to_string(),
            direction: Some(Direction::In),
            ..Base::default()
        };
        let record = Record::build(Level::Warn, &base, json!({"k": 1}), "h");
        let wire = serde_json::to_value(&record).unwrap();
        assert_eq!(wire["level"], json!("warn"));
        assert_eq!(wire["direction"], json!("IN"));
        assert_eq!(wire["connectionId"], json!("abc123"));
    }
}
