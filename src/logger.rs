use crate::body::Body;
use crate::classify::{self, Arg};
use crate::env;
use crate::error::LoggedError;
use crate::record::{Base, Level, Record};
use crate::render::{NoopRenderer, Renderer};
use crate::serialize::{resolve, safe_serialize, shallow_truncate, SerializeError, MAX_INFO_BYTES};
use crate::session::{random_token, Session, SessionConfig};
use crate::sink::DurableSink;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct LoggerConfig {
    /// Host identifier stamped on every record.
    pub server: String,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        LoggerConfig {
            server: env::env_or(env::SERVER_NAME_ENV, &env::env_or("HOSTNAME", "localhost")),
        }
    }
}

/// The logging front-end.
///
/// Cheap to clone; all clones share the same durable sink and renderer.
/// Construct one per process (or one per test) and inject it where records
/// are produced.
#[derive(Clone)]
pub struct Logger {
    inner: Arc<Inner>,
}

struct Inner {
    sink: DurableSink,
    renderer: Arc<dyn Renderer>,
    server: String,
}

impl Logger {
    pub fn new(sink: DurableSink, config: LoggerConfig) -> Logger {
        Logger::with_renderer(sink, Arc::new(NoopRenderer), config)
    }

    pub fn with_renderer(
        sink: DurableSink,
        renderer: Arc<dyn Renderer>,
        config: LoggerConfig,
    ) -> Logger {
        Logger {
            inner: Arc::new(Inner {
                sink,
                renderer,
                server: config.server,
            }),
        }
    }

    /// Log a plain info record.
    pub fn info(&self, base: Base) -> Result<(), SerializeError> {
        self.info_inner(base, None)
    }

    /// Info variant for callers that already hold the serialized body and
    /// want to spare a second stringify.
    pub fn info_with_serialized(
        &self,
        base: Base,
        serialized: String,
    ) -> Result<(), SerializeError> {
        self.info_inner(base, Some(serialized))
    }

    /// Debug helper: logs the given values under protocol "DUMP" and path
    /// "debug-var".
    pub fn dump(&self, mut values: Vec<Body>) -> Result<(), SerializeError> {
        let body = match values.len() {
            0 => Body::object(),
            1 => values.remove(0),
            _ => Body::Array(values),
        };
        let base = Base {
            protocol: Some("DUMP".to_string()),
            path: "debug-var".to_string(),
            body: Some(body),
            ..Base::default()
        };
        self.info(base)
    }

    /// Classify free-form arguments into a warn record. Returns the
    /// normalized error, marked as logged, so the caller may rethrow or
    /// drop it.
    pub fn warn(&self, args: Vec<Arg>) -> LoggedError {
        self.report(Level::Warn, args)
    }

    /// Like [`Logger::warn`] at error level.
    pub fn error(&self, args: Vec<Arg>) -> LoggedError {
        self.report(Level::Error, args)
    }

    /// Open a correlated session: emits the initial info record, then hands
    /// back a facade whose calls flip the direction against the same
    /// correlation id.
    pub fn session(&self, config: SessionConfig) -> Result<Session, SerializeError> {
        self.session_inner(config, None)
    }

    pub fn session_with_serialized(
        &self,
        config: SessionConfig,
        serialized: String,
    ) -> Result<Session, SerializeError> {
        self.session_inner(config, Some(serialized))
    }

    fn session_inner(
        &self,
        config: SessionConfig,
        pre: Option<String>,
    ) -> Result<Session, SerializeError> {
        let connection_id = config
            .connection_id
            .clone()
            .unwrap_or_else(random_token);
        let base = Base {
            connection_id: connection_id.clone(),
            direction: Some(config.direction),
            protocol: Some(config.protocol.clone()),
            path: config.path.clone(),
            body: config.body.clone(),
        };
        self.info_inner(base, pre)?;
        Ok(Session::new(self.clone(), &config, connection_id))
    }

    fn info_inner(&self, base: Base, pre: Option<String>) -> Result<(), SerializeError> {
        let body = base.body_or_default();
        let mut value = resolve(&body)?;
        let text = match pre {
            Some(text) => text,
            None => serde_json::to_string(&value)?,
        };
        // Size guard, info path only: the renderer still sees the full
        // text, the persisted body loses its nested objects.
        if text.len() > MAX_INFO_BYTES {
            shallow_truncate(&mut value);
        }
        let record = Record::build(Level::Info, &base, value, &self.inner.server);
        self.dispatch(record, &text);
        Ok(())
    }

    fn report(&self, level: Level, args: Vec<Arg>) -> LoggedError {
        let (base, err) = classify::format_args(args);
        let body = base.body_or_default();
        match safe_serialize(&body, true) {
            Ok((text, value)) => {
                let record = Record::build(level, &base, value, &self.inner.server);
                self.dispatch(record, &text);
            }
            Err(e) => eprintln!("log serialization failed: {e}"),
        }
        err
    }

    fn dispatch(&self, record: Record, serialized: &str) {
        self.inner.renderer.render(&record, serialized);
        self.inner.sink.insert(record);
    }
}
