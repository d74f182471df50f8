use crate::record::Record;

/// Consumer of finished records on the human-facing side.
///
/// The logger hands every record plus its pre-serialized body string to the
/// renderer; color, width truncation and time formatting all live behind
/// this boundary and never touch the durable path.
pub trait Renderer: Send + Sync {
    fn render(&self, record: &Record, serialized: &str);
}

/// A renderer that simply drops everything.
///
/// Useful for measuring the overhead of the logging path itself and for
/// unit tests that only care about persistence.
#[derive(Clone, Default)]
pub struct NoopRenderer;

impl Renderer for NoopRenderer {
    fn render(&self, _record: &Record, _serialized: &str) {}
}
