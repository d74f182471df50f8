use serde_json::Value;
use std::backtrace::Backtrace;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Caller-facing error shape accepted (and returned) by the warn/error
/// entry points.
///
/// The classifier normalizes it, copies its attachments into the record
/// body and marks it as logged. The flag is shared across clones, so a
/// caller holding its own handle can check whether the instance was already
/// reported and skip double-logging it elsewhere.
#[derive(Debug, Clone)]
pub struct LoggedError {
    message: String,
    pub code: Option<String>,
    pub query: Option<Value>,
    pub param: Option<Value>,
    pub formatted: Option<Value>,
    stack: Vec<String>,
    logged: Arc<AtomicBool>,
}

impl LoggedError {
    pub fn new(message: impl Into<String>) -> Self {
        LoggedError {
            message: message.into(),
            code: None,
            query: None,
            param: None,
            formatted: None,
            stack: capture_stack(),
            logged: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_code(message: impl Into<String>, code: impl Into<String>) -> Self {
        let mut err = LoggedError::new(message);
        err.code = Some(code.into());
        err
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = message.into();
    }

    /// Captured stack lines, already trimmed.
    pub fn stack(&self) -> &[String] {
        &self.stack
    }

    pub fn is_logged(&self) -> bool {
        self.logged.load(Ordering::Relaxed)
    }

    pub fn mark_logged(&self) {
        self.logged.store(true, Ordering::Relaxed);
    }
}

impl Default for LoggedError {
    fn default() -> Self {
        LoggedError::new("")
    }
}

impl fmt::Display for LoggedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for LoggedError {}

fn capture_stack() -> Vec<String> {
    Backtrace::force_capture()
        .to_string()
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.contains(file!()))
        .map(String::from)
        .collect()
}

/// Failures reported by the store boundary, shaped so the sink's retry
/// classifier can tell a recoverable payload problem from a fatal one.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not represent the payload at all (residual circular
    /// structure and the like). Recoverable by one sanitize-and-retry.
    #[error("payload not representable: {0}")]
    CompileRejection(String),

    /// The store's fault signature for very long string fields.
    /// Recoverable by capping strings and retrying once.
    #[error("cannot read length of undefined")]
    OversizedField,

    /// Connection could not be established or was lost mid-write.
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("store error: {0}")]
    Other(String),
}
