//! Logging trait for platform client operations.
//!
//! This module provides the [`ClientLogger`] trait that lets callers capture
//! every function call passing through the
//! [`ConvexHttpClient`](crate::ConvexHttpClient).

use serde_json::Value;

use crate::error::Error;
use crate::function::FunctionKind;

/// A trait for logging platform client operations.
///
/// # Example
///
/// ```rust,ignore
/// use livechat::{ClientLogger, Error, FunctionKind};
/// use std::io::Write;
/// use std::sync::Mutex;
///
/// struct FileLogger {
///     file: Mutex<std::fs::File>,
/// }
///
/// impl ClientLogger for FileLogger {
///     fn log_result(&self, kind: FunctionKind, path: &str, args: &serde_json::Value, value: &serde_json::Value) {
///         let mut file = self.file.lock().unwrap();
///         writeln!(file, "{kind} {path} {args} -> {value}").unwrap();
///     }
///
///     fn log_error(&self, kind: FunctionKind, path: &str, args: &serde_json::Value, error: &Error) {
///         let mut file = self.file.lock().unwrap();
///         writeln!(file, "{kind} {path} {args} failed: {error}").unwrap();
///     }
/// }
/// ```
pub trait ClientLogger: Send + Sync {
    /// Log a successful call.
    ///
    /// For subscriptions this is called on every poll, including polls whose
    /// result is unchanged and therefore not pushed.
    fn log_result(&self, kind: FunctionKind, path: &str, args: &Value, value: &Value);

    /// Log a failed call.
    fn log_error(&self, kind: FunctionKind, path: &str, args: &Value, error: &Error);

    /// Log the log lines a backend function printed while running.
    fn log_function_lines(&self, path: &str, lines: &[String]) {
        let _ = (path, lines);
    }
}

/// Forwards every call to `tracing` at debug level, and backend log lines at
/// info level under the `livechat::backend` target.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingClientLogger;

impl ClientLogger for TracingClientLogger {
    fn log_result(&self, kind: FunctionKind, path: &str, args: &Value, value: &Value) {
        tracing::debug!(%kind, path, %args, %value, "call succeeded");
    }

    fn log_error(&self, kind: FunctionKind, path: &str, args: &Value, error: &Error) {
        tracing::debug!(%kind, path, %args, %error, "call failed");
    }

    fn log_function_lines(&self, path: &str, lines: &[String]) {
        for line in lines {
            tracing::info!(target: "livechat::backend", path, "{line}");
        }
    }
}
