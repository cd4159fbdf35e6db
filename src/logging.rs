// Consumed logging interface (spec.md §6): four levels, optional structured
// context, never throws. `TracingLogger` is the default implementation;
// `NullLogger` is for callers (tests, benches) that want silence.

use std::fmt;

/// Structured context attached to a log line: an ordered list of key/value
/// pairs, rendered by the implementation however it likes.
#[derive(Debug, Clone, Default)]
pub struct LogContext(Vec<(String, String)>);

impl LogContext {
    pub fn new() -> Self {
        LogContext(Vec::new())
    }

    pub fn with(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.0.push((key.into(), value.to_string()));
        self
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.0
    }
}

/// Consumed interface: a logger that never throws.
pub trait Logger: Send + Sync {
    fn debug(&self, message: &str, context: Option<&LogContext>);
    fn info(&self, message: &str, context: Option<&LogContext>);
    fn warn(&self, message: &str, context: Option<&LogContext>);
    fn error(&self, message: &str, context: Option<&LogContext>);
}

fn format_context(context: Option<&LogContext>) -> String {
    match context {
        None => String::new(),
        Some(ctx) if ctx.pairs().is_empty() => String::new(),
        Some(ctx) => {
            let rendered: Vec<String> = ctx
                .pairs()
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            format!(" [{}]", rendered.join(" "))
        }
    }
}

/// Default `Logger` backed by the `tracing` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn debug(&self, message: &str, context: Option<&LogContext>) {
        tracing::debug!("{message}{}", format_context(context));
    }

    fn info(&self, message: &str, context: Option<&LogContext>) {
        tracing::info!("{message}{}", format_context(context));
    }

    fn warn(&self, message: &str, context: Option<&LogContext>) {
        tracing::warn!("{message}{}", format_context(context));
    }

    fn error(&self, message: &str, context: Option<&LogContext>) {
        tracing::error!("{message}{}", format_context(context));
    }
}

/// A `Logger` that discards everything. Useful for tests and benches where
/// log output is noise.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogger;

impl Logger for NullLogger {
    fn debug(&self, _message: &str, _context: Option<&LogContext>) {}
    fn info(&self, _message: &str, _context: Option<&LogContext>) {}
    fn warn(&self, _message: &str, _context: Option<&LogContext>) {}
    fn error(&self, _message: &str, _context: Option<&LogContext>) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_formatting() {
        let ctx = LogContext::new().with("rows", 3).with("format", "csv");
        assert_eq!(format_context(Some(&ctx)), " [rows=3 format=csv]");
    }

    #[test]
    fn test_empty_context_formats_empty() {
        let ctx = LogContext::new();
        assert_eq!(format_context(Some(&ctx)), "");
        assert_eq!(format_context(None), "");
    }

    #[test]
    fn test_null_logger_does_not_panic() {
        let logger = NullLogger;
        logger.debug("hello", None);
        logger.error("oops", Some(&LogContext::new().with("k", "v")));
    }
}
