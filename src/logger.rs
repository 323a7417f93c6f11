//! Diagnostic sink used by the cache provider for its error policy.
//!
//! The provider reports swallowed failures through a [`Logger`] rather than
//! straight to `tracing`, so callers can route them anywhere. [`NoopLogger`]
//! is the default; [`TracingLogger`] forwards to the `tracing` macros.

use std::error::Error;

use tracing::{debug, error, info, warn};

/// Sink for diagnostic and error messages
pub trait Logger: Send + Sync + 'static {
    fn debug(&self, message: &str);

    fn info(&self, message: &str);

    fn warn(&self, message: &str);

    fn error(&self, message: &str);

    /// Log a failure together with the error that caused it.
    fn error_with(&self, err: &(dyn Error + 'static), message: &str);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn debug(&self, _message: &str) {}

    fn info(&self, _message: &str) {}

    fn warn(&self, _message: &str) {}

    fn error(&self, _message: &str) {}

    fn error_with(&self, _err: &(dyn Error + 'static), _message: &str) {}
}

/// Forwards to `tracing` events under the `hybrid_cache` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn debug(&self, message: &str) {
        debug!(target: "hybrid_cache", "{}", message);
    }

    fn info(&self, message: &str) {
        info!(target: "hybrid_cache", "{}", message);
    }

    fn warn(&self, message: &str) {
        warn!(target: "hybrid_cache", "{}", message);
    }

    fn error(&self, message: &str) {
        error!(target: "hybrid_cache", "{}", message);
    }

    fn error_with(&self, err: &(dyn Error + 'static), message: &str) {
        error!(target: "hybrid_cache", error = %err, "{}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_loggers_are_object_safe_sinks() {
        let err = crate::CacheError::backend("connection refused");
        let sinks: Vec<Arc<dyn Logger>> = vec![Arc::new(NoopLogger), Arc::new(TracingLogger)];
        for sink in sinks {
            sink.debug("debug");
            sink.info("info");
            sink.warn("warn");
            sink.error("error");
            sink.error_with(&err, "can't delete key k1");
        }
    }
}
