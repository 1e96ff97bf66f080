//! Error reporting seam between the tree and whatever displays failures.

use tracing::error;

use crate::error::Error;

/// Receives every failed expansion or load-more before it is returned.
pub trait ErrorReporter: Send + Sync {
    /// Reports `err`; `context` names the operation that failed.
    fn report(&self, context: &str, err: &Error);
}

/// Default reporter: logs through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, context: &str, err: &Error) {
        error!(retryable = err.is_retryable(), "{context} failed: {err}");
    }
}
