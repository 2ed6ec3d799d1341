//! Server side reporting of errors that reach the error response path.

use crate::error::TypedError;
use http::{Method, Uri};
use std::error::Error;
use tracing::{debug, warn};

/// Receives every error rendered by [`Context::handle_error`](crate::Context::handle_error).
///
/// This is where causes end up, they never reach the client.
pub trait ErrorReporter: Send + Sync {
    /// A [`TypedError`] was rendered with its own status and message.
    fn classified(&self, method: &Method, uri: &Uri, error: &TypedError);

    /// Any other error, rendered as a generic `500`.
    fn internal(&self, method: &Method, uri: &Uri, error: &(dyn Error + 'static));
}

/// Reports through `tracing`: classified errors at `DEBUG`, internal errors at `WARN`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn classified(&self, method: &Method, uri: &Uri, error: &TypedError) {
        debug!(%method, %uri, status = error.status().as_u16(), cause = ?error.cause(), "api error: {}", error);
    }

    fn internal(&self, method: &Method, uri: &Uri, error: &(dyn Error + 'static)) {
        warn!(%method, %uri, error = %error, "internal error");
    }
}
