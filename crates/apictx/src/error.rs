//! Error model shared by binding, handlers and the error response path.
//!
//! [`TypedError`] is the only error type whose message reaches the client. Everything else a
//! handler returns is treated as an internal error and rendered as a generic `500`.

use http::StatusCode;
use serde::Serialize;
use std::borrow::Cow;
use std::error::Error;
use std::fmt;

/// The error type handlers return, any error can be converted into it with `?`.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// `code` emitted for every [`TypedError`] response.
pub const CLASSIFIED_CODE: u32 = 0x6400;

/// `code` emitted for errors that are not a [`TypedError`].
pub const INTERNAL_CODE: u32 = 0;

/// Message emitted for errors that are not a [`TypedError`].
pub const INTERNAL_MESSAGE: &str = "Internal error";

const DEFAULT_STATUS: StatusCode = StatusCode::BAD_REQUEST;
const MIN_STATUS: u16 = 200;
const MAX_STATUS: u16 = 520;

/// A classified failure: a user facing message, an optional cause and a status code.
///
/// The cause is kept for server side logging only, it is never written to the response.
///
/// # Example
/// ```
/// use http::StatusCode;
/// use micro_apictx::TypedError;
///
/// let err = TypedError::new("user not found").with_status(404);
/// assert_eq!(err.status(), StatusCode::NOT_FOUND);
///
/// // out of [200, 520], falls back to 400
/// let err = TypedError::new("x").with_status(999);
/// assert_eq!(err.status(), StatusCode::BAD_REQUEST);
/// ```
#[derive(Debug)]
pub struct TypedError {
    message: Cow<'static, str>,
    cause: Option<BoxError>,
    status: StatusCode,
}

impl TypedError {
    /// Creates an error with status `400` and no cause.
    pub fn new(message: impl Into<Cow<'static, str>>) -> Self {
        Self { message: message.into(), cause: None, status: DEFAULT_STATUS }
    }

    /// Attaches the underlying cause.
    #[must_use]
    pub fn with_cause(mut self, cause: impl Into<BoxError>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// Overrides the status code, values outside `[200, 520]` fall back to `400`.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = clamp_status(status);
        self
    }

    pub fn bad_request(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(message)
    }

    pub fn unauthorized(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(message).with_status(StatusCode::UNAUTHORIZED.as_u16())
    }

    pub fn forbidden(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(message).with_status(StatusCode::FORBIDDEN.as_u16())
    }

    pub fn not_found(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(message).with_status(StatusCode::NOT_FOUND.as_u16())
    }

    pub fn conflict(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(message).with_status(StatusCode::CONFLICT.as_u16())
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&(dyn Error + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Finds the first [`TypedError`] in `err` or its `source()` chain.
    pub fn find<'a>(err: &'a (dyn Error + 'static)) -> Option<&'a TypedError> {
        let mut current = Some(err);
        while let Some(e) = current {
            if let Some(typed) = e.downcast_ref::<TypedError>() {
                return Some(typed);
            }
            current = e.source();
        }
        None
    }
}

fn clamp_status(status: u16) -> StatusCode {
    if !(MIN_STATUS..=MAX_STATUS).contains(&status) {
        return DEFAULT_STATUS;
    }
    StatusCode::from_u16(status).unwrap_or(DEFAULT_STATUS)
}

impl fmt::Display for TypedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for TypedError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause.as_deref().map(|e| e as &(dyn Error + 'static))
    }
}

/// Body of every error response: `{"code": .., "message": ..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorPayload<'a> {
    pub code: u32,
    pub message: &'a str,
}

impl<'a> ErrorPayload<'a> {
    pub fn classified(err: &'a TypedError) -> Self {
        Self { code: CLASSIFIED_CODE, message: err.message() }
    }

    pub fn internal() -> Self {
        Self { code: INTERNAL_CODE, message: INTERNAL_MESSAGE }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[derive(Debug, thiserror::Error)]
    #[error("wrapped: {source}")]
    struct Wrapper {
        source: TypedError,
    }

    #[test]
    fn default_status_is_bad_request() {
        let err = TypedError::new("bad input").with_cause(io::Error::other("disk"));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message(), "bad input");
        assert_eq!(err.to_string(), "bad input");
        assert_eq!(err.cause().map(ToString::to_string), Some("disk".to_string()));
    }

    #[test]
    fn out_of_range_status_falls_back() {
        assert_eq!(TypedError::new("x").with_status(999).status(), StatusCode::BAD_REQUEST);
        assert_eq!(TypedError::new("x").with_status(199).status(), StatusCode::BAD_REQUEST);
        assert_eq!(TypedError::new("x").with_status(521).status(), StatusCode::BAD_REQUEST);
        assert_eq!(TypedError::new("x").with_status(0).status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn boundary_status_is_kept() {
        assert_eq!(TypedError::new("x").with_status(200).status(), StatusCode::OK);
        assert_eq!(TypedError::new("x").with_status(520).status().as_u16(), 520);
        assert_eq!(TypedError::not_found("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(TypedError::forbidden("x").status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn source_is_the_cause() {
        let err = TypedError::new("failed").with_cause(io::Error::other("inner"));
        assert_eq!(err.source().map(ToString::to_string), Some("inner".to_string()));
        assert!(TypedError::new("no cause").source().is_none());
    }

    #[test]
    fn find_walks_source_chain() {
        let direct: BoxError = TypedError::conflict("taken").into();
        assert_eq!(TypedError::find(direct.as_ref()).map(TypedError::message), Some("taken"));

        let wrapped: BoxError = Box::new(Wrapper { source: TypedError::new("deep") });
        assert_eq!(TypedError::find(wrapped.as_ref()).map(TypedError::message), Some("deep"));

        let plain: BoxError = Box::new(io::Error::other("boom"));
        assert!(TypedError::find(plain.as_ref()).is_none());
    }

    #[test]
    fn payload_never_contains_cause() {
        let err = TypedError::new("not found").with_status(404).with_cause(io::Error::other("secret"));
        let json = serde_json::to_string(&ErrorPayload::classified(&err)).unwrap();
        assert_eq!(json, r#"{"code":25600,"message":"not found"}"#);

        let json = serde_json::to_string(&ErrorPayload::internal()).unwrap();
        assert_eq!(json, r#"{"code":0,"message":"Internal error"}"#);
    }
}
