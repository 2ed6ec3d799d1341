//! The per request [`Context`] handed to context handlers.
//!
//! A context owns everything a handler needs for a single request: the request head, the
//! request body (readable once), the response being written, and the authenticated user if one
//! was resolved. It is created for one request and dropped once the response is produced.

use crate::body::{OptionReqBody, ResponseBody};
use crate::error::BoxError;
use crate::query::SchemaCache;
use crate::report::{ErrorReporter, TracingReporter};
use crate::response::{ResponseWriter, WriteError};
use bytes::Bytes;
use http::request::Parts;
use http::{HeaderMap, Method, Request, Response, StatusCode, Uri};
use http_body::Body as HttpBody;
use serde::Serialize;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// An authenticated caller, only its identity is exposed.
pub trait User: Send + Sync {
    fn id(&self) -> &str;
}

pub struct Context {
    pub(crate) head: Parts,
    pub(crate) body: OptionReqBody,
    writer: ResponseWriter,
    current_user: Option<Arc<dyn User>>,
    reporter: Arc<dyn ErrorReporter>,
    pub(crate) schemas: Arc<SchemaCache>,
}

impl Context {
    /// Creates a context reporting through [`TracingReporter`] with a private schema cache.
    pub fn new<B>(request: Request<B>) -> Self
    where
        B: HttpBody<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let (head, body) = request.into_parts();
        Self {
            head,
            body: OptionReqBody::new(body),
            writer: ResponseWriter::new(),
            current_user: None,
            reporter: Arc::new(TracingReporter),
            schemas: Arc::new(SchemaCache::new()),
        }
    }

    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    #[must_use]
    pub fn with_schema_cache(mut self, schemas: Arc<SchemaCache>) -> Self {
        self.schemas = schemas;
        self
    }

    #[must_use]
    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body = self.body.with_limit(limit);
        self
    }

    #[must_use]
    pub fn with_user(mut self, user: Arc<dyn User>) -> Self {
        self.current_user = Some(user);
        self
    }

    /// The request head: method, uri, version and headers.
    pub fn request(&self) -> &Parts {
        &self.head
    }

    pub fn method(&self) -> &Method {
        &self.head.method
    }

    pub fn uri(&self) -> &Uri {
        &self.head.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.head.headers
    }

    pub fn current_user(&self) -> Option<&dyn User> {
        self.current_user.as_deref()
    }

    pub fn set_current_user(&mut self, user: Option<Arc<dyn User>>) {
        self.current_user = user;
    }

    pub fn writer(&self) -> &ResponseWriter {
        &self.writer
    }

    pub fn writer_mut(&mut self) -> &mut ResponseWriter {
        &mut self.writer
    }

    /// Writes `payload` as a json response, a `status` of `0` means `200`.
    pub fn json<T>(&mut self, status: u16, payload: &T) -> Result<(), WriteError>
    where
        T: Serialize + ?Sized,
    {
        self.writer.write_json(status, payload)
    }

    /// Writes the error response for `err`.
    ///
    /// A [`TypedError`](crate::TypedError) in `err` or its source chain decides the status and
    /// message, any other error is answered with `500` and `{"code":0,"message":"Internal error"}`.
    /// Since both cases pick their own status, `override_status` does not change the response.
    pub fn handle_error(&mut self, err: &(dyn Error + 'static), override_status: Option<StatusCode>) {
        if let Some(status) = override_status {
            trace!(%status, "status override not applied, the error decides the status");
        }
        self.writer.write_error(&self.head.method, &self.head.uri, err, self.reporter.as_ref());
    }

    /// Consumes the context, yielding everything written so far. A context nothing was written to
    /// yields an empty `200`.
    pub fn into_response(self) -> Response<ResponseBody> {
        self.writer.into_response()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("method", &self.head.method)
            .field("uri", &self.head.uri)
            .field("body", &self.body)
            .field("writer", &self.writer)
            .field("current_user", &self.current_user.as_ref().map(|user| user.id()))
            .finish_non_exhaustive()
    }
}
