//! Adapting context handlers to the server's handler contract.
//!
//! A context handler is an async function taking `&mut Context` and returning
//! `Result<(), BoxError>`. [`context_fn!`](crate::context_fn) turns one into a [`ContextFn`] and
//! [`context_handler`] wraps that into a [`Handler`], which is what the http server drives for
//! each request.
//!
//! # Example
//! ```no_run
//! use micro_apictx::{context_fn, context_handler, BoxError, Context, TypedError};
//!
//! async fn find_user(ctx: &mut Context) -> Result<(), BoxError> {
//!     let Some(id) = ctx.uri().path().strip_prefix("/users/") else {
//!         return Err(TypedError::not_found("not found").into());
//!     };
//!     ctx.json(200, &serde_json::json!({ "id": id }))?;
//!     Ok(())
//! }
//!
//! let handler = context_handler(context_fn!(find_user));
//! ```

use crate::body::{DEFAULT_BODY_LIMIT, ResponseBody};
use crate::context::{Context, User};
use crate::error::BoxError;
use crate::query::SchemaCache;
use crate::report::{ErrorReporter, TracingReporter};
use async_trait::async_trait;
use bytes::Bytes;
use http::request::Parts;
use http::{Request, Response};
use http_body::Body;
use std::convert::Infallible;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

/// The contract an http server uses to turn a request into a response.
#[async_trait]
pub trait Handler<ReqBody>: Send + Sync {
    type RespBody: Body;
    type Error: Into<BoxError>;

    async fn call(&self, req: Request<ReqBody>) -> Result<Response<Self::RespBody>, Self::Error>;
}

/// The boxed future returned by a [`ContextFn`].
pub type ContextFuture<'a> = Pin<Box<dyn Future<Output = Result<(), BoxError>> + Send + 'a>>;

/// A context handler: writes the response through the [`Context`] and returns an error to render.
///
/// Implemented for every `Fn(&mut Context) -> ContextFuture<'_>`. Plain
/// `async fn(&mut Context) -> Result<(), BoxError>` handlers are adapted with [`context_fn!`].
///
/// [`context_fn!`]: crate::context_fn
pub trait ContextFn: Send + Sync {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> ContextFuture<'a>;
}

impl<F> ContextFn for F
where
    F: for<'a> Fn(&'a mut Context) -> ContextFuture<'a> + Send + Sync,
{
    #[inline]
    fn call<'a>(&'a self, ctx: &'a mut Context) -> ContextFuture<'a> {
        (self)(ctx)
    }
}

/// Adapts an `async fn(&mut Context) -> Result<(), BoxError>` into a [`ContextFn`].
///
/// The future is boxed inside a fn item generated at the call site, so its `Send` bound is checked
/// against the concrete handler.
#[macro_export]
macro_rules! context_fn {
    ($handler:path) => {{
        fn context_fn<'a>(ctx: &'a mut $crate::Context) -> $crate::ContextFuture<'a> {
            ::std::boxed::Box::pin($handler(ctx))
        }
        context_fn
    }};
}

/// Resolves the authenticated user of a request before the handler runs.
///
/// `Ok(None)` leaves [`Context::current_user`] empty, an error is rendered like a handler error
/// and the handler is not called.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserResolver: Send + Sync {
    async fn resolve(&self, request: &Parts) -> Result<Option<Arc<dyn User>>, BoxError>;
}

/// Wraps a context handler, see [`context_handler`].
pub struct ContextHandler<F> {
    f: F,
    reporter: Arc<dyn ErrorReporter>,
    user_resolver: Option<Arc<dyn UserResolver>>,
    schemas: Arc<SchemaCache>,
    body_limit: usize,
}

/// Wraps `f` with the default configuration.
pub fn context_handler<F>(f: F) -> ContextHandler<F>
where
    F: ContextFn,
{
    ContextHandler::builder(f).build()
}

impl<F> ContextHandler<F>
where
    F: ContextFn,
{
    pub fn builder(f: F) -> ContextHandlerBuilder<F> {
        ContextHandlerBuilder::new(f)
    }

    fn context<B>(&self, req: Request<B>) -> Context
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        Context::new(req)
            .with_reporter(Arc::clone(&self.reporter))
            .with_schema_cache(Arc::clone(&self.schemas))
            .with_body_limit(self.body_limit)
    }
}

#[async_trait]
impl<F, B> Handler<B> for ContextHandler<F>
where
    F: ContextFn,
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    type RespBody = ResponseBody;
    type Error = Infallible;

    async fn call(&self, req: Request<B>) -> Result<Response<Self::RespBody>, Self::Error> {
        let mut ctx = self.context(req);

        if let Some(resolver) = &self.user_resolver {
            let resolved = resolver.resolve(&ctx.head).await;
            match resolved {
                Ok(user) => ctx.set_current_user(user),
                Err(e) => {
                    ctx.handle_error(e.as_ref(), None);
                    return Ok(ctx.into_response());
                }
            }
        }

        if let Err(e) = ContextFn::call(&self.f, &mut ctx).await {
            ctx.handle_error(e.as_ref(), None);
        }

        Ok(ctx.into_response())
    }
}

impl<F> fmt::Debug for ContextHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextHandler")
            .field("has_user_resolver", &self.user_resolver.is_some())
            .field("schemas", &self.schemas)
            .field("body_limit", &self.body_limit)
            .finish_non_exhaustive()
    }
}

pub struct ContextHandlerBuilder<F> {
    f: F,
    reporter: Option<Arc<dyn ErrorReporter>>,
    user_resolver: Option<Arc<dyn UserResolver>>,
    schemas: Option<Arc<SchemaCache>>,
    body_limit: usize,
}

impl<F> ContextHandlerBuilder<F>
where
    F: ContextFn,
{
    fn new(f: F) -> Self {
        Self { f, reporter: None, user_resolver: None, schemas: None, body_limit: DEFAULT_BODY_LIMIT }
    }

    /// Where rendered errors are reported, [`TracingReporter`] by default.
    pub fn reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn user_resolver(mut self, user_resolver: Arc<dyn UserResolver>) -> Self {
        self.user_resolver = Some(user_resolver);
        self
    }

    /// Shares a schema cache between handlers, each handler has its own by default.
    pub fn schema_cache(mut self, schemas: Arc<SchemaCache>) -> Self {
        self.schemas = Some(schemas);
        self
    }

    pub fn body_limit(mut self, body_limit: usize) -> Self {
        self.body_limit = body_limit;
        self
    }

    pub fn build(self) -> ContextHandler<F> {
        ContextHandler {
            f: self.f,
            reporter: self.reporter.unwrap_or_else(|| Arc::new(TracingReporter)),
            user_resolver: self.user_resolver,
            schemas: self.schemas.unwrap_or_default(),
            body_limit: self.body_limit,
        }
    }
}

impl<F> fmt::Debug for ContextHandlerBuilder<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextHandlerBuilder").field("body_limit", &self.body_limit).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TypedError;
    use crate::query::{BindQuery, QuerySchema};
    use http::header::CONTENT_TYPE;
    use http::{Method, StatusCode, Uri};
    use http_body_util::{BodyExt, Empty, Full};
    use serde::{Deserialize, Serialize};
    use std::error::Error;
    use std::io;
    use std::sync::Mutex;
    use validator::Validate;

    #[derive(Debug, Default, Serialize, Deserialize, Validate)]
    #[serde(default)]
    struct NewUser {
        #[validate(required)]
        name: Option<String>,
        #[validate(range(min = 0, max = 150))]
        age: i64,
    }

    impl BindQuery for NewUser {
        fn query_schema(schema: QuerySchema<Self>) -> QuerySchema<Self> {
            schema.field("age", |u: &mut NewUser, v: i64| u.age = v)
        }
    }

    #[derive(Default)]
    struct Recorder {
        lines: Mutex<Vec<String>>,
    }

    impl ErrorReporter for Recorder {
        fn classified(&self, method: &Method, uri: &Uri, error: &TypedError) {
            let cause = error.cause().map(ToString::to_string).unwrap_or_default();
            self.lines.lock().unwrap().push(format!("debug {method} {uri} {error}: {cause}"));
        }

        fn internal(&self, method: &Method, uri: &Uri, error: &(dyn Error + 'static)) {
            self.lines.lock().unwrap().push(format!("warn {method} {uri} {error}"));
        }
    }

    struct Bob;

    impl User for Bob {
        fn id(&self) -> &str {
            "bob"
        }
    }

    async fn create_user(ctx: &mut Context) -> Result<(), BoxError> {
        let mut user = NewUser::default();
        ctx.bind(&mut user).await?;
        ctx.json(201, &user)?;
        Ok(())
    }

    async fn fail_internally(_ctx: &mut Context) -> Result<(), BoxError> {
        Err(io::Error::other("connection refused").into())
    }

    async fn write_nothing(_ctx: &mut Context) -> Result<(), BoxError> {
        Ok(())
    }

    async fn whoami(ctx: &mut Context) -> Result<(), BoxError> {
        let Some(user) = ctx.current_user() else {
            return Err(TypedError::unauthorized("login required").into());
        };
        let id = user.id().to_owned();
        ctx.json(0, &serde_json::json!({ "id": id }))?;
        Ok(())
    }

    fn post_json(uri: &str, body: &'static str) -> Request<Full<Bytes>> {
        Request::post(uri).header(CONTENT_TYPE, "application/json").body(Full::new(Bytes::from_static(body.as_bytes()))).unwrap()
    }

    fn get(uri: &str) -> Request<Empty<Bytes>> {
        Request::get(uri).body(Empty::new()).unwrap()
    }

    async fn send<H, B>(handler: &H, req: Request<B>) -> (StatusCode, String)
    where
        H: Handler<B, RespBody = ResponseBody, Error = Infallible>,
    {
        let Ok(response) = handler.call(req).await;
        let (parts, body) = response.into_parts();
        let bytes = body.collect().await.unwrap().to_bytes();
        (parts.status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn assert_is_handler<B, T: Handler<B>>(_handler: &T) {
        // no op
    }

    #[test]
    fn assert_fn_is_http_handler() {
        let handler = context_handler(context_fn!(create_user));
        assert_is_handler::<Full<Bytes>, _>(&handler);
        assert_is_handler::<Empty<Bytes>, _>(&handler);
    }

    #[tokio::test]
    async fn success_response() {
        let handler = context_handler(context_fn!(create_user));
        let (status, body) = send(&handler, post_json("/users?age=42", r#"{"name":"Bob"}"#)).await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body, "{\"name\":\"Bob\",\"age\":42}\n");
    }

    #[tokio::test]
    async fn bind_failure_is_classified() {
        let recorder = Arc::new(Recorder::default());
        let handler = ContextHandler::builder(context_fn!(create_user)).reporter(Arc::clone(&recorder) as Arc<dyn ErrorReporter>).build();

        let (status, body) = send(&handler, post_json("/users?age=abc", r#"{"name":"Bob"}"#)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "{\"code\":25600,\"message\":\"failed to read inputs\"}\n");
        assert_eq!(
            *recorder.lines.lock().unwrap(),
            ["debug POST /users?age=abc failed to read inputs: failed to convert parameter age to int: invalid digit found in string"]
        );
    }

    #[tokio::test]
    async fn validation_failure_is_classified() {
        let handler = context_handler(context_fn!(create_user));
        let (status, body) = send(&handler, post_json("/users", "{}")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "{\"code\":25600,\"message\":\"validation failed for name\"}\n");
    }

    #[tokio::test]
    async fn internal_error_is_hidden() {
        let recorder = Arc::new(Recorder::default());
        let handler = ContextHandler::builder(context_fn!(fail_internally)).reporter(Arc::clone(&recorder) as Arc<dyn ErrorReporter>).build();

        let (status, body) = send(&handler, get("/health")).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "{\"code\":0,\"message\":\"Internal error\"}\n");
        assert_eq!(*recorder.lines.lock().unwrap(), ["warn GET /health connection refused"]);
    }

    #[tokio::test]
    async fn nothing_written_is_empty_ok() {
        let handler = context_handler(context_fn!(write_nothing));
        assert_eq!(send(&handler, get("/")).await, (StatusCode::OK, String::new()));
    }

    #[tokio::test]
    async fn handlers_share_a_schema_cache() {
        let schemas = Arc::new(SchemaCache::new());
        let first = ContextHandler::builder(context_fn!(create_user)).schema_cache(Arc::clone(&schemas)).build();
        let second = ContextHandler::builder(context_fn!(create_user)).schema_cache(Arc::clone(&schemas)).build();

        send(&first, post_json("/users?age=1", r#"{"name":"a"}"#)).await;
        send(&second, post_json("/users?age=2", r#"{"name":"b"}"#)).await;

        assert_eq!(schemas.len(), 1);
    }

    #[tokio::test]
    async fn body_limit_applies() {
        let handler = ContextHandler::builder(context_fn!(create_user)).body_limit(4).build();
        let (status, body) = send(&handler, post_json("/users", r#"{"name":"Bob"}"#)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "{\"code\":25600,\"message\":\"failed to read inputs\"}\n");
    }

    #[tokio::test]
    async fn without_resolver_user_is_empty() {
        let handler = context_handler(context_fn!(whoami));
        let (status, body) = send(&handler, get("/me")).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, "{\"code\":25600,\"message\":\"login required\"}\n");
    }

    #[tokio::test]
    async fn resolver_populates_user() {
        let mut resolver = MockUserResolver::new();
        resolver
            .expect_resolve()
            .withf(|parts| parts.uri.path() == "/me")
            .times(1)
            .returning(|_| Ok(Some(Arc::new(Bob) as Arc<dyn User>)));

        let handler = ContextHandler::builder(context_fn!(whoami)).user_resolver(Arc::new(resolver)).build();
        let (status, body) = send(&handler, get("/me")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "{\"id\":\"bob\"}\n");
    }

    #[tokio::test]
    async fn resolver_error_skips_handler() {
        let mut resolver = MockUserResolver::new();
        resolver.expect_resolve().times(1).returning(|_| Err(TypedError::forbidden("token expired").into()));

        let handler = ContextHandler::builder(context_fn!(create_user)).user_resolver(Arc::new(resolver)).build();
        let (status, body) = send(&handler, post_json("/users?age=1", r#"{"name":"Bob"}"#)).await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body, "{\"code\":25600,\"message\":\"token expired\"}\n");
    }
}
