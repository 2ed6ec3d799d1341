//! Request context helpers for http handlers.
//!
//! This crate sits between an http server and the handlers of an api. For every request it builds
//! a [`Context`] which lets the handler:
//!
//! - bind query parameters and a json body into a typed value, then validate it
//!   ([`Context::bind`], [`Context::bind_without_validation`])
//! - write json responses ([`Context::json`])
//! - turn any returned error into a stable `{"code": .., "message": ..}` payload
//!   ([`Context::handle_error`])
//!
//! # Error shaping
//!
//! Handlers return `Result<(), BoxError>`. A [`TypedError`] anywhere in the returned error's source
//! chain is answered with its own status and message and code `25600`. Any other error is answered
//! with `500`, code `0` and the message `Internal error`. Causes are reported server side through
//! an [`ErrorReporter`] and never serialized.
//!
//! # Example
//!
//! ```no_run
//! use micro_apictx::{context_fn, context_handler, BindQuery, BoxError, Context, Handler, QuerySchema};
//! use serde::{Deserialize, Serialize};
//! use validator::Validate;
//!
//! #[derive(Debug, Default, Serialize, Deserialize, Validate)]
//! #[serde(default)]
//! struct Search {
//!     #[validate(length(min = 1))]
//!     term: String,
//!     page: u32,
//! }
//!
//! impl BindQuery for Search {
//!     fn query_schema(schema: QuerySchema<Self>) -> QuerySchema<Self> {
//!         schema
//!             .field("q", |s: &mut Search, v: String| s.term = v)
//!             .field("page", |s: &mut Search, v: u32| s.page = v)
//!     }
//! }
//!
//! async fn search(ctx: &mut Context) -> Result<(), BoxError> {
//!     let mut input = Search::default();
//!     ctx.bind(&mut input).await?;
//!     ctx.json(200, &input)?;
//!     Ok(())
//! }
//!
//! # async fn serve() {
//! let handler = context_handler(context_fn!(search));
//! let request = http::Request::get("/search?q=rust&page=2").body(http_body_util::Empty::<bytes::Bytes>::new()).unwrap();
//! let response = handler.call(request).await;
//! # }
//! ```

mod bind;
mod body;
mod context;
mod error;
mod handler;
mod report;
mod response;

pub mod query;

pub use bind::BindError;
pub use bind::READ_INPUTS_FAILED;
pub use body::DEFAULT_BODY_LIMIT;
pub use body::OptionReqBody;
pub use body::ReqBody;
pub use body::ResponseBody;
pub use context::Context;
pub use context::User;
pub use error::BoxError;
pub use error::CLASSIFIED_CODE;
pub use error::ErrorPayload;
pub use error::INTERNAL_CODE;
pub use error::INTERNAL_MESSAGE;
pub use error::TypedError;
pub use handler::ContextFn;
pub use handler::ContextFuture;
pub use handler::ContextHandler;
pub use handler::ContextHandlerBuilder;
pub use handler::Handler;
pub use handler::UserResolver;
pub use handler::context_handler;
pub use query::BindQuery;
pub use query::FieldKind;
pub use query::QueryParams;
pub use query::QuerySchema;
pub use query::SchemaCache;
pub use report::ErrorReporter;
pub use report::TracingReporter;
pub use response::JSON_CONTENT_TYPE;
pub use response::ResponseWriter;
pub use response::WriteError;
