//! Binding of query parameters and json bodies into a target value, followed by validation.
//!
//! Binding runs in a fixed order: query parameters first, then the body. The body is merged into
//! the target, members it does not mention keep whatever the query gave them.
//!
//! # Example
//! ```no_run
//! use micro_apictx::{BindQuery, BoxError, Context, QuerySchema};
//! use serde::{Deserialize, Serialize};
//! use validator::Validate;
//!
//! #[derive(Debug, Default, Serialize, Deserialize, Validate)]
//! #[serde(default)]
//! struct CreateOrder {
//!     #[validate(range(min = 1, max = 100))]
//!     quantity: u32,
//!     #[validate(required)]
//!     sku: Option<String>,
//! }
//!
//! impl BindQuery for CreateOrder {
//!     fn query_schema(schema: QuerySchema<Self>) -> QuerySchema<Self> {
//!         schema.field("qty", |o: &mut CreateOrder, v: u32| o.quantity = v)
//!     }
//! }
//!
//! async fn create_order(ctx: &mut Context) -> Result<(), BoxError> {
//!     let mut order = CreateOrder::default();
//!     ctx.bind(&mut order).await?;
//!     ctx.json(201, &order)?;
//!     Ok(())
//! }
//! ```

use crate::context::Context;
use crate::error::{BoxError, TypedError};
use crate::query::{BindQuery, FieldKind, QueryParams};
use http::header::CONTENT_TYPE;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::trace;
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

/// Message of the [`TypedError`] returned when binding fails.
pub const READ_INPUTS_FAILED: &str = "failed to read inputs";

#[derive(Debug, Error)]
pub enum BindError {
    #[error("invalid query string: {source}")]
    Query {
        #[from]
        source: serde_urlencoded::de::Error,
    },

    #[error("failed to convert parameter {name} to {kind}: {source}")]
    Conversion {
        name: &'static str,
        kind: FieldKind,
        #[source]
        source: BoxError,
    },

    #[error("failed to read request body: {source}")]
    Body {
        #[source]
        source: BoxError,
    },

    #[error("failed to decode JSON body: {source}")]
    Decode {
        #[from]
        source: serde_json::Error,
    },

    #[error("failed to encode bind target: {source}")]
    Target {
        #[source]
        source: serde_json::Error,
    },

    #[error("unsupported content type: {content_type}")]
    UnsupportedContentType { content_type: String },
}

enum BodyKind {
    Absent,
    Json,
    Other(String),
}

impl Context {
    /// Binds query parameters and the json body into `target`, then validates it.
    ///
    /// Binding failures become a `400` [`TypedError`] reading `failed to read inputs`, with the
    /// [`BindError`] as its cause. Validation failures become a `400` [`TypedError`] listing
    /// every offending field.
    pub async fn bind<T>(&mut self, target: &mut T) -> Result<(), TypedError>
    where
        T: BindQuery + Serialize + DeserializeOwned + Validate,
    {
        if let Err(e) = self.bind_without_validation(target).await {
            return Err(TypedError::new(READ_INPUTS_FAILED).with_cause(e));
        }

        target.validate().map_err(|errors| TypedError::new(validation_message(&errors)))
    }

    /// Binds query parameters and the json body into `target`, without validating it.
    pub async fn bind_without_validation<T>(&mut self, target: &mut T) -> Result<(), BindError>
    where
        T: BindQuery + Serialize + DeserializeOwned,
    {
        let params = self.query_params()?;
        self.bind_query_params(target, &params)?;

        match self.body_kind() {
            BodyKind::Json => self.bind_json_body(target).await,
            BodyKind::Absent => Ok(()),
            BodyKind::Other(_) if self.body.is_end_stream() => Ok(()),
            BodyKind::Other(content_type) => Err(BindError::UnsupportedContentType { content_type }),
        }
    }

    /// The request's query string as a multimap.
    pub fn query_params(&self) -> Result<QueryParams, BindError> {
        Ok(QueryParams::from_uri(&self.head.uri)?)
    }

    /// Coerces the fields `T` declares from `params`.
    pub fn bind_query_params<T: BindQuery>(&self, target: &mut T, params: &QueryParams) -> Result<(), BindError> {
        self.schemas.schema::<T>().apply(target, params)
    }

    /// Reads the body and merges the json document it holds into `target`.
    ///
    /// Only the members present in the document are written, nested objects merge recursively,
    /// and a top level `null` leaves `target` as it is. The merge goes through `target`'s serde
    /// representation, so members skipped on serialization are reset to their default.
    /// This does not look at `Content-Type`.
    pub async fn bind_json_body<T>(&mut self, target: &mut T) -> Result<(), BindError>
    where
        T: Serialize + DeserializeOwned,
    {
        let bytes = self.body.read_to_bytes().await.map_err(|source| BindError::Body { source })?;
        trace!(len = bytes.len(), "bind json body");
        merge_json(target, &bytes)
    }

    fn body_kind(&self) -> BodyKind {
        match self.head.headers.get(CONTENT_TYPE) {
            None => BodyKind::Absent,
            Some(value) if value == mime::APPLICATION_JSON.essence_str() => BodyKind::Json,
            Some(value) => BodyKind::Other(String::from_utf8_lossy(value.as_bytes()).into_owned()),
        }
    }
}

fn merge_json<T>(target: &mut T, document: &[u8]) -> Result<(), BindError>
where
    T: Serialize + DeserializeOwned,
{
    let patch = serde_json::from_slice::<Value>(document)?;
    if patch.is_null() {
        return Ok(());
    }

    let mut merged = serde_json::to_value(&*target).map_err(|source| BindError::Target { source })?;
    merge(&mut merged, patch);
    *target = serde_json::from_value(merged)?;
    Ok(())
}

fn merge(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            for (key, value) in patch {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, patch) => *base = patch,
    }
}

fn validation_message(errors: &ValidationErrors) -> String {
    let mut fields = vec![];
    failed_fields(errors, &mut fields);
    fields.iter().map(|field| format!("validation failed for {field}")).collect::<Vec<_>>().join(", ")
}

/// Collects the leaf fields that failed, by name, descending into nested structs and lists.
fn failed_fields(errors: &ValidationErrors, fields: &mut Vec<String>) {
    let mut entries = errors.errors().iter().collect::<Vec<_>>();
    entries.sort_unstable_by(|(a, _), (b, _)| a.cmp(b));

    for (field, kind) in entries {
        match kind {
            ValidationErrorsKind::Field(_) => fields.push(field.to_string()),
            ValidationErrorsKind::Struct(nested) => failed_fields(nested, fields),
            ValidationErrorsKind::List(items) => items.values().for_each(|nested| failed_fields(nested, fields)),
        }
    }
}
