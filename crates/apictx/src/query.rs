//! Query parameter coercion.
//!
//! A type declares which query parameters feed which of its fields by implementing [`BindQuery`].
//! Each declaration pairs a parameter name with a typed setter, the setter's value type decides how
//! the raw string is converted (see [`QueryValue`]).
//!
//! # Example
//! ```
//! use micro_apictx::query::{BindQuery, QueryParams, QuerySchema};
//!
//! #[derive(Default)]
//! struct Paging {
//!     page: u32,
//!     search: Option<String>,
//! }
//!
//! impl BindQuery for Paging {
//!     fn query_schema(schema: QuerySchema<Self>) -> QuerySchema<Self> {
//!         schema
//!             .field("page", |p: &mut Paging, v: u32| p.page = v)
//!             .field("q", |p: &mut Paging, v: Option<String>| p.search = v)
//!     }
//! }
//!
//! let params = QueryParams::parse("page=3&q=rust&page=9").unwrap();
//! let mut paging = Paging::default();
//! Paging::query_schema(QuerySchema::new()).apply(&mut paging, &params).unwrap();
//! assert_eq!(paging.page, 3);
//! assert_eq!(paging.search.as_deref(), Some("rust"));
//! ```

mod cache;

pub use cache::SchemaCache;

use crate::bind::BindError;
use crate::error::BoxError;
use http::Uri;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::trace;

/// Query string decoded into a multimap, values keep their order of appearance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    inner: HashMap<String, Vec<String>>,
}

impl QueryParams {
    /// Decodes an `application/x-www-form-urlencoded` query string, a key without `=` maps to `""`.
    pub fn parse(query: &str) -> Result<Self, serde_urlencoded::de::Error> {
        let pairs = serde_urlencoded::from_str::<Vec<(String, String)>>(query)?;

        let mut inner: HashMap<String, Vec<String>> = HashMap::with_capacity(pairs.len());
        for (key, value) in pairs {
            inner.entry(key).or_default().push(value);
        }
        Ok(Self { inner })
    }

    pub fn from_uri(uri: &Uri) -> Result<Self, serde_urlencoded::de::Error> {
        uri.query().map_or_else(|| Ok(Self::default()), Self::parse)
    }

    /// The first value of `name`, if present.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.inner.get(name).and_then(|values| values.first()).map(String::as_str)
    }

    pub fn get_all(&self, name: &str) -> &[String] {
        self.inner.get(name).map_or(&[], Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Type tag of a bound field, used in conversion error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Int,
    Uint,
    Float,
    Bool,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::String => "string",
            FieldKind::Int => "int",
            FieldKind::Uint => "uint",
            FieldKind::Float => "float",
            FieldKind::Bool => "bool",
        };
        f.write_str(name)
    }
}

/// A value that can be coerced from a single query parameter.
///
/// Only types implementing this trait can be declared in a [`QuerySchema`], so an unsupported
/// field kind is rejected at compile time.
pub trait QueryValue: Sized {
    const KIND: FieldKind;

    fn coerce(raw: &str) -> Result<Self, BoxError>;
}

impl QueryValue for String {
    const KIND: FieldKind = FieldKind::String;

    fn coerce(raw: &str) -> Result<Self, BoxError> {
        Ok(raw.to_owned())
    }
}

impl QueryValue for bool {
    const KIND: FieldKind = FieldKind::Bool;

    fn coerce(raw: &str) -> Result<Self, BoxError> {
        match raw {
            "1" => Ok(true),
            "0" => Ok(false),
            _ => Ok(raw.parse::<bool>()?),
        }
    }
}

impl<V: QueryValue> QueryValue for Option<V> {
    const KIND: FieldKind = V::KIND;

    fn coerce(raw: &str) -> Result<Self, BoxError> {
        V::coerce(raw).map(Some)
    }
}

macro_rules! impl_query_value_from_str {
    ($kind:ident => $($ty:ty)*) => {
        $(
            impl QueryValue for $ty {
                const KIND: FieldKind = FieldKind::$kind;

                #[inline]
                fn coerce(raw: &str) -> Result<Self, BoxError> {
                    Ok(raw.parse::<$ty>()?)
                }
            }
        )*
    };
}

impl_query_value_from_str! { Int => i8 i16 i32 i64 isize }
impl_query_value_from_str! { Uint => u8 u16 u32 u64 usize }

/// Rejects `NaN` and infinities, they have no json representation.
#[derive(Debug, Error)]
#[error("{raw} is not a finite number")]
pub struct NonFiniteFloat {
    raw: String,
}

macro_rules! impl_query_value_for_float {
    ($($ty:ty)*) => {
        $(
            impl QueryValue for $ty {
                const KIND: FieldKind = FieldKind::Float;

                fn coerce(raw: &str) -> Result<Self, BoxError> {
                    let value = raw.parse::<$ty>()?;
                    if !value.is_finite() {
                        return Err(NonFiniteFloat { raw: raw.to_owned() }.into());
                    }
                    Ok(value)
                }
            }
        )*
    };
}

impl_query_value_for_float! { f32 f64 }

type Assign<T> = Box<dyn Fn(&mut T, &str) -> Result<(), BoxError> + Send + Sync>;

/// Binding descriptor of one field: the source parameter name, its kind and a setter.
pub struct QueryField<T> {
    name: &'static str,
    kind: FieldKind,
    assign: Assign<T>,
}

impl<T> QueryField<T> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }
}

impl<T> fmt::Debug for QueryField<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryField").field("name", &self.name).field("kind", &self.kind).finish_non_exhaustive()
    }
}

/// The ordered set of [`QueryField`]s declared for `T`.
pub struct QuerySchema<T> {
    fields: Vec<QueryField<T>>,
}

impl<T> QuerySchema<T> {
    pub fn new() -> Self {
        Self { fields: vec![] }
    }

    /// Declares that the query parameter `name` is coerced into `V` and handed to `set`.
    #[must_use]
    pub fn field<V>(mut self, name: &'static str, set: fn(&mut T, V)) -> Self
    where
        V: QueryValue + 'static,
        T: 'static,
    {
        let assign = move |target: &mut T, raw: &str| -> Result<(), BoxError> {
            set(target, V::coerce(raw)?);
            Ok(())
        };
        self.fields.push(QueryField { name, kind: V::KIND, assign: Box::new(assign) });
        self
    }

    pub fn fields(&self) -> &[QueryField<T>] {
        &self.fields
    }

    /// Coerces every declared field found in `params`, using its first value.
    ///
    /// Absent parameters leave the field untouched. The first failed conversion stops the
    /// process, fields declared after it are not attempted.
    pub fn apply(&self, target: &mut T, params: &QueryParams) -> Result<(), BindError> {
        for field in &self.fields {
            let Some(raw) = params.first(field.name) else {
                continue;
            };

            trace!(param = field.name, kind = %field.kind, "bind query parameter");
            (field.assign)(target, raw).map_err(|source| BindError::Conversion {
                name: field.name,
                kind: field.kind,
                source,
            })?;
        }
        Ok(())
    }
}

impl<T> Default for QuerySchema<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for QuerySchema<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySchema").field("fields", &self.fields).finish()
    }
}

/// Types whose fields can be populated from query parameters.
///
/// The default schema declares no field, so types bound only from a json body can simply
/// `impl BindQuery for MyType {}`.
pub trait BindQuery: Sized + 'static {
    fn query_schema(schema: QuerySchema<Self>) -> QuerySchema<Self> {
        schema
    }
}
