//! Per type memoization of [`QuerySchema`]s.

use super::{BindQuery, QuerySchema};
use arc_swap::ArcSwap;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type Schemas = HashMap<TypeId, Arc<dyn Any + Send + Sync>>;

/// Caches the schema of every bound type, keyed by [`TypeId`].
///
/// Reads are lock free, a miss builds the schema and publishes a new map. Two requests missing
/// on the same type at once may both build it, the first published one is kept.
pub struct SchemaCache {
    schemas: ArcSwap<Schemas>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self { schemas: ArcSwap::from_pointee(HashMap::new()) }
    }

    /// Returns the schema of `T`, building it on first use.
    pub fn schema<T: BindQuery>(&self) -> Arc<QuerySchema<T>> {
        if let Some(schema) = self.lookup::<T>() {
            return schema;
        }

        let schema = Arc::new(T::query_schema(QuerySchema::new()));
        self.schemas.rcu(|current| {
            let mut next = Schemas::clone(current);
            next.entry(TypeId::of::<T>()).or_insert_with(|| Arc::clone(&schema) as Arc<dyn Any + Send + Sync>);
            next
        });

        self.lookup::<T>().unwrap_or(schema)
    }

    pub fn len(&self) -> usize {
        self.schemas.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.load().is_empty()
    }

    fn lookup<T: BindQuery>(&self) -> Option<Arc<QuerySchema<T>>> {
        let erased = self.schemas.load().get(&TypeId::of::<T>()).cloned()?;
        erased.downcast::<QuerySchema<T>>().ok()
    }
}

impl Default for SchemaCache {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SchemaCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaCache").field("types", &self.len()).finish()
    }
}
