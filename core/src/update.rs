use offgrid_proto::{Document, FetchResult, OperationContext};
use serde_json::Value;
use std::{collections::HashMap, panic::AssertUnwindSafe, sync::Arc};
use tracing::error;

use crate::{cache::NormalizedCache, error::CacheError};

/// Applies a mutation result (optimistic or confirmed) to the cache beyond the plain normalized
/// write, e.g. appending a new entity to a list held by a query.
pub type MutationUpdater = Arc<dyn Fn(&dyn NormalizedCache, &FetchResult) + Send + Sync>;

/// Produces the updater for an operation, given its context. Registered by operation name so
/// that mutations restored from storage can find their updater again.
pub type UpdaterFactory = Arc<dyn Fn(&OperationContext) -> MutationUpdater + Send + Sync>;

#[derive(Clone, Default)]
pub struct CacheUpdates {
    factories: HashMap<String, UpdaterFactory>,
}

impl CacheUpdates {
    pub fn new() -> Self { Self::default() }

    pub fn insert(&mut self, operation_name: impl Into<String>, factory: UpdaterFactory) { self.factories.insert(operation_name.into(), factory); }

    /// Register an updater that does not depend on the context.
    pub fn with(mut self, operation_name: impl Into<String>, updater: MutationUpdater) -> Self {
        self.insert(operation_name, Arc::new(move |_: &OperationContext| updater.clone()));
        self
    }

    pub fn resolve(&self, operation_name: Option<&str>, context: &OperationContext) -> Option<MutationUpdater> {
        operation_name.and_then(|name| self.factories.get(name)).map(|factory| factory(context))
    }

    pub fn len(&self) -> usize { self.factories.len() }

    pub fn is_empty(&self) -> bool { self.factories.is_empty() }
}

impl std::fmt::Debug for CacheUpdates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.debug_set().entries(self.factories.keys()).finish() }
}

/// Write `result` into the cache and run the updater over it. A panicking updater is logged and
/// its partial changes kept.
pub fn fold_result(
    cache: &dyn NormalizedCache,
    document: &Document,
    variables: &Value,
    result: &FetchResult,
    updater: Option<&MutationUpdater>,
) -> Result<(), CacheError> {
    if let Some(data) = &result.data {
        if !data.is_null() {
            cache.write(document, variables, data)?;
        }
    }
    if let Some(update) = updater {
        if std::panic::catch_unwind(AssertUnwindSafe(|| update(cache, result))).is_err() {
            error!("Cache updater for {} panicked", document.name.as_deref().unwrap_or("<anonymous>"));
        }
    }
    Ok(())
}
