//! Shared state of the HTTP handlers

use std::{fmt, sync::Arc};

use iroh_metrics::Registry;

use crate::{
    context::ContextBuilder, graphql::ProfileSchema, metrics::Metrics, store::ProfileStore,
};

/// The shared app state.
#[derive(Clone)]
pub struct AppState {
    /// The GraphQL schema, with store and bus injected
    pub schema: ProfileSchema,
    /// The profile store, used by the health check
    pub store: Arc<dyn ProfileStore>,
    /// Builds the caller identity of each request
    pub context: ContextBuilder,
    /// Request counters
    pub metrics: Arc<Metrics>,
    /// Registry served on `/metrics`, if enabled
    pub registry: Option<Arc<Registry>>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("store", &self.store)
            .field("context", &self.context)
            .field("metrics_enabled", &self.registry.is_some())
            .finish_non_exhaustive()
    }
}
