//! Metrics support for the server

use std::sync::Arc;

use iroh_metrics::{Counter, MetricsGroup, MetricsGroupSet};

/// Metrics for profile-server
#[derive(Debug, Default, MetricsGroup)]
#[metrics(name = "profile_server")]
pub struct Metrics {
    /// Profiles inserted into the store
    pub store_profiles_inserted: Counter,
    /// Profiles replaced by an update
    pub store_profiles_updated: Counter,
    /// Profiles removed from the store
    pub store_profiles_removed: Counter,
    /// Point lookups by id or pnc
    pub store_lookups: Counter,
    /// Lookups that matched no profile
    pub store_lookups_notfound: Counter,
    /// Store operations that failed
    pub store_errors: Counter,
    /// Store operations that exceeded the configured timeout
    pub store_timeouts: Counter,

    /// Events handed to the notification bus
    pub events_published: Counter,
    /// Events published while no subscriber was registered
    pub events_unobserved: Counter,
    /// Events skipped by subscribers that fell behind
    pub events_lagged: Counter,
    /// Subscriptions opened
    pub subscriptions_opened: Counter,

    /// Number of HTTP requests
    pub http_requests: Counter,
    /// Number of HTTP requests with a 2xx status code
    pub http_requests_success: Counter,
    /// Number of HTTP requests with a non-2xx status code
    pub http_requests_error: Counter,
    /// Total duration of all HTTP requests
    pub http_requests_duration_ms: Counter,
}

/// All metrics tracked by the server.
#[derive(Debug, Default, Clone, MetricsGroupSet)]
#[metrics(name = "profile_server")]
pub struct ServerMetrics {
    /// Store, bus and HTTP counters.
    pub profiles: Arc<Metrics>,
}
