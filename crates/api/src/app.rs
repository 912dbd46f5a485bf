use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use domain::services::{BatteryUsageEngine, DataProcessor, EntryInfoCache};

use crate::config::Config;
use crate::middleware::{metrics_handler, metrics_middleware, trace_id};
use crate::routes::{battery, health, locale};
use crate::services::{LatestUsage, StaticAppInfoResolver, UsageEngine};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub engine: Arc<UsageEngine>,
    pub cache: Arc<EntryInfoCache>,
    pub latest: LatestUsage,
}

impl AppState {
    /// Builds the engine and its shared caches from configuration.
    pub fn new(config: Config) -> Self {
        let resolver = Arc::new(StaticAppInfoResolver::new(&config.apps));
        let cache = Arc::new(EntryInfoCache::new(resolver));
        let engine = Arc::new(BatteryUsageEngine::new(
            DataProcessor::new(config.time_zone(), config.thresholds),
            Arc::new(config.policy.clone()),
            Arc::clone(&cache),
        ));

        Self {
            config: Arc::new(config),
            engine,
            cache,
            latest: LatestUsage::new(),
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.config.server.request_timeout_secs);

    let battery_routes = Router::new()
        .route("/api/v1/battery/levels", get(battery::get_levels))
        .route("/api/v1/battery/usage", get(battery::get_usage))
        .route("/api/v1/battery/highlight", get(battery::get_highlight))
        .route("/api/v1/battery/compute", post(battery::compute))
        .route("/api/v1/locale", post(locale::update_locale));

    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/live", get(health::live))
        .route("/metrics", get(metrics_handler));

    Router::new()
        .merge(public_routes)
        .merge(battery_routes)
        // Global middleware (order matters: bottom layers run first)
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(timeout))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_id))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
