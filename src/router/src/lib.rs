use std::sync::Arc;

use axum::{
    Router,
    http::StatusCode,
    response::IntoResponse,
    routing::{any, get},
};
use common::config::Configuration;
use common::index::MetricIndex;
use common::stats::StatsSink;
use querier::RenderService;
use tower_http::trace::TraceLayer;

pub mod endpoints;
pub mod error;
pub mod params;

pub use error::ApiError;

pub trait RouterState: std::fmt::Debug + Clone + Send + Sync + 'static {
    fn config(&self) -> &Configuration;
    fn render_service(&self) -> &RenderService;
    fn index(&self) -> &Arc<dyn MetricIndex>;
    fn stats(&self) -> &Arc<dyn StatsSink>;
}

/// Shared state handed to every route handler
#[derive(Clone)]
pub struct ReaderState {
    config: Configuration,
    render_service: RenderService,
    index: Arc<dyn MetricIndex>,
    stats: Arc<dyn StatsSink>,
}

impl std::fmt::Debug for ReaderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderState")
            .field("config", &self.config)
            .field("render_service", &"RenderService")
            .field("index", &"MetricIndex")
            .field("stats", &"StatsSink")
            .finish()
    }
}

impl ReaderState {
    pub fn new(
        config: Configuration,
        render_service: RenderService,
        index: Arc<dyn MetricIndex>,
        stats: Arc<dyn StatsSink>,
    ) -> Self {
        Self {
            config,
            render_service,
            index,
            stats,
        }
    }
}

impl RouterState for ReaderState {
    fn config(&self) -> &Configuration {
        &self.config
    }

    fn render_service(&self) -> &RenderService {
        &self.render_service
    }

    fn index(&self) -> &Arc<dyn MetricIndex> {
        &self.index
    }

    fn stats(&self) -> &Arc<dyn StatsSink> {
        &self.stats
    }
}

/// Create a new router instance with all routes configured
pub fn create_router<S: RouterState>(state: S) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(
            "/render",
            get(endpoints::render::render::<S>).post(endpoints::render::render::<S>),
        )
        .route("/paths", any(endpoints::search::paths::<S>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}
