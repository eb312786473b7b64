use axum::{
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    config::PipelineConfig,
    middleware::{identity_middleware, make_span_with_request_id, request_id_middleware},
    services::{Clock, ContextSource, FeedAssembler, Recommender, TextGenerator, UrlProbe},
};

pub mod feed;
pub mod interactions;
pub mod recommendations;
pub mod selections;

/// Shared application state
pub struct AppState {
    pub recommender: Recommender,
    pub feed: FeedAssembler,
    pub context_source: Arc<dyn ContextSource>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Wires the pipeline from its collaborators
    pub fn new(
        context_source: Arc<dyn ContextSource>,
        generator: Arc<dyn TextGenerator>,
        clock: Arc<dyn Clock>,
        pipeline: &PipelineConfig,
        probe: Option<UrlProbe>,
    ) -> Self {
        let recommender = Recommender::new(
            context_source.clone(),
            generator,
            clock.clone(),
            pipeline,
        );
        let feed = FeedAssembler::new(recommender.clone(), clock.clone(), probe);

        Self {
            recommender,
            feed,
            context_source,
            clock,
        }
    }
}

/// Creates the application router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes())
        .layer(
            ServiceBuilder::new()
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
                .layer(middleware::from_fn(identity_middleware)),
        )
        .with_state(Arc::new(state))
}

/// API routes under /api/v1
fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/recommendations", post(recommendations::recommend))
        .route("/feed", get(feed::feed))
        .route("/interactions", post(interactions::track_interaction))
        .route("/interaction-history", get(interactions::interaction_history))
        .route(
            "/search-history",
            get(interactions::search_history).post(interactions::record_search),
        )
        .route(
            "/selected-platforms",
            get(selections::get_selected_platforms).post(selections::save_selected_platforms),
        )
        .route(
            "/interests",
            get(selections::get_interests).post(selections::save_interests),
        )
}

/// Health check endpoint
async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}
