use axum::{extract::State, Extension, Json};
use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    middleware::RequestId,
    models::{Identity, RecommendationRequest, Recommendations},
    routes::AppState,
    services::cancellation,
};

/// Handler for the recommendations endpoint
///
/// Always answers with recommendations once the query is valid; model failures
/// surface only as `"source": "fallback"`.
pub async fn recommend(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<RecommendationRequest>,
) -> AppResult<Json<Recommendations>> {
    let query = request.query.trim();
    if query.is_empty() {
        return Err(AppError::InvalidInput("Query is required".to_string()));
    }

    tracing::info!(
        request_id = %request_id,
        identity = %identity,
        query = %query,
        "Processing recommendation request"
    );

    // Dropped with this handler, which stops any retry still in flight
    let (_cancel_guard, cancel) = cancellation();
    let recommendations = state
        .recommender
        .get_recommendations(query, Some(&identity), &cancel)
        .await;

    Ok(Json(recommendations))
}
