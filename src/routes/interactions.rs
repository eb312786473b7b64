use axum::{
    extract::{Query, State},
    Extension, Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    middleware::RequestId,
    models::{HistoryParams, Identity, Interaction, InteractionRequest, SearchHistoryRequest},
    routes::AppState,
};

/// Largest page of interaction history served at once
const MAX_HISTORY_LIMIT: usize = 50;

/// Handler for tracking an interaction with a recommendation
pub async fn track_interaction(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<InteractionRequest>,
) -> AppResult<Json<Value>> {
    let title = request.title.trim();
    let action = request.action.trim();
    if title.is_empty() || action.is_empty() {
        return Err(AppError::InvalidInput(
            "Title and action are required".to_string(),
        ));
    }

    let interaction = Interaction {
        title: title.to_string(),
        action: action.to_lowercase(),
        timestamp: request.timestamp.unwrap_or_else(|| state.clock.now()),
    };

    state
        .context_source
        .record_interaction(&identity, interaction)
        .await?;

    tracing::info!(
        request_id = %request_id,
        identity = %identity,
        action = %action,
        "Interaction tracked"
    );

    Ok(Json(json!({
        "success": true,
        "message": "Interaction tracked successfully"
    })))
}

/// Handler for recording a search query
pub async fn record_search(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<SearchHistoryRequest>,
) -> AppResult<Json<Value>> {
    let query = request.query.trim();
    if query.is_empty() {
        return Err(AppError::InvalidInput("Query is required".to_string()));
    }

    state
        .context_source
        .record_search(&identity, query, state.clock.now())
        .await?;

    tracing::info!(
        request_id = %request_id,
        identity = %identity,
        "Search recorded"
    );

    Ok(Json(json!({
        "success": true,
        "message": "Search history updated successfully"
    })))
}

/// Handler returning the caller's interactions, most recent first
pub async fn interaction_history(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Query(params): Query<HistoryParams>,
) -> AppResult<Json<Value>> {
    let limit = params.limit.clamp(1, MAX_HISTORY_LIMIT);
    let interactions = state
        .context_source
        .recent_interactions(&identity, limit)
        .await?;

    Ok(Json(json!({
        "success": true,
        "interactions": interactions
    })))
}

/// Handler returning the caller's distinct searches, most recent first
pub async fn search_history(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> AppResult<Json<Value>> {
    let searches = state.context_source.search_history(&identity).await?;

    Ok(Json(json!({
        "success": true,
        "searches": searches
    })))
}
