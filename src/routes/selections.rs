use axum::{extract::State, Extension, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::{
    error::AppResult,
    middleware::RequestId,
    models::{Identity, InterestsRequest, SelectedPlatformsRequest, WeightedInterest},
    routes::AppState,
};

/// Handler returning the caller's selected platforms
pub async fn get_selected_platforms(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> AppResult<Json<Value>> {
    let platforms = state.context_source.selected_platforms(&identity).await?;

    Ok(Json(json!({
        "success": true,
        "selected_platforms": platforms
    })))
}

/// Handler replacing the caller's selected platforms
pub async fn save_selected_platforms(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<SelectedPlatformsRequest>,
) -> AppResult<Json<Value>> {
    let platforms = distinct_names(request.platforms);
    let count = platforms.len();

    state
        .context_source
        .save_selected_platforms(&identity, platforms)
        .await?;

    tracing::info!(
        request_id = %request_id,
        identity = %identity,
        platforms = count,
        "Selected platforms saved"
    );

    Ok(Json(json!({
        "success": true,
        "message": "Selected platforms saved successfully"
    })))
}

/// Handler returning the caller's interests, heaviest first
pub async fn get_interests(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> AppResult<Json<Value>> {
    let mut interests = state.context_source.interests(&identity).await?;
    interests.sort_by(|a, b| b.weight.cmp(&a.weight));

    Ok(Json(json!({
        "success": true,
        "interests": interests
    })))
}

/// Handler replacing the caller's interests
pub async fn save_interests(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<InterestsRequest>,
) -> AppResult<Json<Value>> {
    let mut interests: Vec<WeightedInterest> = Vec::new();
    for input in request.interests {
        let interest = input.interest.trim();
        if interest.is_empty() || interests.iter().any(|i| i.interest == interest) {
            continue;
        }
        interests.push(WeightedInterest {
            interest: interest.to_string(),
            weight: input.weight,
        });
    }
    let count = interests.len();

    state
        .context_source
        .save_interests(&identity, interests)
        .await?;

    tracing::info!(
        request_id = %request_id,
        identity = %identity,
        interests = count,
        "Interests saved"
    );

    Ok(Json(json!({
        "success": true,
        "message": "Interests saved successfully"
    })))
}

/// Trimmed, non-blank names in first-seen order
fn distinct_names(names: Vec<String>) -> Vec<String> {
    let mut distinct: Vec<String> = Vec::new();
    for name in names {
        let name = name.trim();
        if !name.is_empty() && !distinct.iter().any(|d| d == name) {
            distinct.push(name.to_string());
        }
    }
    distinct
}
