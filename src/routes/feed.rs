use axum::{
    extract::{Query, State},
    Extension, Json,
};
use std::sync::Arc;

use crate::{
    error::AppResult,
    middleware::RequestId,
    models::{FeedParams, Identity},
    routes::AppState,
    services::{cancellation, FeedPage},
};

/// Handler for the personalized feed endpoint
pub async fn feed(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    Query(params): Query<FeedParams>,
) -> AppResult<Json<FeedPage>> {
    tracing::info!(
        request_id = %request_id,
        identity = %identity,
        page = params.page,
        page_size = params.page_size,
        "Processing feed request"
    );

    // Feed queries run on spawned tasks; the guard cancels them if the client goes away
    let (_cancel_guard, cancel) = cancellation();
    let page = state
        .feed
        .assemble(Some(&identity), params.page, params.page_size, &cancel)
        .await;

    tracing::info!(
        request_id = %request_id,
        items = page.items.len(),
        has_more = page.has_more,
        "Feed assembled"
    );

    Ok(Json(page))
}
