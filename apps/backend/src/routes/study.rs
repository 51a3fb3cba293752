//! Study endpoints

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::Utc;

use crate::error::{ApiError, Result};
use crate::models::*;
use crate::routes::auth::AuthenticatedOwner;
use crate::services::ReviewSubmission;
use crate::AppState;

const DEFAULT_DUE_LIMIT: usize = 50;
const MAX_DUE_LIMIT: usize = 500;

/// POST /api/study/review
pub async fn review(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedOwner>,
    Json(payload): Json<SubmitReviewRequest>,
) -> Result<Json<SubmitReviewResponse>> {
    let submission = ReviewSubmission {
        owner_id: auth.owner_id,
        item_id: payload.item_id,
        grade: payload.grade,
        timezone_offset_hours: payload.timezone_offset_hours,
    };

    let response = state
        .coordinator
        .submit_review(submission, Utc::now())
        .await?;

    Ok(Json(response))
}

/// GET /api/study/due
pub async fn due(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedOwner>,
    Query(query): Query<DueItemsQuery>,
) -> Result<Json<DueItemsResponse>> {
    let limit = query.limit.unwrap_or(DEFAULT_DUE_LIMIT);
    if limit == 0 || limit > MAX_DUE_LIMIT {
        return Err(ApiError::BadRequest(format!(
            "limit must be between 1 and {}",
            MAX_DUE_LIMIT
        )));
    }

    let now = Utc::now();
    let indexed = state
        .due_queue
        .due_items(auth.owner_id, query.collection_id, now, limit)
        .await;

    let item_ids = match indexed {
        Some(ids) => ids,
        None => {
            tracing::warn!(owner_id = %auth.owner_id, "due-queue unavailable, scanning ground truth");
            state
                .store
                .get_item_states_by_owner(auth.owner_id)
                .await?
                .into_iter()
                .filter(|s| s.next_due_at() <= now)
                .filter(|s| query.collection_id.map_or(true, |c| s.collection_id == c))
                .take(limit)
                .map(|s| s.item_id)
                .collect()
        }
    };

    let due_count = state.stats.due_today(auth.owner_id, now).await?;

    Ok(Json(DueItemsResponse {
        item_ids,
        due_count,
    }))
}

/// POST /api/study/rebuild
pub async fn rebuild(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedOwner>,
) -> Result<Json<RebuildResponse>> {
    let report = state
        .due_queue
        .rebuild_from_ground_truth(auth.owner_id)
        .await?
        .ok_or_else(|| ApiError::Internal("Cache unavailable, index not rebuilt".to_string()))?;

    Ok(Json(RebuildResponse {
        indexed_items: report.indexed,
    }))
}
