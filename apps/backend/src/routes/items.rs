//! Item state endpoints at the item CRUD boundary

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use uuid::Uuid;

use crate::error::{ApiError, Result};
use crate::models::*;
use crate::routes::auth::AuthenticatedOwner;
use crate::AppState;

/// POST /api/items
pub async fn create(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedOwner>,
    Json(payload): Json<CreateItemRequest>,
) -> Result<(StatusCode, Json<ItemState>)> {
    let item_id = payload.item_id.unwrap_or_else(Uuid::new_v4);
    let item = state
        .coordinator
        .create_item(auth.owner_id, item_id, payload.collection_id, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// GET /api/items/:id
pub async fn get(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedOwner>,
    Path(item_id): Path<Uuid>,
) -> Result<Json<ItemState>> {
    let item = owned_item(&state, auth.owner_id, item_id).await?;
    Ok(Json(item))
}

/// GET /api/items/:id/reviews
pub async fn reviews(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedOwner>,
    Path(item_id): Path<Uuid>,
) -> Result<Json<ItemReviewsResponse>> {
    owned_item(&state, auth.owner_id, item_id).await?;
    let reviews = state.store.get_reviews_for_item(item_id).await?;
    Ok(Json(ItemReviewsResponse { item_id, reviews }))
}

/// DELETE /api/items/:id
pub async fn delete(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedOwner>,
    Path(item_id): Path<Uuid>,
) -> Result<StatusCode> {
    state.coordinator.delete_item(auth.owner_id, item_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn owned_item(state: &AppState, owner_id: Uuid, item_id: Uuid) -> Result<ItemState> {
    match state.store.get_item_state(item_id).await? {
        Some(item) if item.owner_id == owner_id => Ok(item),
        _ => Err(ApiError::NotFound(format!("Item {} not found", item_id))),
    }
}
