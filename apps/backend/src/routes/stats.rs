//! Stats endpoints

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::Utc;

use study_core::TimezoneOffset;

use crate::error::Result;
use crate::models::*;
use crate::routes::auth::AuthenticatedOwner;
use crate::AppState;

/// GET /api/stats
pub async fn get(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedOwner>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<StatsResponse>> {
    let offset = TimezoneOffset::from_hours(query.timezone_offset_hours)?;
    let stats = state
        .stats
        .get_stats(auth.owner_id, offset, Utc::now())
        .await?;
    Ok(Json(stats))
}
