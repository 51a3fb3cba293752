//! Test fixtures and factory functions for creating test data.

use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use study_backend::models::{Grade, ItemState, ReviewEvent, ReviewState};

/// Create a submit-review request body.
pub fn review_request(item_id: Uuid, grade: i64) -> serde_json::Value {
    json!({ "item_id": item_id, "grade": grade, "timezone_offset_hours": 0.0 })
}

/// Create a submit-review request body with a client timezone offset.
pub fn review_request_at_offset(item_id: Uuid, grade: i64, offset_hours: f64) -> serde_json::Value {
    json!({ "item_id": item_id, "grade": grade, "timezone_offset_hours": offset_hours })
}

/// Create an item-create request body.
pub fn create_item_request(item_id: Option<Uuid>, collection_id: Uuid) -> serde_json::Value {
    match item_id {
        Some(id) => json!({ "item_id": id, "collection_id": collection_id }),
        None => json!({ "collection_id": collection_id }),
    }
}

/// A Good review event for `item` at `at`, as if committed then.
pub fn review_event(item: &ItemState, at: DateTime<Utc>) -> ReviewEvent {
    let after = ReviewState {
        interval_days: 1,
        reviews_count: item.state.reviews_count + 1,
        next_due_at: at + chrono::Duration::days(1),
        ..item.state.clone()
    };
    ReviewEvent::record(item, Grade::Good, &after, at)
}
