//! Notification API endpoints
//!
//! - GET /api/v1/notifications?unread=true - Own notifications, newest first
//! - PUT /api/v1/notifications/{id}/read - Mark one read
//! - PUT /api/v1/notifications/read-all - Mark all read

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::Notification;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(list_notifications))
        .route("/notifications/read-all", put(mark_all_read))
        .route("/notifications/{id}/read", put(mark_read))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListNotificationsQuery {
    #[serde(default)]
    pub unread: bool,
}

#[derive(Debug, Serialize)]
pub struct MarkAllReadResponse {
    pub updated: u64,
}

async fn list_notifications(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<ListNotificationsQuery>,
) -> Result<Json<Vec<Notification>>, ApiError> {
    let list = state
        .notification_service
        .list_for_user(user.0.id, query.unread)
        .await?;
    Ok(Json(list))
}

async fn mark_read(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.notification_service.mark_read(user.0.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn mark_all_read(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<MarkAllReadResponse>, ApiError> {
    let updated = state.notification_service.mark_all_read(user.0.id).await?;
    Ok(Json(MarkAllReadResponse { updated }))
}
