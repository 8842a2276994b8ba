//! Booking API endpoints
//!
//! All routes require authentication:
//! - POST /api/v1/bookings - Request a session (caller is the mentee)
//! - GET /api/v1/bookings?type=upcoming|past|pending - List own bookings
//! - PUT /api/v1/bookings/{id}/accept - Accept (caller is the mentor)
//! - PUT /api/v1/bookings/{id}/reject - Reject (caller is the mentor)

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::BookingWithParties;
use crate::services::booking::{BookingOutcome, CreateBookingInput};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/bookings", get(list_bookings).post(create_booking))
        .route("/bookings/{id}/accept", put(accept_booking))
        .route("/bookings/{id}/reject", put(reject_booking))
}

#[derive(Debug, Deserialize)]
pub struct ListBookingsQuery {
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// POST /api/v1/bookings
async fn create_booking(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateBookingInput>,
) -> Result<(StatusCode, Json<BookingOutcome>), ApiError> {
    let outcome = state.booking_service.create(user.0.id, body).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// GET /api/v1/bookings?type=
async fn list_bookings(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<ListBookingsQuery>,
) -> Result<Json<Vec<BookingWithParties>>, ApiError> {
    let list = state.booking_service.list(user.0.id, &query.kind).await?;
    Ok(Json(list))
}

/// PUT /api/v1/bookings/{id}/accept
async fn accept_booking(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<BookingOutcome>, ApiError> {
    let outcome = state.booking_service.accept(user.0.id, id).await?;
    Ok(Json(outcome))
}

/// PUT /api/v1/bookings/{id}/reject
///
/// Body `{ "reason": "..." }`; send `{}` for no reason.
async fn reject_booking(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<RejectRequest>,
) -> Result<Json<BookingOutcome>, ApiError> {
    let outcome = state
        .booking_service
        .reject(user.0.id, id, body.reason)
        .await?;
    Ok(Json(outcome))
}
