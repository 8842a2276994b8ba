//! Mentor API endpoints
//!
//! - GET /api/v1/mentors/{id} - Mentor profile with weekly slots
//! - GET /api/v1/mentors/{id}/availability - Accepted session starts
//! - PUT /api/v1/mentors/me/mentoring - Toggle accepting requests
//! - PUT /api/v1/mentors/me/slots - Replace weekly slots

use axum::{
    extract::{Path, State},
    routing::{get, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::Mentor;
use crate::services::mentor::SlotInput;

/// Public mentor routes
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/mentors/{id}", get(get_mentor))
        .route("/mentors/{id}/availability", get(get_availability))
}

/// Routes acting on the caller's own mentor profile
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/mentors/me/mentoring", put(set_mentoring))
        .route("/mentors/me/slots", put(set_slots))
}

/// Response for accepted session starts
#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub mentor_id: i64,
    /// Starts already taken by accepted sessions
    pub booked: Vec<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct MentoringRequest {
    pub is_mentoring: bool,
}

#[derive(Debug, Deserialize)]
pub struct SlotsRequest {
    pub slots: Vec<SlotInput>,
}

/// GET /api/v1/mentors/{id}
async fn get_mentor(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Mentor>, ApiError> {
    let mentor = state.mentor_service.get(id).await?;
    Ok(Json(mentor))
}

/// GET /api/v1/mentors/{id}/availability
async fn get_availability(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<AvailabilityResponse>, ApiError> {
    let booked = state.booking_service.availability(id).await?;
    Ok(Json(AvailabilityResponse {
        mentor_id: id,
        booked,
    }))
}

/// PUT /api/v1/mentors/me/mentoring
async fn set_mentoring(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<MentoringRequest>,
) -> Result<Json<Mentor>, ApiError> {
    let mentor = state
        .mentor_service
        .set_mentoring(user.0.id, body.is_mentoring)
        .await?;
    Ok(Json(mentor))
}

/// PUT /api/v1/mentors/me/slots
async fn set_slots(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<SlotsRequest>,
) -> Result<Json<Mentor>, ApiError> {
    let mentor = state.mentor_service.set_slots(user.0.id, body.slots).await?;
    Ok(Json(mentor))
}
