//! API middleware
//!
//! Contains:
//! - Shared application state
//! - The JSON error envelope and service error mapping
//! - Authentication (session token validation)

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::models::User;
use crate::services::booking::{BookingService, BookingServiceError, ErrorKind};
use crate::services::mentor::{MentorService, MentorServiceError};
use crate::services::notification::{NotificationService, NotificationServiceError};
use crate::services::user::{UserService, UserServiceError};

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub user_service: Arc<UserService>,
    pub mentor_service: Arc<MentorService>,
    pub booking_service: Arc<BookingService>,
    pub notification_service: Arc<NotificationService>,
    /// Lifetime of the session cookie
    pub session_days: i64,
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

// ============================================================================
// Error envelope
// ============================================================================

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "CONFLICT" => StatusCode::CONFLICT,
            "DELIVERY_FAILED" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

/// Internal details are logged, never returned
fn internal(e: impl std::fmt::Display) -> ApiError {
    tracing::error!("Internal error: {:#}", e);
    ApiError::internal_error("Internal server error")
}

impl From<UserServiceError> for ApiError {
    fn from(e: UserServiceError) -> Self {
        match e {
            UserServiceError::AuthenticationError(msg) => ApiError::unauthorized(msg),
            UserServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            UserServiceError::UserExists(msg) => ApiError::conflict(msg),
            UserServiceError::UserNotFound => ApiError::not_found("User not found"),
            UserServiceError::InternalError(e) => internal(e),
        }
    }
}

impl From<MentorServiceError> for ApiError {
    fn from(e: MentorServiceError) -> Self {
        match e {
            MentorServiceError::NotFound => ApiError::not_found(e.to_string()),
            MentorServiceError::NotAMentor => ApiError::forbidden(e.to_string()),
            MentorServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            MentorServiceError::InternalError(e) => internal(e),
        }
    }
}

impl From<NotificationServiceError> for ApiError {
    fn from(e: NotificationServiceError) -> Self {
        match e {
            NotificationServiceError::NotFound => ApiError::not_found(e.to_string()),
            NotificationServiceError::InternalError(e) => internal(e),
        }
    }
}

impl From<BookingServiceError> for ApiError {
    fn from(e: BookingServiceError) -> Self {
        let message = e.to_string();
        match e {
            BookingServiceError::DeliveryFailed { booking, report } => ApiError::with_details(
                "DELIVERY_FAILED",
                message,
                serde_json::json!({ "booking_id": booking.id, "report": report }),
            ),
            BookingServiceError::DuplicateWaiting(id)
            | BookingServiceError::DuplicateWaitingAtTime(id) => ApiError::with_details(
                "CONFLICT",
                message,
                serde_json::json!({ "booking_id": id }),
            ),
            BookingServiceError::InternalError(e) => internal(e),
            other => match other.kind() {
                ErrorKind::Validation => ApiError::validation_error(message),
                ErrorKind::Authorization => ApiError::forbidden(message),
                ErrorKind::NotFound => ApiError::not_found(message),
                ErrorKind::Conflict => ApiError::conflict(message),
                ErrorKind::Delivery | ErrorKind::Internal => internal(message),
            },
        }
    }
}

// ============================================================================
// Authentication
// ============================================================================

/// Extract the session token from the `Authorization: Bearer` header or the
/// `session` cookie. The header wins when both are present.
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }

    if let Some(cookie_header) = headers.get(header::COOKIE) {
        if let Ok(cookie_str) = cookie_header.to_str() {
            for cookie in cookie_str.split(';') {
                if let Some(token) = cookie.trim().strip_prefix("session=") {
                    return Some(token.to_string());
                }
            }
        }
    }

    None
}

/// Authentication middleware
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_session_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    let user = state
        .user_service
        .validate_session(&token)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired session"))?;

    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Booking, SessionDetails};
    use crate::services::dispatch::DispatchReport;
    use axum::http::HeaderValue;

    fn headers(name: header::HeaderName, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_extract_session_token_from_bearer() {
        let headers = headers(header::AUTHORIZATION, "Bearer test-token-123");
        assert_eq!(extract_session_token(&headers), Some("test-token-123".to_string()));
    }

    #[test]
    fn test_extract_session_token_from_cookie() {
        let headers = headers(header::COOKIE, "theme=dark; session=test-token-456");
        assert_eq!(extract_session_token(&headers), Some("test-token-456".to_string()));
    }

    #[test]
    fn test_extract_session_token_bearer_priority() {
        let mut headers = headers(header::AUTHORIZATION, "Bearer bearer-token");
        headers.insert(header::COOKIE, HeaderValue::from_static("session=cookie-token"));
        assert_eq!(extract_session_token(&headers), Some("bearer-token".to_string()));
    }

    #[test]
    fn test_extract_session_token_none() {
        assert!(extract_session_token(&HeaderMap::new()).is_none());
        let headers = headers(header::AUTHORIZATION, "Basic invalid");
        assert!(extract_session_token(&headers).is_none());
    }

    #[test]
    fn test_status_per_code() {
        assert_eq!(ApiError::validation_error("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::unauthorized("x").status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::forbidden("x").status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::not_found("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::conflict("x").status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::new("DELIVERY_FAILED", "x").status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            ApiError::new("SOMETHING_ELSE", "x").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_booking_errors_map_to_codes() {
        let cases = [
            (BookingServiceError::SelfBookingNotAllowed, "VALIDATION_ERROR"),
            (BookingServiceError::Forbidden, "FORBIDDEN"),
            (BookingServiceError::BookingNotFound, "NOT_FOUND"),
            (BookingServiceError::MentorAlreadyBooked, "CONFLICT"),
            (BookingServiceError::NoMatchingSlot, "CONFLICT"),
        ];
        for (err, code) in cases {
            assert_eq!(ApiError::from(err).error.code, code);
        }

        let err = ApiError::from(BookingServiceError::DuplicateWaiting(12));
        assert_eq!(err.error.details.unwrap()["booking_id"], 12);
    }

    #[test]
    fn test_delivery_failed_carries_booking_id() {
        let mut booking = Booking::new(
            1,
            2,
            "m@example.com".into(),
            "e@example.com".into(),
            chrono::Utc::now(),
            SessionDetails::default(),
        )
        .unwrap();
        booking.id = 42;
        let err = ApiError::from(BookingServiceError::DeliveryFailed {
            booking: Box::new(booking),
            report: DispatchReport::default(),
        });
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.error.details.unwrap()["booking_id"], 42);
    }

    #[test]
    fn test_internal_errors_hide_details() {
        let err = ApiError::from(UserServiceError::InternalError(anyhow::anyhow!(
            "connection refused at 10.0.0.3"
        )));
        assert_eq!(err.error.code, "INTERNAL_ERROR");
        assert!(!err.error.message.contains("10.0.0.3"));
    }
}
