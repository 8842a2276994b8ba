//! Authentication API endpoints
//!
//! Handles HTTP requests for accounts:
//! - POST /api/v1/auth/register - Registration (mentee or mentor)
//! - POST /api/v1/auth/login - Login
//! - POST /api/v1/auth/logout - Logout
//! - GET /api/v1/auth/me - Current user
//! - PUT /api/v1/auth/profile - Update name, phone, timezone
//! - PUT /api/v1/auth/password - Change password

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{extract_session_token, ApiError, AppState, AuthenticatedUser};
use crate::models::{Session, UpdateProfileInput, User};
use crate::services::user::{ChangePasswordInput, LoginInput, RegisterInput};

/// Request body for user registration
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub is_mentor: bool,
}

/// Request body for user login
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Response for successful authentication
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub token: String,
}

/// Response for user info
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub timezone: String,
    pub is_mentor: bool,
    pub sessions_requested: i64,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            phone: user.phone,
            timezone: user.timezone,
            is_mentor: user.is_mentor,
            sessions_requested: user.sessions_requested,
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

/// Public auth routes (no auth required)
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}

/// Protected auth routes, mounted behind the auth middleware
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(get_current_user))
        .route("/auth/profile", put(update_profile))
        .route("/auth/password", put(change_password))
}

fn session_cookie(session: &Session, days: i64) -> Result<HeaderMap, ApiError> {
    let cookie = format!(
        "session={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        session.id,
        days * 24 * 60 * 60
    );
    let value = HeaderValue::from_str(&cookie)
        .map_err(|e| ApiError::internal_error(format!("Invalid cookie: {}", e)))?;

    let mut headers = HeaderMap::new();
    headers.insert(header::SET_COOKIE, value);
    Ok(headers)
}

/// POST /api/v1/auth/register - User registration
///
/// Creates the account and logs it in.
async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let password = body.password.clone();
    let mut input = RegisterInput::new(body.email, body.password, body.first_name, body.last_name);
    if body.is_mentor {
        input = input.mentor();
    }

    let user = state.user_service.register(input).await?;
    let session = state
        .user_service
        .login(LoginInput::new(&user.email, &password))
        .await?;

    Ok((
        StatusCode::CREATED,
        session_cookie(&session, state.session_days)?,
        Json(AuthResponse {
            user: user.into(),
            token: session.id,
        }),
    ))
}

/// POST /api/v1/auth/login - User login
async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .user_service
        .login(LoginInput::new(body.email, body.password))
        .await?;

    let user = state
        .user_service
        .validate_session(&session.id)
        .await?
        .ok_or_else(|| ApiError::internal_error("Session validation failed"))?;

    Ok((
        session_cookie(&session, state.session_days)?,
        Json(AuthResponse {
            user: user.into(),
            token: session.id,
        }),
    ))
}

/// POST /api/v1/auth/logout - User logout
async fn logout(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let token = extract_session_token(&headers)
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    state.user_service.logout(&token).await?;

    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_static("session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"),
    );

    Ok((StatusCode::NO_CONTENT, response_headers))
}

/// GET /api/v1/auth/me - Get current user
async fn get_current_user(user: AuthenticatedUser) -> Json<UserResponse> {
    Json(user.0.into())
}

/// PUT /api/v1/auth/profile - Update current user's profile
async fn update_profile(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<UpdateProfileInput>,
) -> Result<Json<UserResponse>, ApiError> {
    let updated = state.user_service.update_profile(user.0.id, body).await?;
    Ok(Json(updated.into()))
}

/// Request body for changing password
#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
    #[serde(default)]
    pub confirm_password: String,
}

/// PUT /api/v1/auth/password - Change current user's password
async fn change_password(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .user_service
        .change_password(
            user.0.id,
            ChangePasswordInput {
                current_password: body.current_password,
                new_password: body.new_password,
                confirm_password: body.confirm_password,
            },
        )
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
