//! API layer - HTTP handlers and routing
//!
//! All endpoints live under `/api/v1`:
//! - Auth endpoints (register, login, session, profile)
//! - Mentor endpoints (profiles, availability, slots)
//! - Booking endpoints (request, list, accept, reject)
//! - Notification endpoints

pub mod auth;
pub mod bookings;
pub mod mentors;
pub mod middleware;
pub mod notifications;

use anyhow::Context;
use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use middleware::{ApiError, AppState, AuthenticatedUser};

/// Build the API router mounted at `/api/v1`
pub fn build_api_router(state: AppState) -> Router<AppState> {
    // Protected routes (need a valid session)
    let protected_routes = Router::new()
        .merge(auth::protected_router())
        .merge(mentors::protected_router())
        .merge(bookings::router())
        .merge(notifications::router())
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::require_auth,
        ));

    // Public routes
    Router::new()
        .merge(auth::public_router())
        .merge(mentors::public_router())
        .merge(protected_routes)
}

fn cors_layer(cors_origin: &str) -> anyhow::Result<CorsLayer> {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE]);

    // Wildcard origins cannot carry cookies
    if cors_origin == "*" {
        return Ok(cors.allow_origin(Any));
    }
    let origin = cors_origin
        .parse::<HeaderValue>()
        .with_context(|| format!("Invalid CORS origin: {}", cors_origin))?;
    Ok(cors.allow_origin(origin).allow_credentials(true))
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> anyhow::Result<Router> {
    Ok(Router::new()
        .nest("/api/v1", build_api_router(state.clone()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(cors_origin)?),
        )
        .with_state(state))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cors_layer_accepts_origin_and_wildcard() {
        assert!(cors_layer("http://localhost:3000").is_ok());
        assert!(cors_layer("*").is_ok());
        assert!(cors_layer("bad\norigin").is_err());
    }
}
