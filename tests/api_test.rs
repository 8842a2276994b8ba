//! End-to-end tests of the HTTP API against an in-memory database

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{json, Value};
use std::sync::Arc;

use vita::api::{self, AppState};
use vita::db::repositories::{
    SqlxBookingRepository, SqlxMentorRepository, SqlxNotificationRepository,
    SqlxSessionRepository, SqlxUserRepository,
};
use vita::db::{create_test_pool, migrations};
use vita::services::booking::{BookingService, BookingSettings};
use vita::services::mentor::MentorService;
use vita::services::notification::NotificationService;
use vita::services::user::UserService;

/// Monday 14:00 UTC
const START: &str = "2030-01-07T14:00:00Z";

async fn server() -> TestServer {
    let pool = create_test_pool().await.expect("Failed to create test pool");
    migrations::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    let user_repo = SqlxUserRepository::boxed(pool.clone());
    let mentor_repo = SqlxMentorRepository::boxed(pool.clone());
    let notification_service = Arc::new(NotificationService::new(
        SqlxNotificationRepository::boxed(pool.clone()),
    ));
    let booking_service = BookingService::new(
        SqlxBookingRepository::boxed(pool.clone()),
        user_repo.clone(),
        mentor_repo.clone(),
        notification_service.clone(),
        BookingSettings::default(),
    )
    .expect("Failed to create booking service");

    let state = AppState {
        user_service: Arc::new(UserService::new(
            user_repo,
            SqlxSessionRepository::boxed(pool.clone()),
            mentor_repo.clone(),
        )),
        mentor_service: Arc::new(MentorService::new(mentor_repo)),
        booking_service: Arc::new(booking_service),
        notification_service,
        session_days: 7,
    };

    let app = api::build_router(state, "http://localhost:3000").expect("Failed to build router");
    TestServer::new(app).expect("Failed to start test server")
}

/// Register and return (user id, token)
async fn register(server: &TestServer, email: &str, first: &str, mentor: bool) -> (i64, String) {
    let response = server
        .post("/api/v1/auth/register")
        .json(&json!({
            "email": email,
            "password": "correct horse",
            "first_name": first,
            "last_name": "Tester",
            "is_mentor": mentor,
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    let body: Value = response.json();
    (
        body["user"]["id"].as_i64().unwrap(),
        body["token"].as_str().unwrap().to_string(),
    )
}

async fn open_mentor(server: &TestServer, token: &str) {
    let response = server
        .put("/api/v1/mentors/me/slots")
        .authorization_bearer(token)
        .json(&json!({ "slots": [
            { "day": "Mon", "hour": 14, "minute": 0 },
            { "day": "Mon", "hour": 14, "minute": 0 },
        ]}))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>()["slots"].as_array().unwrap().len(), 1);

    let response = server
        .put("/api/v1/mentors/me/mentoring")
        .authorization_bearer(token)
        .json(&json!({ "is_mentoring": true }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>()["is_mentoring"], true);
}

#[tokio::test]
async fn test_auth_flow() {
    let server = server().await;
    let (id, token) = register(&server, "ada@example.com", "Ada", false).await;

    let me = server.get("/api/v1/auth/me").authorization_bearer(&token).await;
    assert_eq!(me.status_code(), StatusCode::OK);
    assert_eq!(me.json::<Value>()["id"], id);

    let duplicate = server
        .post("/api/v1/auth/register")
        .json(&json!({ "email": "ADA@example.com", "password": "whatever1", "first_name": "A" }))
        .await;
    assert_eq!(duplicate.status_code(), StatusCode::CONFLICT);
    assert_eq!(duplicate.json::<Value>()["error"]["code"], "CONFLICT");

    let bad_login = server
        .post("/api/v1/auth/login")
        .json(&json!({ "email": "ada@example.com", "password": "wrong password" }))
        .await;
    assert_eq!(bad_login.status_code(), StatusCode::UNAUTHORIZED);

    let profile = server
        .put("/api/v1/auth/profile")
        .authorization_bearer(&token)
        .json(&json!({ "timezone": "Not/AZone" }))
        .await;
    assert_eq!(profile.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(profile.json::<Value>()["error"]["code"], "VALIDATION_ERROR");

    let logout = server.post("/api/v1/auth/logout").authorization_bearer(&token).await;
    assert_eq!(logout.status_code(), StatusCode::NO_CONTENT);

    let me = server.get("/api/v1/auth/me").authorization_bearer(&token).await;
    assert_eq!(me.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_protected_routes_require_session() {
    let server = server().await;
    let response = server.get("/api/v1/bookings").add_query_param("type", "pending").await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.json::<Value>()["error"]["code"], "UNAUTHORIZED");

    let response = server
        .get("/api/v1/notifications")
        .authorization_bearer("not-a-session")
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_booking_lifecycle() {
    let server = server().await;
    let (mentor_id, mentor) = register(&server, "mo@example.com", "Mo", true).await;
    let (_, mentee) = register(&server, "ed@example.com", "Ed", false).await;

    // Not mentoring yet
    let response = server
        .post("/api/v1/bookings")
        .authorization_bearer(&mentee)
        .json(&json!({ "mentor_id": mentor_id, "start_at": START }))
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    open_mentor(&server, &mentor).await;

    let profile = server.get(&format!("/api/v1/mentors/{}", mentor_id)).await;
    assert_eq!(profile.status_code(), StatusCode::OK);
    assert_eq!(profile.json::<Value>()["slots"][0]["hour"], 14);

    // Off-slot request
    let response = server
        .post("/api/v1/bookings")
        .authorization_bearer(&mentee)
        .json(&json!({ "mentor_id": mentor_id, "start_at": "2030-01-08T14:00:00Z" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CONFLICT);

    let response = server
        .post("/api/v1/bookings")
        .authorization_bearer(&mentee)
        .json(&json!({
            "mentor_id": mentor_id,
            "start_at": START,
            "topic": "Lifetimes",
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    let created: Value = response.json();
    let booking_id = created["booking"]["id"].as_i64().unwrap();
    assert_eq!(created["booking"]["status"], "waiting");
    assert_eq!(created["report"]["outcomes"].as_array().unwrap().len(), 3);

    // One waiting request per mentor
    let response = server
        .post("/api/v1/bookings")
        .authorization_bearer(&mentee)
        .json(&json!({ "mentor_id": mentor_id, "start_at": "2030-01-14T14:00:00Z" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CONFLICT);
    assert_eq!(response.json::<Value>()["error"]["details"]["booking_id"], booking_id);

    let pending = server
        .get("/api/v1/bookings")
        .add_query_param("type", "pending")
        .authorization_bearer(&mentor)
        .await;
    assert_eq!(pending.status_code(), StatusCode::OK);
    assert_eq!(pending.json::<Value>().as_array().unwrap().len(), 1);

    let bad_query = server
        .get("/api/v1/bookings")
        .add_query_param("type", "later")
        .authorization_bearer(&mentor)
        .await;
    assert_eq!(bad_query.status_code(), StatusCode::BAD_REQUEST);

    // Only the mentor may accept
    let response = server
        .put(&format!("/api/v1/bookings/{}/accept", booking_id))
        .authorization_bearer(&mentee)
        .await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);

    let response = server
        .put(&format!("/api/v1/bookings/{}/accept", booking_id))
        .authorization_bearer(&mentor)
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let accepted: Value = response.json();
    assert_eq!(accepted["booking"]["status"], "accepted");
    assert!(accepted["booking"]["meeting_link"]
        .as_str()
        .unwrap()
        .starts_with("https://meet.jit.si/"));

    let response = server
        .put(&format!("/api/v1/bookings/{}/reject", booking_id))
        .authorization_bearer(&mentor)
        .json(&json!({}))
        .await;
    assert_eq!(response.status_code(), StatusCode::CONFLICT);

    let availability = server
        .get(&format!("/api/v1/mentors/{}/availability", mentor_id))
        .await;
    assert_eq!(availability.json::<Value>()["booked"], json!([START]));

    let upcoming = server
        .get("/api/v1/bookings")
        .add_query_param("type", "upcoming")
        .authorization_bearer(&mentee)
        .await;
    assert_eq!(upcoming.json::<Value>().as_array().unwrap().len(), 1);

    let inbox = server
        .get("/api/v1/notifications")
        .add_query_param("unread", "true")
        .authorization_bearer(&mentee)
        .await;
    let inbox: Value = inbox.json();
    assert_eq!(inbox.as_array().unwrap().len(), 1);
    assert_eq!(inbox[0]["title"], "Booking Accepted by Mo Tester");

    let read_all = server
        .put("/api/v1/notifications/read-all")
        .authorization_bearer(&mentee)
        .await;
    assert_eq!(read_all.json::<Value>()["updated"], 1);
}

#[tokio::test]
async fn test_reject_and_notifications_are_private() {
    let server = server().await;
    let (mentor_id, mentor) = register(&server, "mo@example.com", "Mo", true).await;
    let (_, mentee) = register(&server, "ed@example.com", "Ed", false).await;
    open_mentor(&server, &mentor).await;

    let created: Value = server
        .post("/api/v1/bookings")
        .authorization_bearer(&mentee)
        .json(&json!({ "mentor_id": mentor_id, "start_at": START }))
        .await
        .json();
    let booking_id = created["booking"]["id"].as_i64().unwrap();

    let response = server
        .put(&format!("/api/v1/bookings/{}/reject", booking_id))
        .authorization_bearer(&mentor)
        .json(&json!({ "reason": "Conference that week" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let response = server
        .put(&format!("/api/v1/bookings/{}/accept", booking_id))
        .authorization_bearer(&mentor)
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    // The mentor's request notification is not the mentee's to read
    let mentor_inbox: Value = server
        .get("/api/v1/notifications")
        .authorization_bearer(&mentor)
        .await
        .json();
    let notification_id = mentor_inbox[0]["id"].as_i64().unwrap();

    let response = server
        .put(&format!("/api/v1/notifications/{}/read", notification_id))
        .authorization_bearer(&mentee)
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    let response = server
        .put(&format!("/api/v1/notifications/{}/read", notification_id))
        .authorization_bearer(&mentor)
        .await;
    assert_eq!(response.status_code(), StatusCode::NO_CONTENT);
}
