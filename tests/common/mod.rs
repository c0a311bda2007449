// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use chrono::{DateTime, Duration, TimeZone, Utc};
use devotion_access::config::Config;
use devotion_access::db::{Db, FirestoreDb, MemoryDb};
use devotion_access::routes::create_router;
use devotion_access::services::gateway::sign_hex;
use devotion_access::services::PaymentGateway;
use devotion_access::time_utils::FixedClock;
use devotion_access::AppState;
use std::sync::Arc;
use tower::ServiceExt;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Midnight UTC on 2026-01-01 plus `n` days.
#[allow(dead_code)]
pub fn day(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + Duration::days(n)
}

/// A running test app with its clock and in-memory store exposed.
#[allow(dead_code)]
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub clock: Arc<FixedClock>,
    pub db: MemoryDb,
}

/// Create a test app backed by an in-memory store, clock pinned at day 0.
#[allow(dead_code)]
pub fn create_test_app_with_clock() -> TestApp {
    let config = Config::test_default();
    let db = MemoryDb::new();
    let clock = Arc::new(FixedClock::new(day(0)));
    let gateway = PaymentGateway::new_mock(&config);

    let state = Arc::new(AppState::new(
        config,
        Db::Memory(db.clone()),
        clock.clone(),
        gateway,
    ));

    TestApp {
        router: create_router(state.clone()),
        state,
        clock,
        db,
    }
}

/// Create a test app with an in-memory store.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>) {
    let app = create_test_app_with_clock();
    (app.router, app.state)
}

/// Create a test app whose store is unreachable.
#[allow(dead_code)]
pub fn create_offline_test_app() -> (axum::Router, Arc<AppState>) {
    let config = Config::test_default();
    let gateway = PaymentGateway::new_mock(&config);
    let state = Arc::new(AppState::new(
        config,
        Db::offline(),
        Arc::new(FixedClock::new(day(0))),
        gateway,
    ));
    (create_router(state.clone()), state)
}

/// Helper to create a valid JWT for testing.
#[allow(dead_code)]
pub fn create_test_jwt(user_id: &str, signing_key: &[u8]) -> String {
    devotion_access::middleware::auth::create_jwt(
        user_id,
        Some("seeker@example.com"),
        Some("Test Seeker"),
        signing_key,
    )
    .unwrap()
}

/// Hex signature for a webhook body, using the test webhook secret.
#[allow(dead_code)]
pub fn sign_webhook(body: &[u8]) -> String {
    sign_hex(Config::test_default().gateway_webhook_secret.as_bytes(), body)
}

/// Send a request and decode the JSON body (`Null` when empty).
#[allow(dead_code)]
pub async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .unwrap();
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

/// Authenticated request with an optional JSON body.
#[allow(dead_code)]
pub fn authed(
    method: &str,
    uri: &str,
    token: &str,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token));
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}
