// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API authentication and CORS tests.
//!
//! These tests verify that:
//! 1. Subscription and checkout routes reject requests without valid tokens
//! 2. The session cookie and Bearer header are both accepted
//! 3. Navigation and health stay public
//! 4. CORS preflight requests return correct headers

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};
use tower::ServiceExt;

mod common;

const PROTECTED: &[(&str, &str)] = &[
    ("GET", "/api/subscription"),
    ("POST", "/api/subscription/trial"),
    ("POST", "/api/subscription/onboarding"),
    ("POST", "/api/subscription/cancel"),
    ("POST", "/api/checkout"),
    ("POST", "/api/checkout/complete"),
];

#[tokio::test]
async fn test_protected_routes_without_token() {
    let (app, _) = common::create_test_app();

    for (method, uri) in PROTECTED {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(*method)
                    .uri(*uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{method} {uri}");
    }
}

#[tokio::test]
async fn test_protected_route_with_invalid_token() {
    let (app, _) = common::create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/subscription")
                .header(header::AUTHORIZATION, "Bearer invalid.token.here")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_expired_token_is_rejected() {
    #[derive(Serialize)]
    struct Claims {
        sub: String,
        exp: usize,
        iat: usize,
    }

    let (app, state) = common::create_test_app();
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as usize;
    let token = encode(
        &Header::new(Algorithm::HS256),
        &Claims {
            sub: "u1".to_string(),
            exp: now - 3600,
            iat: now - 7200,
        },
        &EncodingKey::from_secret(&state.config.jwt_signing_key),
    )
    .unwrap();

    let (status, _) =
        common::send(&app, common::authed("GET", "/api/subscription", &token, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_protected_route_with_valid_token() {
    let (app, state) = common::create_test_app();
    let token = common::create_test_jwt("u1", &state.config.jwt_signing_key);

    let (status, body) =
        common::send(&app, common::authed("GET", "/api/subscription", &token, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["record_exists"], false);
    assert_eq!(body["has_access"], false);
    assert_eq!(body["lockout"], "no_subscription");
    assert_eq!(body["civil_date"], "2026-01-01");
}

#[tokio::test]
async fn test_session_cookie_is_accepted() {
    let (app, state) = common::create_test_app();
    let token = common::create_test_jwt("u1", &state.config.jwt_signing_key);

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/subscription")
                .header(header::COOKIE, format!("devotion_token={}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_store_failure_is_500_not_401() {
    let (app, state) = common::create_offline_test_app();
    let token = common::create_test_jwt("u1", &state.config.jwt_signing_key);

    let (status, body) =
        common::send(&app, common::authed("GET", "/api/subscription", &token, None)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "database_error");
    // Store details are not leaked
    assert!(body.get("details").is_none());
}

#[tokio::test]
async fn test_cors_preflight() {
    let (app, _) = common::create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/api/subscription")
                .header(header::ORIGIN, "http://localhost:5173")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // OPTIONS should return 200 (CORS preflight success)
    assert_eq!(response.status(), StatusCode::OK);

    // Should have CORS headers
    assert!(response
        .headers()
        .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    assert!(response
        .headers()
        .contains_key(header::ACCESS_CONTROL_ALLOW_METHODS));
}

#[tokio::test]
async fn test_public_routes_no_auth_required() {
    let (app, _) = common::create_test_app();

    let (status, body) = common::send(
        &app,
        Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["store"], "memory");

    let (status, body) = common::send(
        &app,
        Request::builder()
            .uri("/api/navigation?path=/home")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["action"], "redirect");
    assert_eq!(body["to"], "/");
}

#[tokio::test]
async fn test_navigation_with_bad_token_is_signed_out() {
    let (app, _) = common::create_test_app();

    let (status, body) = common::send(
        &app,
        common::authed("GET", "/api/navigation?path=/login", "not.a.jwt", None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["action"], "render");
    assert_eq!(body["category"], "public");
}
