// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Navigation decisions for the client router.
//!
//! Public: a signed-out caller gets the signed-out decision rather than a 401.

use crate::error::{AppError, Result};
use crate::middleware::auth::authenticate;
use crate::services::guard::{self, AuthState, Decision, Known, RecordView, RouteCategory};
use crate::AppState;
use axum::{
    extract::{Query, State},
    http::HeaderMap,
    routing::get,
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/navigation", get(navigate))
}

#[derive(Debug, Deserialize, Validate)]
pub struct NavigationQuery {
    #[validate(length(min = 1, max = 512))]
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct NavigationResponse {
    pub path: String,
    pub category: RouteCategory,
    #[serde(flatten)]
    pub decision: Decision,
}

async fn navigate(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    headers: HeaderMap,
    Query(query): Query<NavigationQuery>,
) -> Result<Json<NavigationResponse>> {
    query.validate()?;
    if !query.path.starts_with('/') {
        return Err(AppError::BadRequest("path must start with '/'".to_string()));
    }

    let user = match authenticate(&state, &jar, &headers) {
        Ok(user) => user,
        Err(e) => {
            tracing::debug!(error = %e, "Navigation with unusable session; treating as signed out");
            None
        }
    };

    let (auth, record) = match user {
        None => (AuthState::SignedOut, None),
        Some(user) => {
            let record = state.subscriptions.get(&user.user_id).await?;
            let now = state.subscriptions.now();
            (
                AuthState::SignedIn,
                record.map(|r| RecordView::from_record(&r, now)),
            )
        }
    };

    let decision = guard::decide(
        Known::Ready(auth),
        Known::Ready(record),
        &query.path,
        &state.routes,
    );

    if let Decision::Redirect(ref to) = decision {
        tracing::debug!(from = %query.path, to = %to, "Navigation redirected");
    }

    Ok(Json(NavigationResponse {
        category: state.routes.classify(&query.path).category,
        path: query.path,
        decision,
    }))
}
