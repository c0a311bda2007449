// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Subscription routes for authenticated users.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::services::lifecycle::AccessStatus;
use crate::AppState;
use axum::{
    extract::State,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Subscription routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/subscription", get(get_status))
        .route("/api/subscription/trial", post(start_trial))
        .route("/api/subscription/onboarding", post(complete_onboarding))
        .route("/api/subscription/cancel", post(cancel))
}

/// Current access state for the signed-in user.
async fn get_status(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<AccessStatus>> {
    let status = state.subscriptions.status(&user.user_id).await?;
    Ok(Json(status))
}

/// Start the free trial (idempotent).
async fn start_trial(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<AccessStatus>> {
    let record = state.subscriptions.create_trial(&user.user_id).await?;
    Ok(Json(state.subscriptions.status_of(Some(&record))))
}

async fn complete_onboarding(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<AccessStatus>> {
    let record = state
        .subscriptions
        .complete_onboarding(&user.user_id)
        .await?;
    Ok(Json(state.subscriptions.status_of(Some(&record))))
}

/// Response for cancellation.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct CancelResponse {
    pub cancelled: bool,
    pub status: AccessStatus,
}

/// Cancel the paid plan. Access ends immediately.
async fn cancel(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<CancelResponse>> {
    if !state.subscriptions.cancel(&user.user_id).await? {
        return Err(AppError::InvalidTransition(
            "Trial plans cannot be cancelled".to_string(),
        ));
    }

    let status = state.subscriptions.status(&user.user_id).await?;
    Ok(Json(CancelResponse {
        cancelled: true,
        status,
    }))
}
