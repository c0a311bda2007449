// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Checkout routes: open the hosted widget and report its outcome.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::PlanType;
use crate::services::checkout::{CheckoutOutcome, CheckoutResult, CheckoutSession, Prefill};
use crate::services::lifecycle::AccessStatus;
use crate::AppState;
use axum::{extract::State, routing::post, Extension, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/checkout", post(initiate))
        .route("/api/checkout/complete", post(complete))
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub plan_type: PlanType,
}

async fn initiate(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CheckoutRequest>,
) -> Result<Json<CheckoutSession>> {
    let prefill = Prefill {
        email: user.email.clone(),
        name: user.name.clone(),
    };
    let session = state
        .checkout
        .initiate(&user.user_id, req.plan_type, prefill)
        .await?;
    Ok(Json(session))
}

/// Outcome reported by the checkout widget's callbacks.
#[derive(Debug, Deserialize, Validate)]
pub struct CompleteCheckoutRequest {
    pub outcome: OutcomeKind,
    pub plan_type: Option<PlanType>,
    #[validate(length(min = 1, max = 64))]
    pub payment_ref: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub subscription_ref: Option<String>,
    /// Hex HMAC-SHA256
    #[validate(length(equal = 64))]
    pub signature: Option<String>,
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    Dismissed,
    Failed,
}

impl CompleteCheckoutRequest {
    fn into_outcome(self) -> Result<CheckoutOutcome> {
        match self.outcome {
            OutcomeKind::Success => {
                let missing = |field: &str| AppError::BadRequest(format!("{field} is required"));
                Ok(CheckoutOutcome::Success {
                    plan_type: self.plan_type.ok_or_else(|| missing("plan_type"))?,
                    payment_ref: self.payment_ref.ok_or_else(|| missing("payment_ref"))?,
                    subscription_ref: self
                        .subscription_ref
                        .ok_or_else(|| missing("subscription_ref"))?,
                    signature: self.signature.ok_or_else(|| missing("signature"))?,
                })
            }
            OutcomeKind::Dismissed => Ok(CheckoutOutcome::Dismissed),
            OutcomeKind::Failed => Ok(CheckoutOutcome::Failed {
                reason: self.reason.unwrap_or_else(|| "unknown".to_string()),
            }),
        }
    }
}

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct CompleteCheckoutResponse {
    /// `activated`, `dismissed`, or `failed`
    pub result: String,
    pub status: AccessStatus,
}

async fn complete(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CompleteCheckoutRequest>,
) -> Result<Json<CompleteCheckoutResponse>> {
    req.validate()?;
    let outcome = req.into_outcome()?;

    let (result, status) = match state.checkout.complete(&user.user_id, outcome).await? {
        CheckoutResult::Activated(record) => {
            ("activated", state.subscriptions.status_of(Some(&record)))
        }
        CheckoutResult::Dismissed => ("dismissed", state.subscriptions.status(&user.user_id).await?),
        CheckoutResult::Failed(_) => ("failed", state.subscriptions.status(&user.user_id).await?),
    };

    Ok(Json(CompleteCheckoutResponse {
        result: result.to_string(),
        status,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: serde_json::Value) -> CompleteCheckoutRequest {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_success_requires_all_fields() {
        let req = parse(serde_json::json!({
            "outcome": "success",
            "plan_type": "monthly",
            "payment_ref": "pay_1"
        }));
        assert!(matches!(
            req.into_outcome(),
            Err(AppError::BadRequest(msg)) if msg.contains("subscription_ref")
        ));
    }

    #[test]
    fn test_signature_length_is_validated() {
        let req = parse(serde_json::json!({
            "outcome": "success",
            "plan_type": "monthly",
            "payment_ref": "pay_1",
            "subscription_ref": "sub_1",
            "signature": "abc"
        }));
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_dismissed_needs_nothing_else() {
        let req = parse(serde_json::json!({ "outcome": "dismissed" }));
        assert!(req.validate().is_ok());
        assert!(matches!(req.into_outcome(), Ok(CheckoutOutcome::Dismissed)));
    }
}
