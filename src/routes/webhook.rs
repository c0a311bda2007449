// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Payment gateway webhook.
//!
//! The signature is checked against the raw body before anything is parsed.
//! Failed verification is rejected without touching any record.

use crate::error::AppError;
use crate::models::{GatewayEvent, GatewayEventKind};
use crate::services::subscription::ReconcileOutcome;
use crate::AppState;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;

/// Header carrying the hex HMAC-SHA256 of the body.
pub const SIGNATURE_HEADER: &str = "x-gateway-signature";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/webhook/payments", post(handle_event))
}

/// Gateway webhook payload.
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    pub id: String,
    pub event: String,
    /// Unix seconds
    pub created_at: i64,
    #[serde(default)]
    pub payload: WebhookEntities,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookEntities {
    pub subscription: Option<SubscriptionEntity>,
    pub payment: Option<PaymentEntity>,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionEntity {
    pub id: String,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub plan_id: Option<String>,
    #[serde(default)]
    pub notes: EventNotes,
}

/// Correlation notes set when the subscription was created.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventNotes {
    pub user_id: Option<String>,
    pub plan_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PaymentEntity {
    pub id: String,
}

impl WebhookPayload {
    /// Convert to a domain event. Unknown plan names become `None`.
    pub fn into_event(self) -> Result<GatewayEvent, String> {
        let occurred_at: DateTime<Utc> = DateTime::from_timestamp(self.created_at, 0)
            .ok_or_else(|| format!("created_at out of range: {}", self.created_at))?;

        let subscription = self.payload.subscription;
        let notes = subscription
            .as_ref()
            .map(|s| s.notes.clone())
            .unwrap_or_default();

        Ok(GatewayEvent {
            kind: GatewayEventKind::from_wire(&self.event),
            id: self.id,
            occurred_at,
            user_id: notes.user_id.filter(|u| !u.is_empty()),
            plan_type: notes.plan_type.and_then(|p| p.parse().ok()),
            subscription_ref: subscription.as_ref().map(|s| s.id.clone()),
            customer_ref: subscription.as_ref().and_then(|s| s.customer_id.clone()),
            plan_ref: subscription.as_ref().and_then(|s| s.plan_id.clone()),
            payment_ref: self.payload.payment.map(|p| p.id),
        })
    }
}

/// Handle incoming webhook events (POST).
async fn handle_event(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");

    if !state.gateway.verify_webhook_signature(&body, signature) {
        tracing::warn!(
            has_signature = !signature.is_empty(),
            body_len = body.len(),
            "Security Alert: Webhook signature verification failed"
        );
        return Err(AppError::SignatureVerification);
    }

    let event = match serde_json::from_slice::<WebhookPayload>(&body)
        .map_err(|e| e.to_string())
        .and_then(WebhookPayload::into_event)
    {
        Ok(e) => e,
        Err(e) => {
            tracing::error!(error = %e, "Failed to parse webhook event");
            return Ok(StatusCode::OK); // Still return 200 to avoid redelivery
        }
    };

    tracing::info!(
        event_id = %event.id,
        kind = ?event.kind,
        user_id = ?event.user_id,
        subscription_ref = ?event.subscription_ref,
        "Webhook event verified"
    );

    match state.subscriptions.reconcile_external_event(&event).await {
        Ok(ReconcileOutcome::Activated(_) | ReconcileOutcome::Deactivated(_)) => Ok(StatusCode::OK),
        Ok(ReconcileOutcome::Duplicate | ReconcileOutcome::Stale(_)) => Ok(StatusCode::OK),
        Ok(ReconcileOutcome::Ignored(reason)) => {
            tracing::debug!(event_id = %event.id, reason = %reason, "Webhook event ignored");
            Ok(StatusCode::OK)
        }
        Err(AppError::NotFound(msg)) => {
            // Redelivery cannot create the record
            tracing::warn!(event_id = %event.id, error = %msg, "Webhook for unknown subscription");
            Ok(StatusCode::OK)
        }
        // Store failures return 500 so the gateway retries
        Err(e) => Err(e),
    }
}
