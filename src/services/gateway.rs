// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Payment gateway client.
//!
//! Handles:
//! - Creating gateway subscriptions for the hosted checkout widget
//! - Looking up a subscription's plan and owner when checkout completes
//! - Webhook signature verification
//! - Checkout callback signature verification

use crate::config::Config;
use crate::error::AppError;
use dashmap::DashMap;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Number of billing cycles requested for a new subscription.
const TOTAL_BILLING_CYCLES: u32 = 120;

/// Correlation notes attached to a gateway subscription and echoed in webhooks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubscriptionNotes {
    pub user_id: String,
    pub plan_type: String,
}

/// Subscription object as returned by the gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewaySubscription {
    pub id: String,
    pub plan_id: String,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    /// Notes set at creation; `None` for subscriptions created elsewhere
    #[serde(default)]
    pub notes: Option<SubscriptionNotes>,
}

/// Local stand-in for the gateway API.
#[derive(Default)]
struct MockGateway {
    counter: AtomicU64,
    subscriptions: DashMap<String, GatewaySubscription>,
}

#[derive(Serialize)]
struct CreateSubscriptionRequest<'a> {
    plan_id: &'a str,
    total_count: u32,
    customer_notify: u8,
    notes: &'a SubscriptionNotes,
}

/// Payment gateway API client.
#[derive(Clone)]
pub struct PaymentGateway {
    http: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: String,
    webhook_secret: String,
    /// When set, API calls are answered locally (tests and local development).
    mock: Option<Arc<MockGateway>>,
}

impl PaymentGateway {
    /// Create a new gateway client from configuration.
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.gateway_api_url.trim_end_matches('/').to_string(),
            key_id: config.gateway_key_id.clone(),
            key_secret: config.gateway_key_secret.clone(),
            webhook_secret: config.gateway_webhook_secret.clone(),
            mock: None,
        }
    }

    /// Client that never touches the network; subscriptions get sequential IDs.
    pub fn new_mock(config: &Config) -> Self {
        Self {
            mock: Some(Arc::new(MockGateway::default())),
            ..Self::new(config)
        }
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Create a gateway subscription for `plan_ref`, tagged with correlation notes.
    pub async fn create_subscription(
        &self,
        plan_ref: &str,
        notes: &SubscriptionNotes,
    ) -> Result<GatewaySubscription, AppError> {
        if let Some(ref mock) = self.mock {
            let n = mock.counter.fetch_add(1, Ordering::Relaxed) + 1;
            let subscription = GatewaySubscription {
                id: format!("sub_mock_{n}"),
                plan_id: plan_ref.to_string(),
                customer_id: None,
                status: Some("created".to_string()),
                notes: Some(notes.clone()),
            };
            mock.subscriptions
                .insert(subscription.id.clone(), subscription.clone());
            return Ok(subscription);
        }

        let url = format!("{}/subscriptions", self.base_url);
        let body = CreateSubscriptionRequest {
            plan_id: plan_ref,
            total_count: TOTAL_BILLING_CYCLES,
            customer_notify: 1,
            notes,
        };

        let response = self
            .http
            .post(&url)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::PaymentGateway(format!("Create subscription failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, plan_ref, "Gateway rejected subscription creation");
            return Err(AppError::PaymentGateway(format!("HTTP {}: {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::PaymentGateway(format!("JSON parse error: {}", e)))
    }

    /// Fetch a subscription by ID. An unknown ID is a `BadRequest`.
    pub async fn fetch_subscription(
        &self,
        subscription_ref: &str,
    ) -> Result<GatewaySubscription, AppError> {
        let unknown = || AppError::BadRequest(format!("Unknown subscription {subscription_ref}"));

        if let Some(ref mock) = self.mock {
            return mock
                .subscriptions
                .get(subscription_ref)
                .map(|s| s.value().clone())
                .ok_or_else(unknown);
        }

        let url = format!(
            "{}/subscriptions/{}",
            self.base_url,
            urlencoding::encode(subscription_ref)
        );
        let response = self
            .http
            .get(&url)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .send()
            .await
            .map_err(|e| AppError::PaymentGateway(format!("Fetch subscription failed: {}", e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(unknown());
        }
        if !response.status().is_success() {
            let status = response.status();
            tracing::error!(%status, subscription_ref, "Gateway rejected subscription lookup");
            return Err(AppError::PaymentGateway(format!("HTTP {}", status)));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::PaymentGateway(format!("JSON parse error: {}", e)))
    }

    /// Check the webhook signature header against the raw request body.
    pub fn verify_webhook_signature(&self, body: &[u8], signature_hex: &str) -> bool {
        verify_hmac_hex(self.webhook_secret.as_bytes(), body, signature_hex)
    }

    /// Check the signature the checkout widget returns on success.
    pub fn verify_checkout_signature(
        &self,
        payment_ref: &str,
        subscription_ref: &str,
        signature_hex: &str,
    ) -> bool {
        let payload = format!("{}|{}", payment_ref, subscription_ref);
        verify_hmac_hex(
            self.key_secret.as_bytes(),
            payload.as_bytes(),
            signature_hex,
        )
    }
}

/// Hex-encoded HMAC-SHA256 of `payload`.
pub fn sign_hex(secret: &[u8], payload: &[u8]) -> String {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

fn verify_hmac_hex(secret: &[u8], payload: &[u8], signature_hex: &str) -> bool {
    let Ok(provided) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(payload);
    let expected = mac.finalize().into_bytes();

    expected.as_slice().ct_eq(provided.as_slice()).into()
}
