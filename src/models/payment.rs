// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Payment gateway events, after signature verification and parsing.

use crate::models::PlanType;
use chrono::{DateTime, Utc};

/// Kind of subscription event reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEventKind {
    /// First successful charge; subscription is live
    Activated,
    /// Recurring charge succeeded
    Charged,
    Cancelled,
    /// Subscription ran its full course
    Expired,
    /// Retries exhausted; payment permanently failed
    Halted,
    /// A single charge attempt failed; the gateway will retry
    PaymentFailed,
    Pending,
    Other(String),
}

impl GatewayEventKind {
    /// Map a gateway event name (e.g. `subscription.charged`).
    pub fn from_wire(name: &str) -> Self {
        match name {
            "subscription.activated" => Self::Activated,
            "subscription.charged" => Self::Charged,
            "subscription.cancelled" => Self::Cancelled,
            "subscription.completed" | "subscription.expired" => Self::Expired,
            "subscription.halted" => Self::Halted,
            "payment.failed" => Self::PaymentFailed,
            "subscription.pending" => Self::Pending,
            other => Self::Other(other.to_string()),
        }
    }
}

/// A verified gateway event with its correlation metadata.
#[derive(Debug, Clone)]
pub struct GatewayEvent {
    /// Gateway event ID (deduplication key)
    pub id: String,
    pub kind: GatewayEventKind,
    pub occurred_at: DateTime<Utc>,
    /// From the subscription's correlation notes
    pub user_id: Option<String>,
    /// From the subscription's correlation notes
    pub plan_type: Option<PlanType>,
    pub subscription_ref: Option<String>,
    pub customer_ref: Option<String>,
    pub plan_ref: Option<String>,
    pub payment_ref: Option<String>,
}
