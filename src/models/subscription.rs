// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Subscription record for storage and API.

use crate::time_utils::TRIAL_LENGTH_DAYS;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Most processed gateway event ids remembered per record.
pub const MAX_PROCESSED_EVENTS: usize = 100;

/// Plan the user is currently on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "snake_case")]
pub enum PlanType {
    Trial,
    Weekly,
    Monthly,
    Yearly,
}

impl PlanType {
    /// Paid plans in display order.
    pub const PAID: [PlanType; 3] = [PlanType::Weekly, PlanType::Monthly, PlanType::Yearly];

    /// Length of one paid period in days, `None` for the trial.
    pub fn duration_days(self) -> Option<i64> {
        match self {
            PlanType::Trial => None,
            PlanType::Weekly => Some(7),
            PlanType::Monthly => Some(30),
            PlanType::Yearly => Some(365),
        }
    }

    pub fn is_paid(self) -> bool {
        self != PlanType::Trial
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PlanType::Trial => "trial",
            PlanType::Weekly => "weekly",
            PlanType::Monthly => "monthly",
            PlanType::Yearly => "yearly",
        }
    }
}

impl fmt::Display for PlanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trial" => Ok(PlanType::Trial),
            "weekly" => Ok(PlanType::Weekly),
            "monthly" => Ok(PlanType::Monthly),
            "yearly" => Ok(PlanType::Yearly),
            other => Err(format!("unknown plan type: {other}")),
        }
    }
}

/// Which writer last set the paid window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaidSource {
    /// Client reported checkout success; gateway confirmation pending.
    Optimistic,
    /// Confirmed by a verified gateway event.
    Gateway,
}

/// Why `is_active` was cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "snake_case")]
pub enum DeactivationReason {
    UserCancelled,
    GatewayCancelled,
    GatewayExpired,
    PaymentFailed,
}

/// Per-user subscription record stored in Firestore.
///
/// Stored at: `subscriptions/{user_id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    /// Auth provider user ID (also used as document ID)
    pub user_id: String,
    pub plan_type: PlanType,
    pub trial_start: DateTime<Utc>,
    pub trial_end: DateTime<Utc>,
    #[serde(default)]
    pub paid_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub paid_end: Option<DateTime<Utc>>,
    pub is_active: bool,
    #[serde(default)]
    pub has_completed_onboarding: bool,

    // ─── Gateway Correlation ─────────────────────────────────────
    #[serde(default)]
    pub external_customer_ref: Option<String>,
    #[serde(default)]
    pub external_subscription_ref: Option<String>,
    #[serde(default)]
    pub external_plan_ref: Option<String>,
    #[serde(default)]
    pub external_payment_ref: Option<String>,

    // ─── Reconciliation ──────────────────────────────────────────
    #[serde(default)]
    pub paid_source: Option<PaidSource>,
    #[serde(default)]
    pub deactivation_reason: Option<DeactivationReason>,
    /// Time of the newest gateway event (or user cancel) that changed access.
    /// Gateway events older than this are stale.
    #[serde(default)]
    pub last_transition_at: Option<DateTime<Utc>>,
    /// Gateway event IDs already handled, with their occurrence time
    #[serde(default)]
    pub processed_event_ids: BTreeMap<String, DateTime<Utc>>,

    // ─── Metadata ────────────────────────────────────────────────
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubscriptionRecord {
    /// Fresh trial record starting at `now`.
    pub fn new_trial(user_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            plan_type: PlanType::Trial,
            trial_start: now,
            trial_end: now + Duration::days(TRIAL_LENGTH_DAYS),
            paid_start: None,
            paid_end: None,
            is_active: true,
            has_completed_onboarding: false,
            external_customer_ref: None,
            external_subscription_ref: None,
            external_plan_ref: None,
            external_payment_ref: None,
            paid_source: None,
            deactivation_reason: None,
            last_transition_at: None,
            processed_event_ids: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a partial update in place.
    ///
    /// The onboarding flag only ever moves from false to true, and
    /// `last_transition_at` only ever moves forward. Event ids older than
    /// the last transition are dropped since staleness already rejects them.
    pub fn apply(&mut self, patch: &SubscriptionPatch, now: DateTime<Utc>) {
        if let Some(plan_type) = patch.plan_type {
            self.plan_type = plan_type;
        }
        if let Some(paid_start) = patch.paid_start {
            self.paid_start = paid_start;
        }
        if let Some(paid_end) = patch.paid_end {
            self.paid_end = paid_end;
        }
        if let Some(is_active) = patch.is_active {
            self.is_active = is_active;
        }
        if patch.has_completed_onboarding == Some(true) {
            self.has_completed_onboarding = true;
        }
        if let Some(ref value) = patch.external_customer_ref {
            self.external_customer_ref = value.clone();
        }
        if let Some(ref value) = patch.external_subscription_ref {
            self.external_subscription_ref = value.clone();
        }
        if let Some(ref value) = patch.external_plan_ref {
            self.external_plan_ref = value.clone();
        }
        if let Some(ref value) = patch.external_payment_ref {
            self.external_payment_ref = value.clone();
        }
        if let Some(paid_source) = patch.paid_source {
            self.paid_source = paid_source;
        }
        if let Some(reason) = patch.deactivation_reason {
            self.deactivation_reason = reason;
        }
        if let Some(at) = patch.last_transition_at {
            if self.last_transition_at.map_or(true, |last| at > last) {
                self.last_transition_at = Some(at);
            }
        }
        if let Some((ref event_id, occurred_at)) = patch.processed_event {
            self.processed_event_ids.insert(event_id.clone(), occurred_at);
        }
        self.prune_processed_events();
        self.updated_at = now;
    }

    pub fn has_processed_event(&self, event_id: &str) -> bool {
        self.processed_event_ids.contains_key(event_id)
    }

    /// Whether a gateway event at `occurred_at` predates the last transition.
    pub fn is_stale_event(&self, occurred_at: DateTime<Utc>) -> bool {
        self.last_transition_at.is_some_and(|last| occurred_at < last)
    }

    fn prune_processed_events(&mut self) {
        if let Some(last) = self.last_transition_at {
            self.processed_event_ids.retain(|_, at| *at >= last);
        }
        while self.processed_event_ids.len() > MAX_PROCESSED_EVENTS {
            let oldest = self
                .processed_event_ids
                .iter()
                .min_by_key(|(_, at)| **at)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(id) => self.processed_event_ids.remove(&id),
                None => break,
            };
        }
    }
}

/// Partial update merged into a [`SubscriptionRecord`].
///
/// `None` leaves a field untouched. Nullable fields use a nested `Option`
/// so a patch can clear them with `Some(None)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscriptionPatch {
    /// Trial start for a record created by this patch; ignored on existing records.
    pub trial_start: Option<DateTime<Utc>>,
    pub plan_type: Option<PlanType>,
    pub paid_start: Option<Option<DateTime<Utc>>>,
    pub paid_end: Option<Option<DateTime<Utc>>>,
    pub is_active: Option<bool>,
    pub has_completed_onboarding: Option<bool>,
    pub external_customer_ref: Option<Option<String>>,
    pub external_subscription_ref: Option<Option<String>>,
    pub external_plan_ref: Option<Option<String>>,
    pub external_payment_ref: Option<Option<String>>,
    pub paid_source: Option<Option<PaidSource>>,
    pub deactivation_reason: Option<Option<DeactivationReason>>,
    /// Moves the record's transition watermark forward.
    pub last_transition_at: Option<DateTime<Utc>>,
    /// Gateway event id and occurrence time to remember.
    pub processed_event: Option<(String, DateTime<Utc>)>,
}

impl SubscriptionPatch {
    /// Patch that grants a paid window of `plan_type` starting at `paid_start`.
    ///
    /// The end is always recomputed from the start, so re-applying the same
    /// activation yields the same window.
    pub fn paid_activation(
        plan_type: PlanType,
        paid_start: DateTime<Utc>,
        source: PaidSource,
    ) -> Option<Self> {
        let days = plan_type.duration_days()?;
        Some(Self {
            plan_type: Some(plan_type),
            paid_start: Some(Some(paid_start)),
            paid_end: Some(Some(paid_start + Duration::days(days))),
            is_active: Some(true),
            paid_source: Some(Some(source)),
            deactivation_reason: Some(None),
            ..Default::default()
        })
    }

    /// Patch that clears `is_active` and records why.
    pub fn deactivation(reason: DeactivationReason) -> Self {
        Self {
            is_active: Some(false),
            deactivation_reason: Some(Some(reason)),
            ..Default::default()
        }
    }

    /// Patch that only remembers a handled gateway event.
    pub fn processed(event_id: &str, occurred_at: DateTime<Utc>) -> Self {
        Self {
            processed_event: Some((event_id.to_string(), occurred_at)),
            ..Default::default()
        }
    }

    pub fn onboarding_complete() -> Self {
        Self {
            has_completed_onboarding: Some(true),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
