// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Subscription mutations and cached reads.
//!
//! Two writers touch a user's record for the same purchase: the client's
//! optimistic activation right after checkout, and the gateway's verified
//! webhook. Gateway-confirmed windows take precedence: an optimistic write
//! never replaces a confirmed window for the same plan that still covers
//! the current instant.
//!
//! Gateway events may arrive late and out of order. Each record keeps the
//! time of its last access transition, and any gateway event that happened
//! before it is stale.

use crate::config::{PlanCatalog, DEFAULT_CIVIL_OFFSET_MINUTES};
use crate::db::Db;
use crate::error::{AppError, Result};
use crate::models::{
    DeactivationReason, GatewayEvent, GatewayEventKind, PaidSource, PlanType, SubscriptionPatch,
    SubscriptionRecord,
};
use crate::services::lifecycle::{self, AccessStatus};
use crate::time_utils::SharedClock;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;

/// How long a cached record may be served without re-reading the store.
const CACHE_TTL_SECS: i64 = 30;

/// Cache size above which expired entries are swept on insert.
const CACHE_SWEEP_THRESHOLD: usize = 10_000;

/// Cached record with the instant it was read.
#[derive(Clone)]
pub struct CachedRecord {
    record: Option<SubscriptionRecord>,
    cached_at: DateTime<Utc>,
}

/// Shared record cache type for use in AppState.
pub type SubscriptionCache = Arc<DashMap<String, CachedRecord>>;

/// Gateway correlation IDs to record alongside a mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalRefs {
    pub customer_ref: Option<String>,
    pub subscription_ref: Option<String>,
    pub plan_ref: Option<String>,
    pub payment_ref: Option<String>,
}

impl ExternalRefs {
    /// Copy the present refs into `patch`; absent refs leave stored values alone.
    fn merge_into(&self, patch: &mut SubscriptionPatch) {
        if let Some(ref v) = self.customer_ref {
            patch.external_customer_ref = Some(Some(v.clone()));
        }
        if let Some(ref v) = self.subscription_ref {
            patch.external_subscription_ref = Some(Some(v.clone()));
        }
        if let Some(ref v) = self.plan_ref {
            patch.external_plan_ref = Some(Some(v.clone()));
        }
        if let Some(ref v) = self.payment_ref {
            patch.external_payment_ref = Some(Some(v.clone()));
        }
    }
}

/// Result of applying a gateway event.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// Paid window set from the event.
    Activated(SubscriptionRecord),
    /// `is_active` cleared.
    Deactivated(SubscriptionRecord),
    /// Event ID already applied.
    Duplicate,
    /// Happened before the record's last transition; nothing written.
    Stale(SubscriptionRecord),
    /// Nothing to apply: transient or unknown kinds, missing metadata, or a
    /// deactivation that does not concern the current plan.
    Ignored(String),
}

/// Subscription service: record cache plus every mutation of the record.
///
/// This service encapsulates:
/// - Cached reads with explicit invalidation
/// - Trial creation and onboarding completion
/// - Optimistic paid activation after checkout
/// - Cancellation
/// - Reconciliation of verified gateway events
#[derive(Clone)]
pub struct SubscriptionService {
    db: Db,
    clock: SharedClock,
    plans: PlanCatalog,
    /// In-memory cache of records (shared across requests).
    cache: SubscriptionCache,
    civil_offset_minutes: i32,
}

impl SubscriptionService {
    /// Create a new subscription service with a shared cache.
    pub fn new(db: Db, clock: SharedClock, plans: PlanCatalog, cache: SubscriptionCache) -> Self {
        Self {
            db,
            clock,
            plans,
            cache,
            civil_offset_minutes: DEFAULT_CIVIL_OFFSET_MINUTES,
        }
    }

    /// Report civil dates in a different fixed offset.
    pub fn with_civil_offset(mut self, minutes: i32) -> Self {
        self.civil_offset_minutes = minutes;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // ─── Reads ───────────────────────────────────────────────────────────────

    /// Get a user's record, serving from cache while fresh.
    pub async fn get(&self, user_id: &str) -> Result<Option<SubscriptionRecord>> {
        let now = self.now();
        if let Some(cached) = self.cache.get(user_id) {
            if is_fresh(&cached, now) {
                return Ok(cached.record.clone());
            }
        }

        let record = self.db.get_subscription(user_id).await?;
        self.remember(user_id, record.clone());
        Ok(record)
    }

    /// Force the next read for `user_id` to bypass the cache.
    pub fn invalidate(&self, user_id: &str) {
        self.cache.remove(user_id);
    }

    /// Derived access state for a user.
    pub async fn status(&self, user_id: &str) -> Result<AccessStatus> {
        let record = self.get(user_id).await?;
        Ok(self.status_of(record.as_ref()))
    }

    /// Access status of an already loaded record, as of now.
    pub fn status_of(&self, record: Option<&SubscriptionRecord>) -> AccessStatus {
        lifecycle::access_status(record, self.now(), self.civil_offset_minutes)
    }

    fn remember(&self, user_id: &str, record: Option<SubscriptionRecord>) {
        let now = self.now();
        if self.cache.len() >= CACHE_SWEEP_THRESHOLD {
            self.cache.retain(|_, cached| is_fresh(cached, now));
            tracing::debug!(remaining = self.cache.len(), "Swept expired cache entries");
        }
        self.cache.insert(
            user_id.to_string(),
            CachedRecord {
                record,
                cached_at: now,
            },
        );
    }

    /// Current record straight from the store, or `NotFound`.
    async fn require_record(&self, user_id: &str) -> Result<SubscriptionRecord> {
        let record = self.db.get_subscription(user_id).await?;
        self.remember(user_id, record.clone());
        record.ok_or_else(|| AppError::NotFound(format!("Subscription for user {}", user_id)))
    }

    async fn write(&self, user_id: &str, patch: &SubscriptionPatch) -> Result<SubscriptionRecord> {
        let record = self
            .db
            .upsert_subscription(user_id, patch, self.now())
            .await?;
        self.remember(user_id, Some(record.clone()));
        Ok(record)
    }

    // ─── Mutations ───────────────────────────────────────────────────────────

    /// Start the free trial. Calling again returns the existing record unchanged.
    pub async fn create_trial(&self, user_id: &str) -> Result<SubscriptionRecord> {
        let now = self.now();
        let candidate = SubscriptionRecord::new_trial(user_id, now);
        let stored = self.db.insert_subscription_if_absent(&candidate).await?;

        if stored == candidate {
            tracing::info!(
                user_id,
                trial_end = %stored.trial_end,
                "Trial created"
            );
        } else {
            tracing::debug!(user_id, "Subscription already exists (idempotent skip)");
        }

        self.remember(user_id, Some(stored.clone()));
        Ok(stored)
    }

    /// Mark onboarding complete. No-op when already complete.
    pub async fn complete_onboarding(&self, user_id: &str) -> Result<SubscriptionRecord> {
        let current = self.require_record(user_id).await?;
        if current.has_completed_onboarding {
            return Ok(current);
        }

        let record = self
            .write(user_id, &SubscriptionPatch::onboarding_complete())
            .await?;
        tracing::info!(user_id, "Onboarding completed");
        Ok(record)
    }

    /// Grant a paid window starting now, ahead of gateway confirmation.
    pub async fn activate_paid_plan(
        &self,
        user_id: &str,
        plan_type: PlanType,
    ) -> Result<SubscriptionRecord> {
        self.activate_paid_plan_with_refs(user_id, plan_type, &ExternalRefs::default())
            .await
    }

    /// [`Self::activate_paid_plan`], also recording gateway correlation IDs.
    pub async fn activate_paid_plan_with_refs(
        &self,
        user_id: &str,
        plan_type: PlanType,
        refs: &ExternalRefs,
    ) -> Result<SubscriptionRecord> {
        let now = self.now();
        let mut patch = SubscriptionPatch::paid_activation(plan_type, now, PaidSource::Optimistic)
            .ok_or_else(|| {
                AppError::InvalidTransition("Cannot activate the trial as a paid plan".to_string())
            })?;

        let current = self.require_record(user_id).await?;
        if is_confirmed_for(&current, plan_type, now) {
            tracing::debug!(
                user_id,
                plan = %plan_type,
                "Gateway already confirmed this plan; skipping optimistic write"
            );
            return Ok(current);
        }

        refs.merge_into(&mut patch);
        let record = self.write(user_id, &patch).await?;
        tracing::info!(
            user_id,
            plan = %plan_type,
            paid_end = ?record.paid_end,
            "Paid plan activated (optimistic)"
        );
        Ok(record)
    }

    /// Cancel a paid plan. Returns `false` without writing for a trial.
    pub async fn cancel(&self, user_id: &str) -> Result<bool> {
        let current = self.require_record(user_id).await?;
        if current.plan_type == PlanType::Trial {
            tracing::info!(user_id, "Cancel rejected: trial plans cannot be cancelled");
            return Ok(false);
        }

        let mut patch = SubscriptionPatch::deactivation(DeactivationReason::UserCancelled);
        patch.last_transition_at = Some(self.now());
        self.write(user_id, &patch).await?;
        tracing::info!(user_id, plan = %current.plan_type, "Subscription cancelled");
        Ok(true)
    }

    // ─── Gateway Reconciliation ──────────────────────────────────────────────

    /// Apply a verified gateway event. Safe under at-least-once delivery.
    pub async fn reconcile_external_event(&self, event: &GatewayEvent) -> Result<ReconcileOutcome> {
        let deactivation = match &event.kind {
            GatewayEventKind::Activated | GatewayEventKind::Charged => None,
            GatewayEventKind::Cancelled => Some(DeactivationReason::GatewayCancelled),
            GatewayEventKind::Expired => Some(DeactivationReason::GatewayExpired),
            GatewayEventKind::Halted => Some(DeactivationReason::PaymentFailed),
            GatewayEventKind::PaymentFailed | GatewayEventKind::Pending => {
                tracing::info!(
                    event_id = %event.id,
                    kind = ?event.kind,
                    user_id = ?event.user_id,
                    "Transient gateway event (no change)"
                );
                return Ok(ReconcileOutcome::Ignored(format!("{:?}", event.kind)));
            }
            GatewayEventKind::Other(name) => {
                tracing::debug!(event_id = %event.id, kind = %name, "Ignoring unhandled event type");
                return Ok(ReconcileOutcome::Ignored(name.clone()));
            }
        };

        let Some(user_id) = event.user_id.as_deref() else {
            tracing::warn!(
                event_id = %event.id,
                subscription_ref = ?event.subscription_ref,
                "Gateway event has no user_id in its notes"
            );
            return Ok(ReconcileOutcome::Ignored("missing user_id".to_string()));
        };

        let current = self.require_record(user_id).await?;
        if current.has_processed_event(&event.id) {
            tracing::debug!(user_id, event_id = %event.id, "Event already applied (idempotent skip)");
            return Ok(ReconcileOutcome::Duplicate);
        }

        if current.is_stale_event(event.occurred_at) {
            tracing::warn!(
                user_id,
                event_id = %event.id,
                occurred_at = %event.occurred_at,
                last_transition_at = ?current.last_transition_at,
                "Out-of-order gateway event; record unchanged"
            );
            return Ok(ReconcileOutcome::Stale(current));
        }

        let refs = ExternalRefs {
            customer_ref: event.customer_ref.clone(),
            subscription_ref: event.subscription_ref.clone(),
            plan_ref: event.plan_ref.clone(),
            payment_ref: event.payment_ref.clone(),
        };

        if let Some(reason) = deactivation {
            if let Some(skip) = unrelated_deactivation(&current, event) {
                self.write(user_id, &SubscriptionPatch::processed(&event.id, event.occurred_at))
                    .await?;
                tracing::warn!(
                    user_id,
                    event_id = %event.id,
                    reason = ?reason,
                    subscription_ref = ?event.subscription_ref,
                    current_ref = ?current.external_subscription_ref,
                    skip,
                    "Gateway deactivation does not apply to the current plan"
                );
                return Ok(ReconcileOutcome::Ignored(skip.to_string()));
            }

            let mut patch = SubscriptionPatch::deactivation(reason);
            patch.last_transition_at = Some(event.occurred_at);
            patch.processed_event = Some((event.id.clone(), event.occurred_at));
            let record = self.write(user_id, &patch).await?;
            tracing::info!(user_id, event_id = %event.id, reason = ?reason, "Subscription deactivated by gateway");
            return Ok(ReconcileOutcome::Deactivated(record));
        }

        let plan_type = event
            .plan_type
            .filter(|p| p.is_paid())
            .or_else(|| {
                event
                    .plan_ref
                    .as_deref()
                    .and_then(|r| self.plans.plan_type_for_ref(r))
            });
        let Some(plan_type) = plan_type else {
            tracing::warn!(
                user_id,
                event_id = %event.id,
                plan_ref = ?event.plan_ref,
                "Activation event without a recognizable paid plan"
            );
            return Ok(ReconcileOutcome::Ignored("unknown plan".to_string()));
        };

        let Some(mut patch) =
            SubscriptionPatch::paid_activation(plan_type, event.occurred_at, PaidSource::Gateway)
        else {
            return Ok(ReconcileOutcome::Ignored("unknown plan".to_string()));
        };
        refs.merge_into(&mut patch);
        patch.last_transition_at = Some(event.occurred_at);
        patch.processed_event = Some((event.id.clone(), event.occurred_at));

        let record = self.write(user_id, &patch).await?;
        tracing::info!(
            user_id,
            event_id = %event.id,
            plan = %plan_type,
            paid_end = ?record.paid_end,
            "Paid plan confirmed by gateway"
        );
        Ok(ReconcileOutcome::Activated(record))
    }
}

fn is_fresh(cached: &CachedRecord, now: DateTime<Utc>) -> bool {
    now - cached.cached_at < Duration::seconds(CACHE_TTL_SECS)
}

/// Why a gateway deactivation must not touch `rec`, if it must not.
///
/// Trials are never revoked by the gateway, and a deactivation for a
/// subscription other than the one on record concerns a superseded plan.
/// A record with no subscription ref accepts the deactivation.
fn unrelated_deactivation(rec: &SubscriptionRecord, event: &GatewayEvent) -> Option<&'static str> {
    if rec.plan_type == PlanType::Trial {
        return Some("trial record");
    }
    match (
        event.subscription_ref.as_deref(),
        rec.external_subscription_ref.as_deref(),
    ) {
        (Some(theirs), Some(ours)) if theirs != ours => Some("other subscription"),
        _ => None,
    }
}

/// Whether a gateway-confirmed window for `plan_type` already covers `now`.
fn is_confirmed_for(rec: &SubscriptionRecord, plan_type: PlanType, now: DateTime<Utc>) -> bool {
    rec.paid_source == Some(PaidSource::Gateway)
        && rec.plan_type == plan_type
        && rec.is_active
        && rec
            .paid_start
            .zip(rec.paid_end)
            .is_some_and(|(start, end)| start <= now && now <= end)
}
