// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Subscription lifecycle rules.
//!
//! Pure functions of a record and an instant; no I/O and no clock reads.
//! [`has_active_access`] is the one predicate the rest of the service should
//! gate on. The others exist for distinct messaging on the upgrade screen.
//!
//! Cancellation revokes access immediately: `is_active == false` denies
//! access even while `paid_end` is still in the future.

use crate::models::{DeactivationReason, PlanType, SubscriptionRecord};
use crate::time_utils::{civil_day, format_utc_rfc3339};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Trial plan whose window has passed. The end instant itself is still inside the window.
pub fn is_trial_expired(rec: &SubscriptionRecord, now: DateTime<Utc>) -> bool {
    rec.plan_type == PlanType::Trial && now > rec.trial_end
}

/// Paid plan whose window has passed, or which never got an end date.
pub fn is_paid_expired(rec: &SubscriptionRecord, now: DateTime<Utc>) -> bool {
    rec.plan_type != PlanType::Trial && rec.paid_end.is_none_or(|end| now > end)
}

pub fn is_expired(rec: &SubscriptionRecord, now: DateTime<Utc>) -> bool {
    match rec.plan_type {
        PlanType::Trial => is_trial_expired(rec, now),
        PlanType::Weekly | PlanType::Monthly | PlanType::Yearly => is_paid_expired(rec, now),
    }
}

/// Whether the user may view protected content. Absent record never has access.
pub fn has_active_access(rec: Option<&SubscriptionRecord>, now: DateTime<Utc>) -> bool {
    rec.is_some_and(|r| r.is_active && !is_expired(r, now))
}

pub fn is_paid_subscriber(rec: &SubscriptionRecord) -> bool {
    rec.plan_type != PlanType::Trial
}

pub fn is_cancelled(rec: &SubscriptionRecord) -> bool {
    rec.plan_type != PlanType::Trial && !rec.is_active
}

/// End of the window that currently governs access.
pub fn effective_end(rec: &SubscriptionRecord) -> Option<DateTime<Utc>> {
    match rec.plan_type {
        PlanType::Trial => Some(rec.trial_end),
        _ => rec.paid_end,
    }
}

/// Whole days left in the governing window, rounded up; never negative.
pub fn days_remaining(rec: Option<&SubscriptionRecord>, now: DateTime<Utc>) -> u32 {
    let Some(end) = rec.and_then(effective_end) else {
        return 0;
    };
    let millis = (end - now).num_milliseconds();
    if millis <= 0 {
        return 0;
    }
    let days = (millis + MILLIS_PER_DAY - 1) / MILLIS_PER_DAY;
    u32::try_from(days).unwrap_or(u32::MAX)
}

/// Why a user is locked out of protected content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "snake_case")]
pub enum LockoutReason {
    NoSubscription,
    TrialExpired,
    SubscriptionExpired,
    PaymentFailed,
    Cancelled,
}

/// Lockout reason for a record, `None` while access is active.
pub fn lockout_reason(
    rec: Option<&SubscriptionRecord>,
    now: DateTime<Utc>,
) -> Option<LockoutReason> {
    let Some(rec) = rec else {
        return Some(LockoutReason::NoSubscription);
    };

    if !rec.is_active {
        return Some(match rec.deactivation_reason {
            Some(DeactivationReason::PaymentFailed) => LockoutReason::PaymentFailed,
            Some(DeactivationReason::GatewayExpired) => LockoutReason::SubscriptionExpired,
            Some(DeactivationReason::UserCancelled | DeactivationReason::GatewayCancelled) => {
                LockoutReason::Cancelled
            }
            None if rec.plan_type == PlanType::Trial => LockoutReason::TrialExpired,
            None => LockoutReason::Cancelled,
        });
    }

    if is_trial_expired(rec, now) {
        Some(LockoutReason::TrialExpired)
    } else if is_paid_expired(rec, now) {
        Some(LockoutReason::SubscriptionExpired)
    } else {
        None
    }
}

/// Derived subscription state served to clients and consumed by the guard.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct AccessStatus {
    pub record_exists: bool,
    pub has_access: bool,
    pub plan_type: Option<PlanType>,
    pub days_remaining: u32,
    pub is_paid_subscriber: bool,
    pub is_cancelled: bool,
    pub onboarding_complete: bool,
    pub effective_end: Option<String>,
    pub lockout: Option<LockoutReason>,
    /// Today's date in the service's civil offset
    pub civil_date: NaiveDate,
}

pub fn access_status(
    rec: Option<&SubscriptionRecord>,
    now: DateTime<Utc>,
    civil_offset_minutes: i32,
) -> AccessStatus {
    AccessStatus {
        record_exists: rec.is_some(),
        has_access: has_active_access(rec, now),
        plan_type: rec.map(|r| r.plan_type),
        days_remaining: days_remaining(rec, now),
        is_paid_subscriber: rec.is_some_and(is_paid_subscriber),
        is_cancelled: rec.is_some_and(is_cancelled),
        onboarding_complete: rec.is_some_and(|r| r.has_completed_onboarding),
        effective_end: rec.and_then(effective_end).map(format_utc_rfc3339),
        lockout: lockout_reason(rec, now),
        civil_date: civil_day(now, civil_offset_minutes),
    }
}
