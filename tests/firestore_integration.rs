// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore integration tests.
//!
//! These tests require the Firestore emulator to be running.
//! Run with FIRESTORE_EMULATOR_HOST pointing at a local emulator.
//!
//! The emulator provides a clean state for each test run.

use devotion_access::db::Db;
use devotion_access::error::AppError;
use devotion_access::models::{
    DeactivationReason, PaidSource, PlanType, SubscriptionPatch, SubscriptionRecord,
};

mod common;
use common::{day, test_db};

/// Generate a unique user ID for test isolation.
fn unique_user_id(prefix: &str) -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    // Slash exercises document ID escaping
    format!("test/{prefix}-{nanos}")
}

// ═══════════════════════════════════════════════════════════════════════════
// SUBSCRIPTION RECORD TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_insert_if_absent_keeps_first_trial() {
    require_emulator!();

    let db = test_db().await;
    let user_id = unique_user_id("trial");

    let before = db.get_subscription(&user_id).await.unwrap();
    assert!(before.is_none(), "Record should not exist before creation");

    let first = SubscriptionRecord::new_trial(&user_id, day(0));
    let stored = db.insert_subscription_if_absent(&first).await.unwrap();
    assert_eq!(stored.trial_end, day(7));

    let second = SubscriptionRecord::new_trial(&user_id, day(3));
    let stored = db.insert_subscription_if_absent(&second).await.unwrap();
    assert_eq!(stored.trial_start, day(0), "Second insert must not reset the trial");
}

#[tokio::test]
async fn test_upsert_merges_fields() {
    require_emulator!();

    let db = test_db().await;
    let user_id = unique_user_id("merge");
    db.insert_subscription_if_absent(&SubscriptionRecord::new_trial(&user_id, day(0)))
        .await
        .unwrap();

    db.upsert_subscription(&user_id, &SubscriptionPatch::onboarding_complete(), day(1))
        .await
        .unwrap();

    let mut patch =
        SubscriptionPatch::paid_activation(PlanType::Yearly, day(2), PaidSource::Gateway).unwrap();
    patch.processed_event = Some(("evt_1".to_string(), day(2)));
    let rec = db.upsert_subscription(&user_id, &patch, day(2)).await.unwrap();

    assert!(rec.has_completed_onboarding);
    assert_eq!(rec.plan_type, PlanType::Yearly);
    assert_eq!(rec.paid_end, Some(day(367)));
    assert!(rec.has_processed_event("evt_1"));

    let rec = db
        .upsert_subscription(
            &user_id,
            &SubscriptionPatch::deactivation(DeactivationReason::UserCancelled),
            day(3),
        )
        .await
        .unwrap();
    assert!(!rec.is_active);
    assert!(rec.has_completed_onboarding);

    // Read back from the store, not the returned value
    let stored = db.get_subscription(&user_id).await.unwrap().unwrap();
    assert_eq!(stored, rec);
}

#[tokio::test]
async fn test_upsert_missing_record_is_not_found() {
    require_emulator!();

    let db = test_db().await;
    let user_id = unique_user_id("missing");

    let err = db
        .upsert_subscription(&user_id, &SubscriptionPatch::onboarding_complete(), day(0))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    assert!(db.get_subscription(&user_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_concurrent_disjoint_updates_are_not_lost() {
    require_emulator!();

    let db = Db::Firestore(test_db().await);
    let user_id = unique_user_id("race");
    db.insert_subscription_if_absent(&SubscriptionRecord::new_trial(&user_id, day(0)))
        .await
        .unwrap();

    let mut handles = vec![];
    for i in 0..5 {
        let db = db.clone();
        let user_id = user_id.clone();
        handles.push(tokio::spawn(async move {
            let patch = SubscriptionPatch::processed(&format!("evt_{i}"), day(1));
            db.upsert_subscription(&user_id, &patch, day(1)).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let rec = db.get_subscription(&user_id).await.unwrap().unwrap();
    assert_eq!(rec.processed_event_ids.len(), 5, "Every transaction's write must survive");
}

#[tokio::test]
async fn test_concurrent_cancel_and_onboarding_both_survive() {
    require_emulator!();

    let db = Db::Firestore(test_db().await);
    let user_id = unique_user_id("cancel_race");
    let mut paid = SubscriptionRecord::new_trial(&user_id, day(0));
    paid.apply(
        &SubscriptionPatch::paid_activation(PlanType::Monthly, day(1), PaidSource::Gateway)
            .unwrap(),
        day(1),
    );
    db.insert_subscription_if_absent(&paid).await.unwrap();

    let mut handles = vec![];
    for round in 0..4 {
        let db = db.clone();
        let user_id = user_id.clone();
        handles.push(tokio::spawn(async move {
            let patch = if round % 2 == 0 {
                SubscriptionPatch::deactivation(DeactivationReason::UserCancelled)
            } else {
                SubscriptionPatch::onboarding_complete()
            };
            db.upsert_subscription(&user_id, &patch, day(2)).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let rec = db.get_subscription(&user_id).await.unwrap().unwrap();
    assert!(!rec.is_active);
    assert!(rec.has_completed_onboarding);
    assert_eq!(rec.plan_type, PlanType::Monthly);
}
