// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Checkout flow: start a gateway subscription and apply the widget's outcome.
//!
//! The widget's success callback only triggers the optimistic activation.
//! The gateway's own webhook remains the authoritative confirmation.
//!
//! The plan granted on success is the one the gateway subscription was
//! created for, and that subscription must belong to the caller. The
//! callback signature alone covers neither.

use crate::config::PlanCatalog;
use crate::error::AppError;
use crate::models::{PlanType, SubscriptionRecord};
use crate::services::gateway::{PaymentGateway, SubscriptionNotes};
use crate::services::subscription::{ExternalRefs, SubscriptionService};
use serde::Serialize;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Contact details pre-filled into the checkout widget.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Prefill {
    pub email: Option<String>,
    pub name: Option<String>,
}

/// Everything the client needs to open the hosted checkout widget.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct CheckoutSession {
    pub key_id: String,
    pub subscription_ref: String,
    pub plan_ref: String,
    pub plan_type: PlanType,
    /// Smallest currency unit
    pub amount: u64,
    pub prefill: Prefill,
}

/// What the checkout widget reported.
#[derive(Debug, Clone)]
pub enum CheckoutOutcome {
    Success {
        plan_type: PlanType,
        payment_ref: String,
        subscription_ref: String,
        signature: String,
    },
    /// User closed the widget.
    Dismissed,
    Failed {
        reason: String,
    },
}

/// Result of applying a checkout outcome.
#[derive(Debug, Clone)]
pub enum CheckoutResult {
    Activated(SubscriptionRecord),
    Dismissed,
    Failed(String),
}

#[derive(Clone)]
pub struct CheckoutService {
    gateway: PaymentGateway,
    subscriptions: SubscriptionService,
    plans: PlanCatalog,
}

impl CheckoutService {
    pub fn new(
        gateway: PaymentGateway,
        subscriptions: SubscriptionService,
        plans: PlanCatalog,
    ) -> Self {
        Self {
            gateway,
            subscriptions,
            plans,
        }
    }

    /// Create a gateway subscription for `plan_type` and describe the widget to open.
    ///
    /// Nothing is written to the user's record here.
    pub async fn initiate(
        &self,
        user_id: &str,
        plan_type: PlanType,
        prefill: Prefill,
    ) -> Result<CheckoutSession, AppError> {
        let pricing = self.plans.pricing(plan_type).ok_or_else(|| {
            AppError::BadRequest("The trial cannot be purchased".to_string())
        })?;

        let notes = SubscriptionNotes {
            user_id: user_id.to_string(),
            plan_type: plan_type.to_string(),
        };
        let subscription = self
            .gateway
            .create_subscription(&pricing.plan_ref, &notes)
            .await?;

        tracing::info!(
            user_id,
            plan = %plan_type,
            subscription_ref = %subscription.id,
            "Checkout initiated"
        );

        Ok(CheckoutSession {
            key_id: self.gateway.key_id().to_string(),
            subscription_ref: subscription.id,
            plan_ref: pricing.plan_ref.clone(),
            plan_type,
            amount: pricing.amount,
            prefill,
        })
    }

    /// Apply the widget's outcome. Only a verified success mutates the record.
    pub async fn complete(
        &self,
        user_id: &str,
        outcome: CheckoutOutcome,
    ) -> Result<CheckoutResult, AppError> {
        match outcome {
            CheckoutOutcome::Success {
                plan_type,
                payment_ref,
                subscription_ref,
                signature,
            } => {
                if !self
                    .gateway
                    .verify_checkout_signature(&payment_ref, &subscription_ref, &signature)
                {
                    tracing::warn!(
                        user_id,
                        subscription_ref = %subscription_ref,
                        "Checkout signature mismatch"
                    );
                    return Err(AppError::SignatureVerification);
                }

                let subscription = self.gateway.fetch_subscription(&subscription_ref).await?;
                let owner = subscription.notes.as_ref().map(|n| n.user_id.as_str());
                if owner != Some(user_id) {
                    tracing::warn!(
                        user_id,
                        subscription_ref = %subscription_ref,
                        owner = ?owner,
                        "Security Alert: Checkout completed with another user's subscription"
                    );
                    return Err(AppError::SignatureVerification);
                }

                let purchased = self
                    .plans
                    .plan_type_for_ref(&subscription.plan_id)
                    .ok_or_else(|| {
                        AppError::BadRequest(format!(
                            "Subscription is for unknown plan {}",
                            subscription.plan_id
                        ))
                    })?;
                if purchased != plan_type {
                    tracing::warn!(
                        user_id,
                        subscription_ref = %subscription_ref,
                        purchased = %purchased,
                        reported = %plan_type,
                        "Checkout reported a different plan than was purchased"
                    );
                    return Err(AppError::BadRequest(format!(
                        "Checkout was for the {purchased} plan, not {plan_type}"
                    )));
                }

                let refs = ExternalRefs {
                    customer_ref: subscription.customer_id,
                    subscription_ref: Some(subscription_ref),
                    plan_ref: Some(subscription.plan_id),
                    payment_ref: Some(payment_ref),
                };
                let record = self
                    .subscriptions
                    .activate_paid_plan_with_refs(user_id, purchased, &refs)
                    .await?;
                Ok(CheckoutResult::Activated(record))
            }
            CheckoutOutcome::Dismissed => {
                tracing::info!(user_id, "Checkout dismissed");
                Ok(CheckoutResult::Dismissed)
            }
            CheckoutOutcome::Failed { reason } => {
                tracing::warn!(user_id, reason = %reason, "Checkout failed");
                Ok(CheckoutResult::Failed(reason))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::{Db, MemoryDb};
    use crate::services::gateway::sign_hex;
    use crate::time_utils::FixedClock;
    use chrono::{TimeZone, Utc};
    use dashmap::DashMap;
    use std::sync::Arc;

    fn setup() -> (CheckoutService, SubscriptionService, MemoryDb) {
        let config = Config::test_default();
        let mem = MemoryDb::new();
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 1, 11, 0, 0, 0).unwrap(),
        ));
        let subscriptions = SubscriptionService::new(
            Db::Memory(mem.clone()),
            clock,
            config.plans.clone(),
            Arc::new(DashMap::new()),
        );
        let checkout = CheckoutService::new(
            PaymentGateway::new_mock(&config),
            subscriptions.clone(),
            config.plans.clone(),
        );
        (checkout, subscriptions, mem)
    }

    #[tokio::test]
    async fn test_initiate_returns_widget_parameters() {
        let (checkout, _subs, mem) = setup();
        let prefill = Prefill {
            email: Some("a@example.com".to_string()),
            name: None,
        };
        let session = checkout
            .initiate("u1", PlanType::Yearly, prefill.clone())
            .await
            .unwrap();

        assert_eq!(session.key_id, "rzp_test_key");
        assert_eq!(session.plan_ref, "plan_yearly_test");
        assert_eq!(session.amount, 249_900);
        assert_eq!(session.prefill, prefill);
        assert!(session.subscription_ref.starts_with("sub_mock_"));
        assert!(mem.is_empty());
    }

    #[tokio::test]
    async fn test_initiate_trial_is_rejected() {
        let (checkout, _subs, _mem) = setup();
        let err = checkout
            .initiate("u1", PlanType::Trial, Prefill::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_dismiss_and_failure_do_not_mutate() {
        let (checkout, subs, mem) = setup();
        let before = subs.create_trial("u1").await.unwrap();

        let result = checkout
            .complete("u1", CheckoutOutcome::Dismissed)
            .await
            .unwrap();
        assert!(matches!(result, CheckoutResult::Dismissed));

        let result = checkout
            .complete(
                "u1",
                CheckoutOutcome::Failed {
                    reason: "widget failed to load".to_string(),
                },
            )
            .await
            .unwrap();
        assert!(matches!(result, CheckoutResult::Failed(_)));
        assert_eq!(mem.get_subscription("u1"), Some(before));
    }

    #[tokio::test]
    async fn test_success_with_bad_signature_is_rejected() {
        let (checkout, subs, mem) = setup();
        let before = subs.create_trial("u1").await.unwrap();

        let err = checkout
            .complete(
                "u1",
                CheckoutOutcome::Success {
                    plan_type: PlanType::Monthly,
                    payment_ref: "pay_1".to_string(),
                    subscription_ref: "sub_1".to_string(),
                    signature: "00".repeat(32),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SignatureVerification));
        assert_eq!(mem.get_subscription("u1"), Some(before));
    }

    /// Initiate a checkout for `user_id` and build the widget's signed success.
    async fn paid(checkout: &CheckoutService, user_id: &str, plan: PlanType) -> CheckoutOutcome {
        let session = checkout
            .initiate(user_id, plan, Prefill::default())
            .await
            .unwrap();
        let payload = format!("pay_1|{}", session.subscription_ref);
        CheckoutOutcome::Success {
            plan_type: plan,
            payment_ref: "pay_1".to_string(),
            signature: sign_hex(b"test_key_secret", payload.as_bytes()),
            subscription_ref: session.subscription_ref,
        }
    }

    #[tokio::test]
    async fn test_success_activates_optimistically() {
        let (checkout, subs, _mem) = setup();
        subs.create_trial("u1").await.unwrap();

        let outcome = paid(&checkout, "u1", PlanType::Monthly).await;
        let result = checkout.complete("u1", outcome).await.unwrap();

        let CheckoutResult::Activated(rec) = result else {
            panic!("expected activation");
        };
        assert_eq!(rec.plan_type, PlanType::Monthly);
        assert_eq!(
            rec.paid_end,
            Some(Utc.with_ymd_and_hms(2026, 2, 10, 0, 0, 0).unwrap())
        );
        assert_eq!(rec.external_subscription_ref.as_deref(), Some("sub_mock_1"));
        assert_eq!(rec.external_plan_ref.as_deref(), Some("plan_monthly_test"));
    }

    #[tokio::test]
    async fn test_reported_plan_must_match_purchase() {
        let (checkout, subs, mem) = setup();
        let before = subs.create_trial("u1").await.unwrap();

        let CheckoutOutcome::Success {
            payment_ref,
            subscription_ref,
            signature,
            ..
        } = paid(&checkout, "u1", PlanType::Weekly).await
        else {
            unreachable!();
        };
        let err = checkout
            .complete(
                "u1",
                CheckoutOutcome::Success {
                    plan_type: PlanType::Yearly,
                    payment_ref,
                    subscription_ref,
                    signature,
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::BadRequest(_)));
        assert_eq!(mem.get_subscription("u1"), Some(before));
    }

    #[tokio::test]
    async fn test_other_users_checkout_cannot_be_replayed() {
        let (checkout, subs, mem) = setup();
        subs.create_trial("u1").await.unwrap();
        let before = subs.create_trial("u2").await.unwrap();

        let outcome = paid(&checkout, "u1", PlanType::Yearly).await;
        let err = checkout.complete("u2", outcome).await.unwrap_err();

        assert!(matches!(err, AppError::SignatureVerification));
        assert_eq!(mem.get_subscription("u2"), Some(before));
    }

    #[tokio::test]
    async fn test_unknown_subscription_is_rejected() {
        let (checkout, subs, _mem) = setup();
        subs.create_trial("u1").await.unwrap();

        let err = checkout
            .complete(
                "u1",
                CheckoutOutcome::Success {
                    plan_type: PlanType::Monthly,
                    payment_ref: "pay_1".to_string(),
                    subscription_ref: "sub_1".to_string(),
                    signature: sign_hex(b"test_key_secret", b"pay_1|sub_1"),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
