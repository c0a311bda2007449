// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod checkout;
pub mod gateway;
pub mod guard;
pub mod lifecycle;
pub mod subscription;

pub use checkout::{CheckoutOutcome, CheckoutResult, CheckoutService, CheckoutSession, Prefill};
pub use gateway::PaymentGateway;
pub use guard::{decide, AuthState, Decision, Known, RecordView, RouteTable};
pub use lifecycle::AccessStatus;
pub use subscription::{ExternalRefs, ReconcileOutcome, SubscriptionCache, SubscriptionService};
