// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod payment;
pub mod subscription;

pub use payment::{GatewayEvent, GatewayEventKind};
pub use subscription::{
    DeactivationReason, PaidSource, PlanType, SubscriptionPatch, SubscriptionRecord,
};
