// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Devotion Access: subscription and trial access control
//!
//! This crate provides the backend API that decides whether a user of the
//! habit app may see protected content: a 7-day trial, paid plans bought
//! through a hosted checkout, and reconciliation of the gateway's webhooks.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use dashmap::DashMap;
use db::Db;
use services::{CheckoutService, PaymentGateway, RouteTable, SubscriptionService};
use std::sync::Arc;
use time_utils::SharedClock;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub subscriptions: SubscriptionService,
    pub checkout: CheckoutService,
    pub gateway: PaymentGateway,
    pub routes: RouteTable,
}

impl AppState {
    /// Wire services around a store, clock, and gateway client.
    pub fn new(config: Config, db: Db, clock: SharedClock, gateway: PaymentGateway) -> Self {
        // Shared across all requests within this instance
        let cache = Arc::new(DashMap::new());
        let subscriptions = SubscriptionService::new(db, clock, config.plans.clone(), cache)
            .with_civil_offset(config.civil_offset_minutes);
        let checkout =
            CheckoutService::new(gateway.clone(), subscriptions.clone(), config.plans.clone());

        Self {
            config,
            subscriptions,
            checkout,
            gateway,
            routes: RouteTable::default(),
        }
    }
}
