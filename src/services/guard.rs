// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Navigation guard.
//!
//! A pure decision table over the auth state, the user's record, and the
//! target route. Inputs that are still loading are explicit, and the guard
//! never redirects until every input it needs has resolved.

use crate::models::SubscriptionRecord;
use crate::services::lifecycle;
use chrono::{DateTime, Utc};
use serde::Serialize;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// A value that may still be loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Known<T> {
    Loading,
    Ready(T),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    SignedOut,
    SignedIn,
}

/// The parts of a record the guard looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordView {
    pub onboarding_complete: bool,
    pub has_access: bool,
    pub is_paid_subscriber: bool,
}

impl RecordView {
    pub fn from_record(rec: &SubscriptionRecord, now: DateTime<Utc>) -> Self {
        Self {
            onboarding_complete: rec.has_completed_onboarding,
            has_access: lifecycle::has_active_access(Some(rec), now),
            is_paid_subscriber: lifecycle::is_paid_subscriber(rec),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteCategory {
    /// Anyone, signed in or not
    Public,
    /// Signed-in users; no access required
    AuthOnly,
    /// Signed-in, onboarded users with active access
    Protected,
}

/// Classification of one route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteSpec {
    pub category: RouteCategory,
    /// Reachable while the user has no record or has not finished onboarding.
    pub allowed_before_onboarding: bool,
    /// Plan selection; stays reachable for trial users who want to upgrade.
    pub upgrade_route: bool,
}

impl RouteSpec {
    pub const fn new(category: RouteCategory) -> Self {
        Self {
            category,
            allowed_before_onboarding: false,
            upgrade_route: false,
        }
    }

    pub const fn before_onboarding(mut self) -> Self {
        self.allowed_before_onboarding = true;
        self
    }

    pub const fn upgrade(mut self) -> Self {
        self.upgrade_route = true;
        self
    }
}

/// Route classifications plus the four redirect destinations.
#[derive(Debug, Clone)]
pub struct RouteTable {
    pub landing: String,
    pub onboarding: String,
    pub pricing: String,
    pub home: String,
    routes: Vec<(String, RouteSpec)>,
}

impl Default for RouteTable {
    fn default() -> Self {
        use RouteCategory::*;
        Self {
            landing: "/".to_string(),
            onboarding: "/onboarding".to_string(),
            pricing: "/pricing".to_string(),
            home: "/home".to_string(),
            routes: vec![
                ("/".to_string(), RouteSpec::new(Public).before_onboarding()),
                ("/login".to_string(), RouteSpec::new(Public)),
                ("/signup".to_string(), RouteSpec::new(Public)),
                (
                    "/onboarding".to_string(),
                    RouteSpec::new(AuthOnly).before_onboarding(),
                ),
                ("/start-trial".to_string(), RouteSpec::new(AuthOnly)),
                ("/pricing".to_string(), RouteSpec::new(AuthOnly).upgrade()),
                ("/home".to_string(), RouteSpec::new(Protected)),
            ],
        }
    }
}

impl RouteTable {
    /// Classify `path`. Unlisted paths are protected.
    pub fn classify(&self, path: &str) -> RouteSpec {
        let path = normalize_path(path);
        self.routes
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, spec)| *spec)
            .unwrap_or(RouteSpec::new(RouteCategory::Protected))
    }

    /// Every listed path (for exhaustive checks).
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.routes.iter().map(|(p, _)| p.as_str())
    }
}

/// Strip any query or fragment and a trailing slash.
fn normalize_path(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let path = &path[..end];
    match path.strip_suffix('/') {
        Some(stripped) if !stripped.is_empty() => stripped,
        _ if path.is_empty() => "/",
        _ => path,
    }
}

/// What to do with a navigation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(tag = "action", content = "to", rename_all = "snake_case")]
pub enum Decision {
    /// Show a neutral loading state; do not navigate.
    Loading,
    Render,
    Redirect(String),
}

/// Decide a navigation to `path`. First matching rule wins.
pub fn decide(
    auth: Known<AuthState>,
    record: Known<Option<RecordView>>,
    path: &str,
    table: &RouteTable,
) -> Decision {
    let route = table.classify(path);

    let Known::Ready(auth) = auth else {
        return Decision::Loading;
    };

    let redirect = match auth {
        AuthState::SignedOut => {
            (route.category != RouteCategory::Public).then_some(table.landing.as_str())
        }
        AuthState::SignedIn => {
            let Known::Ready(record) = record else {
                return Decision::Loading;
            };
            signed_in_redirect(record, route, table)
        }
    };

    match redirect {
        Some(to) if to != normalize_path(path) => Decision::Redirect(to.to_string()),
        _ => Decision::Render,
    }
}

fn signed_in_redirect<'a>(
    record: Option<RecordView>,
    route: RouteSpec,
    table: &'a RouteTable,
) -> Option<&'a str> {
    let Some(rec) = record else {
        return (!route.allowed_before_onboarding).then_some(table.onboarding.as_str());
    };

    if !rec.onboarding_complete {
        return (!route.allowed_before_onboarding).then_some(table.onboarding.as_str());
    }

    if !rec.has_access {
        return (route.category == RouteCategory::Protected).then_some(table.pricing.as_str());
    }

    if route.category == RouteCategory::AuthOnly && (!route.upgrade_route || rec.is_paid_subscriber)
    {
        return Some(table.home.as_str());
    }

    None
}
