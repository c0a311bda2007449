// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process subscription store for tests and local development.

use crate::error::AppError;
use crate::models::{SubscriptionPatch, SubscriptionRecord};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

/// DashMap-backed store; each entry lock serializes writers for one user.
#[derive(Clone, Default)]
pub struct MemoryDb {
    records: Arc<DashMap<String, SubscriptionRecord>>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_subscription(&self, user_id: &str) -> Option<SubscriptionRecord> {
        self.records.get(user_id).map(|r| r.value().clone())
    }

    pub fn insert_subscription_if_absent(&self, record: &SubscriptionRecord) -> SubscriptionRecord {
        self.records
            .entry(record.user_id.clone())
            .or_insert_with(|| record.clone())
            .value()
            .clone()
    }

    pub fn upsert_subscription(
        &self,
        user_id: &str,
        patch: &SubscriptionPatch,
        now: DateTime<Utc>,
    ) -> Result<SubscriptionRecord, AppError> {
        match self.records.entry(user_id.to_string()) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().apply(patch, now);
                Ok(entry.get().clone())
            }
            Entry::Vacant(entry) => {
                let trial_start = patch.trial_start.ok_or_else(|| {
                    AppError::NotFound(format!("Subscription for user {}", user_id))
                })?;
                let mut record = SubscriptionRecord::new_trial(user_id, trial_start);
                record.apply(patch, now);
                Ok(entry.insert(record).value().clone())
            }
        }
    }

    /// Overwrite a record wholesale (test fixtures).
    pub fn put(&self, record: SubscriptionRecord) {
        self.records.insert(record.user_id.clone(), record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
