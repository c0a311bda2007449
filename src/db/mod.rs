// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer (Firestore, with an in-memory backend for tests).

pub mod firestore;
pub mod memory;

pub use self::firestore::FirestoreDb;
pub use self::memory::MemoryDb;

use crate::error::AppError;
use crate::models::{SubscriptionPatch, SubscriptionRecord};
use chrono::{DateTime, Utc};

/// Collection names as constants.
pub mod collections {
    /// Subscription records (keyed by user_id)
    pub const SUBSCRIPTIONS: &str = "subscriptions";
}

/// Firestore document ID for a user ID.
///
/// Auth provider IDs may contain `/`, which Firestore treats as a path separator.
pub fn document_id(user_id: &str) -> String {
    urlencoding::encode(user_id).into_owned()
}

/// Subscription record store.
#[derive(Clone)]
pub enum Db {
    Firestore(FirestoreDb),
    Memory(MemoryDb),
}

impl Db {
    /// Empty in-memory store.
    pub fn in_memory() -> Self {
        Db::Memory(MemoryDb::new())
    }

    /// Disconnected Firestore store; every call fails.
    pub fn offline() -> Self {
        Db::Firestore(FirestoreDb::new_mock())
    }

    pub async fn get_subscription(
        &self,
        user_id: &str,
    ) -> Result<Option<SubscriptionRecord>, AppError> {
        match self {
            Db::Firestore(db) => db.get_subscription(user_id).await,
            Db::Memory(db) => Ok(db.get_subscription(user_id)),
        }
    }

    pub async fn insert_subscription_if_absent(
        &self,
        record: &SubscriptionRecord,
    ) -> Result<SubscriptionRecord, AppError> {
        match self {
            Db::Firestore(db) => db.insert_subscription_if_absent(record).await,
            Db::Memory(db) => Ok(db.insert_subscription_if_absent(record)),
        }
    }

    pub async fn upsert_subscription(
        &self,
        user_id: &str,
        patch: &SubscriptionPatch,
        now: DateTime<Utc>,
    ) -> Result<SubscriptionRecord, AppError> {
        match self {
            Db::Firestore(db) => db.upsert_subscription(user_id, patch, now).await,
            Db::Memory(db) => db.upsert_subscription(user_id, patch, now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_id_escapes_slashes() {
        assert_eq!(document_id("plain-id_123"), "plain-id_123");
        assert_eq!(document_id("google/abc"), "google%2Fabc");
    }

    #[tokio::test]
    async fn test_offline_store_is_unavailable() {
        let db = Db::offline();
        let err = db.get_subscription("u1").await.unwrap_err();
        assert!(err.is_store_unavailable());
    }
}
