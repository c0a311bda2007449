// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed subscription operations.

use crate::db::{collections, document_id};
use crate::error::AppError;
use crate::models::{SubscriptionPatch, SubscriptionRecord};
use chrono::{DateTime, Utc};
use firestore::errors::FirestoreError;
use firestore::{FirestoreConsistencySelector, FirestoreResult};

/// Attempts at a contended read-merge-write before giving up.
const MAX_TRANSACTION_ATTEMPTS: u32 = 5;
/// Base delay between attempts, scaled by the attempt number.
const RETRY_BACKOFF_MS: u64 = 50;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a disconnected client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    // ─── Subscription Operations ─────────────────────────────────

    /// Get the subscription record for a user.
    pub async fn get_subscription(
        &self,
        user_id: &str,
    ) -> Result<Option<SubscriptionRecord>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::SUBSCRIPTIONS)
            .obj()
            .one(&document_id(user_id))
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create a record unless one already exists; returns whichever is stored.
    pub async fn insert_subscription_if_absent(
        &self,
        record: &SubscriptionRecord,
    ) -> Result<SubscriptionRecord, AppError> {
        if let Some(existing) = self.get_subscription(&record.user_id).await? {
            return Ok(existing);
        }

        let inserted: Result<SubscriptionRecord, _> = self
            .get_client()?
            .fluent()
            .insert()
            .into(collections::SUBSCRIPTIONS)
            .document_id(document_id(&record.user_id))
            .object(record)
            .execute()
            .await;

        match inserted {
            Ok(stored) => Ok(stored),
            // Lost a create race: the other writer's record wins.
            Err(firestore::errors::FirestoreError::DataConflictError(_)) => {
                tracing::debug!(user_id = %record.user_id, "Concurrent trial creation detected");
                self.get_subscription(&record.user_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::Database(format!(
                            "Subscription for {} vanished after create conflict",
                            record.user_id
                        ))
                    })
            }
            Err(e) => Err(AppError::Database(e.to_string())),
        }
    }

    /// Merge `patch` into the user's record inside a transaction, retrying
    /// when Firestore aborts it for contention.
    ///
    /// Creates the record when absent and the patch carries `trial_start`;
    /// otherwise an absent record is `NotFound`.
    pub async fn upsert_subscription(
        &self,
        user_id: &str,
        patch: &SubscriptionPatch,
        now: DateTime<Utc>,
    ) -> Result<SubscriptionRecord, AppError> {
        let client = self.get_client()?;
        let doc_id = document_id(user_id);

        let mut attempt = 1;
        loop {
            match Self::try_upsert(client, &doc_id, user_id, patch, now).await {
                Ok(Some(record)) => return Ok(record),
                Ok(None) => {
                    return Err(AppError::NotFound(format!(
                        "Subscription for user {}",
                        user_id
                    )))
                }
                Err(FirestoreError::DatabaseError(ref e))
                    if e.retry_possible && attempt < MAX_TRANSACTION_ATTEMPTS =>
                {
                    tracing::warn!(
                        user_id,
                        attempt,
                        error = %e.details,
                        "Subscription transaction contended, retrying"
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(
                        RETRY_BACKOFF_MS * u64::from(attempt),
                    ))
                    .await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(AppError::Database(format!(
                        "Subscription transaction failed: {}",
                        e
                    )))
                }
            }
        }
    }

    /// One read-merge-write attempt. `None` when the record is absent and
    /// the patch cannot create it.
    async fn try_upsert(
        client: &firestore::FirestoreDb,
        doc_id: &str,
        user_id: &str,
        patch: &SubscriptionPatch,
        now: DateTime<Utc>,
    ) -> FirestoreResult<Option<SubscriptionRecord>> {
        let mut transaction = client.begin_transaction().await?;

        // Reading through the transaction locks the document until commit
        let in_transaction = client.clone_with_consistency_selector(
            FirestoreConsistencySelector::Transaction(transaction.transaction_id().clone()),
        );
        let read: FirestoreResult<Option<SubscriptionRecord>> = in_transaction
            .fluent()
            .select()
            .by_id_in(collections::SUBSCRIPTIONS)
            .obj()
            .one(doc_id)
            .await;
        let current = match read {
            Ok(current) => current,
            Err(e) => {
                let _ = transaction.rollback().await;
                return Err(e);
            }
        };

        let mut record = match (current, patch.trial_start) {
            (Some(record), _) => record,
            (None, Some(trial_start)) => SubscriptionRecord::new_trial(user_id, trial_start),
            (None, None) => {
                transaction.rollback().await?;
                return Ok(None);
            }
        };
        record.apply(patch, now);

        client
            .fluent()
            .update()
            .in_col(collections::SUBSCRIPTIONS)
            .document_id(doc_id)
            .object(&record)
            .add_to_transaction(&mut transaction)?;

        transaction.commit().await?;
        Ok(Some(record))
    }
}
