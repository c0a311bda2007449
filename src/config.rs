// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Secrets are injected as environment variables by the deployment and
//! read once at startup.

use crate::models::PlanType;
use std::env;

/// Default civil offset for day-boundary decisions (+05:30).
pub const DEFAULT_CIVIL_OFFSET_MINUTES: i32 = 330;

/// Which backend the subscription store uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Firestore,
    Memory,
}

/// Gateway plan identifier and price for one paid plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanPricing {
    /// Gateway plan ID (e.g. `plan_Mxyz`)
    pub plan_ref: String,
    /// Amount in the smallest currency unit
    pub amount: u64,
}

/// Plan identifier mappings per paid plan type.
#[derive(Debug, Clone)]
pub struct PlanCatalog {
    pub weekly: PlanPricing,
    pub monthly: PlanPricing,
    pub yearly: PlanPricing,
}

impl PlanCatalog {
    /// Gateway plan for `plan_type`, `None` for the trial.
    pub fn pricing(&self, plan_type: PlanType) -> Option<&PlanPricing> {
        match plan_type {
            PlanType::Trial => None,
            PlanType::Weekly => Some(&self.weekly),
            PlanType::Monthly => Some(&self.monthly),
            PlanType::Yearly => Some(&self.yearly),
        }
    }

    pub fn plan_identifier(&self, plan_type: PlanType) -> Option<&str> {
        self.pricing(plan_type).map(|p| p.plan_ref.as_str())
    }

    /// Reverse lookup from a gateway plan ID.
    pub fn plan_type_for_ref(&self, plan_ref: &str) -> Option<PlanType> {
        PlanType::PAID
            .into_iter()
            .find(|p| self.plan_identifier(*p) == Some(plan_ref))
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Frontend URL for CORS
    pub frontend_url: String,
    /// GCP project ID
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,
    /// Subscription store backend
    pub store_backend: StoreBackend,
    /// Civil offset (minutes east of UTC) for day-boundary decisions
    pub civil_offset_minutes: i32,
    /// Payment gateway API base URL
    pub gateway_api_url: String,
    /// Payment gateway public key ID (sent to the checkout widget)
    pub gateway_key_id: String,
    /// Plan identifiers and prices
    pub plans: PlanCatalog,

    // --- Secrets ---
    /// Payment gateway key secret (API auth and checkout signatures)
    pub gateway_key_secret: String,
    /// Payment gateway webhook signing secret
    pub gateway_webhook_secret: String,
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
}

impl Config {
    /// Default config for testing only.
    pub fn test_default() -> Self {
        Self {
            frontend_url: "http://localhost:5173".to_string(),
            gcp_project_id: "test-project".to_string(),
            port: 8080,
            store_backend: StoreBackend::Memory,
            civil_offset_minutes: DEFAULT_CIVIL_OFFSET_MINUTES,
            gateway_api_url: "http://localhost:9999/v1".to_string(),
            gateway_key_id: "rzp_test_key".to_string(),
            plans: PlanCatalog {
                weekly: PlanPricing {
                    plan_ref: "plan_weekly_test".to_string(),
                    amount: 9_900,
                },
                monthly: PlanPricing {
                    plan_ref: "plan_monthly_test".to_string(),
                    amount: 29_900,
                },
                yearly: PlanPricing {
                    plan_ref: "plan_yearly_test".to_string(),
                    amount: 249_900,
                },
            },
            gateway_key_secret: "test_key_secret".to_string(),
            gateway_webhook_secret: "test_webhook_secret".to_string(),
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// For local development, values can be placed in a `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let store_backend = match env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "firestore".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "firestore" => StoreBackend::Firestore,
            "memory" => StoreBackend::Memory,
            other => {
                return Err(ConfigError::Invalid(
                    "STORE_BACKEND",
                    format!("expected 'firestore' or 'memory', got '{other}'"),
                ))
            }
        };

        Ok(Self {
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            store_backend,
            civil_offset_minutes: env::var("CIVIL_OFFSET_MINUTES")
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(DEFAULT_CIVIL_OFFSET_MINUTES),
            gateway_api_url: env::var("GATEWAY_API_URL")
                .unwrap_or_else(|_| "https://api.razorpay.com/v1".to_string()),
            gateway_key_id: required("GATEWAY_KEY_ID")?,
            plans: PlanCatalog {
                weekly: plan_from_env("PLAN_ID_WEEKLY", "PLAN_AMOUNT_WEEKLY")?,
                monthly: plan_from_env("PLAN_ID_MONTHLY", "PLAN_AMOUNT_MONTHLY")?,
                yearly: plan_from_env("PLAN_ID_YEARLY", "PLAN_AMOUNT_YEARLY")?,
            },

            // Secrets
            gateway_key_secret: required("GATEWAY_KEY_SECRET")?,
            gateway_webhook_secret: required("GATEWAY_WEBHOOK_SECRET")?,
            jwt_signing_key: env::var("JWT_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
                .into_bytes(),
        })
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .map(|v| v.trim().to_string())
        .map_err(|_| ConfigError::Missing(name))
}

fn plan_from_env(
    id_var: &'static str,
    amount_var: &'static str,
) -> Result<PlanPricing, ConfigError> {
    let plan_ref = required(id_var)?;
    let amount = required(amount_var)?
        .parse()
        .map_err(|e| ConfigError::Invalid(amount_var, format!("{e}")))?;
    Ok(PlanPricing { plan_ref, amount })
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
