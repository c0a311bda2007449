// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Devotion Access API Server
//!
//! Serves trial, subscription, checkout, and navigation decisions for the
//! habit app, and reconciles payment gateway webhooks.

use devotion_access::{
    config::{Config, StoreBackend},
    db::{Db, FirestoreDb},
    services::PaymentGateway,
    time_utils::SystemClock,
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting Devotion Access API");

    // Initialize the subscription store
    let db = match config.store_backend {
        StoreBackend::Firestore => Db::Firestore(FirestoreDb::new(&config.gcp_project_id).await?),
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory subscription store; records are lost on restart");
            Db::in_memory()
        }
    };

    let gateway = PaymentGateway::new(&config);
    tracing::info!(
        api_url = %config.gateway_api_url,
        key_id = %config.gateway_key_id,
        "Payment gateway client initialized"
    );

    // Build shared state
    let state = Arc::new(AppState::new(
        config.clone(),
        db,
        Arc::new(SystemClock),
        gateway,
    ));

    // Build router
    let app = devotion_access::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("devotion_access=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
