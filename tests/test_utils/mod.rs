//! Test utilities for database and provider testing.
//!
//! This module provides utilities for setting up in-memory SQLite databases
//! with migrations, seeding tenants and credentials, and pointing provider
//! configuration at a mock server.

#![allow(dead_code)]

use anyhow::Result;
use chrono::Utc;
use crm_sync::config::{AppConfig, SyncConfig};
use crm_sync::models::{credential, tenant};
use crm_sync::repositories::{CredentialRepository, TenantRepository};
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Statement};
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    // Create in-memory SQLite database
    let db = Database::connect("sqlite::memory:").await?;

    // Run all migrations
    Migrator::up(&db, None).await?;

    // Fixtures reference credentials and tenants loosely; skip FK enforcement.
    db.execute(Statement::from_string(
        db.get_database_backend(),
        "PRAGMA foreign_keys = OFF".to_string(),
    ))
    .await?;

    Ok(db)
}

/// Sets up an in-memory SQLite database with all migrations applied and returns an Arc.
pub async fn setup_test_db_arc() -> Result<Arc<DatabaseConnection>> {
    let db = setup_test_db().await?;
    Ok(Arc::new(db))
}

/// Creates an active tenant.
pub async fn create_test_tenant(
    db: &Arc<DatabaseConnection>,
    domain: Option<&str>,
) -> Result<tenant::Model> {
    TenantRepository::new(db.clone())
        .create(Some("Test Tenant"), domain)
        .await
}

/// A token blob that will not be considered near expiry.
pub fn fresh_token_blob(access_token: &str) -> JsonValue {
    json!({
        "access_token": access_token,
        "refresh_token": "refresh-1",
        "expires_in": 3600,
        "issued_at": Utc::now().timestamp(),
    })
}

/// A token blob whose access token expired long ago.
pub fn expired_token_blob(access_token: &str) -> JsonValue {
    json!({
        "access_token": access_token,
        "refresh_token": "refresh-1",
        "expires_in": 3600,
        "issued_at": Utc::now().timestamp() - 7200,
    })
}

/// Stores an active credential for the tenant.
pub async fn create_test_credential(
    db: &Arc<DatabaseConnection>,
    tenant_id: &uuid::Uuid,
    provider_type: &str,
    token_blob: JsonValue,
) -> Result<credential::Model> {
    CredentialRepository::new(db.clone())
        .create(tenant_id, provider_type, "owner@example.com", token_blob)
        .await
}

/// Sync settings tuned for tests: no jitter, tiny backoff, no random checkpoints.
pub fn test_sync_config() -> SyncConfig {
    SyncConfig {
        batch_size: 2,
        checkpoint_probability: 0.0,
        refresh_slack_seconds: 30,
        fetch_max_attempts: 3,
        backoff_base_ms: 1,
        backoff_max_seconds: 1,
        jitter_factor: 0.0,
        bulk_poll_interval_ms: 1,
        bulk_max_polls: 5,
        http_timeout_seconds: 5,
    }
}

/// Configuration with every provider pointed at `base_url`.
pub fn test_app_config(base_url: &str) -> AppConfig {
    let mut config = AppConfig {
        sync: test_sync_config(),
        ..AppConfig::default()
    };

    for oauth in [
        &mut config.salesforce,
        &mut config.outreach,
        &mut config.google_calendar,
    ] {
        oauth.client_id = Some("client-id".to_string());
        oauth.client_secret = Some("client-secret".to_string());
        oauth.redirect_uri = "https://app.example.com/callback".to_string();
        oauth.token_url = format!("{base_url}/oauth/token");
    }
    config.salesforce.api_base = base_url.to_string();
    config.outreach.api_base = format!("{base_url}/api/v2");
    config.google_calendar.api_base = format!("{base_url}/calendar/v3");

    config
}

/// Counts rows of a table, optionally filtered by a raw SQL condition.
pub async fn count_rows(db: &DatabaseConnection, table: &str, filter: Option<&str>) -> Result<i64> {
    let sql = match filter {
        Some(filter) => format!("SELECT COUNT(*) AS n FROM {table} WHERE {filter}"),
        None => format!("SELECT COUNT(*) AS n FROM {table}"),
    };
    let row = db
        .query_one(Statement::from_string(db.get_database_backend(), sql))
        .await?
        .ok_or_else(|| anyhow::anyhow!("count query returned no row"))?;
    Ok(row.try_get::<i64>("", "n")?)
}
