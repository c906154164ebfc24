//! # CRM Sync Entry Point
//!
//! Runs one sync pass over every active tenant and exits.

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use tracing::{error, info};
use uuid::Uuid;

use crm_sync::{
    config::ConfigLoader, connectors::Registry, db, mapper::ProviderKind, sync_driver::SyncDriver,
    telemetry,
};

/// Incremental CRM sync
#[derive(Parser, Debug)]
#[command(name = "crm-sync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Only sync this tenant
    #[arg(long)]
    tenant: Option<Uuid>,

    /// Only sync this provider (salesforce, outreach, google-calendar)
    #[arg(long)]
    provider: Option<String>,

    /// Do not apply pending migrations before syncing
    #[arg(long)]
    skip_migrations: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new()
        .load()
        .context("loading configuration")?;
    telemetry::init_tracing(&config).context("initializing tracing")?;

    info!(profile = %config.profile, "Loaded configuration");
    if let Ok(redacted_json) = config.redacted_json() {
        info!(config = %redacted_json, "Effective configuration");
    }

    let provider = cli
        .provider
        .as_deref()
        .map(|slug| {
            ProviderKind::from_slug(slug).ok_or_else(|| anyhow!("unknown provider '{slug}'"))
        })
        .transpose()?;

    let db = db::init_pool(&config)
        .await
        .context("initializing database connection pool")?;
    if !cli.skip_migrations {
        db::run_migrations(&db).await?;
    }

    let registry = Registry::from_config(&config);
    if registry.is_empty() {
        error!("No provider is configured; nothing to sync");
    }

    let driver = SyncDriver::new(Arc::new(db), registry, &config)
        .context("building sync driver")?
        .with_tenant_filter(cli.tenant)
        .with_provider_filter(provider);

    let report = driver.run_all().await.context("listing tenants")?;
    for resource in &report.resources {
        match &resource.result {
            Ok(outcome) => info!(
                tenant_id = %resource.tenant_id,
                provider = resource.provider.slug(),
                resource = %resource.resource,
                pages = outcome.pages,
                upserted = outcome.upserted,
                deleted = outcome.deleted,
                complete = outcome.is_whole_fetch_complete,
                "Resource synced"
            ),
            Err(err) => error!(
                tenant_id = %resource.tenant_id,
                provider = resource.provider.slug(),
                resource = %resource.resource,
                error = %err,
                "Resource failed"
            ),
        }
    }
    info!(
        tenants = report.tenants,
        succeeded = report.succeeded(),
        failed = report.failed(),
        "Sync pass complete"
    );

    Ok(())
}
