//! Database migrations for the CRM sync engine.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2026_01_05_000001_create_tenants;
mod m2026_01_05_000002_create_credentials;
mod m2026_01_05_000003_create_sync_checkpoints;
mod m2026_01_05_000004_create_entity_descriptions;
mod m2026_01_05_000005_create_provider_api_logs;
mod m2026_01_12_000001_create_salesforce_tables;
mod m2026_01_12_000002_create_outreach_tables;
mod m2026_01_12_000003_create_google_calendar_tables;
mod synced_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2026_01_05_000001_create_tenants::Migration),
            Box::new(m2026_01_05_000002_create_credentials::Migration),
            Box::new(m2026_01_05_000003_create_sync_checkpoints::Migration),
            Box::new(m2026_01_05_000004_create_entity_descriptions::Migration),
            Box::new(m2026_01_05_000005_create_provider_api_logs::Migration),
            Box::new(m2026_01_12_000001_create_salesforce_tables::Migration),
            Box::new(m2026_01_12_000002_create_outreach_tables::Migration),
            Box::new(m2026_01_12_000003_create_google_calendar_tables::Migration),
        ]
    }
}
