//! Migration to create the Salesforce synced-entity tables.
//!
//! Bulk CSV exports carry every value as text, so columns stay text.

use sea_orm_migration::prelude::*;

use crate::synced_table::{ColumnKind, create_synced_table, drop_synced_table};

use ColumnKind::Text;

const ACCOUNT_COLUMNS: &[(&str, ColumnKind)] = &[
    ("master_record_id", Text),
    ("name", Text),
    ("type", Text),
    ("parent_id", Text),
    ("billing_street", Text),
    ("billing_city", Text),
    ("billing_state", Text),
    ("billing_postal_code", Text),
    ("billing_country", Text),
    ("phone", Text),
    ("website", Text),
    ("industry", Text),
    ("annual_revenue", Text),
    ("number_of_employees", Text),
    ("description", Text),
    ("owner_id", Text),
    ("account_source", Text),
    ("created_date", Text),
    ("created_by_id", Text),
    ("last_modified_date", Text),
    ("last_modified_by_id", Text),
    ("system_modstamp", Text),
    ("last_activity_date", Text),
];

const CONTACT_COLUMNS: &[(&str, ColumnKind)] = &[
    ("master_record_id", Text),
    ("account_id", Text),
    ("name", Text),
    ("first_name", Text),
    ("last_name", Text),
    ("salutation", Text),
    ("mailing_street", Text),
    ("mailing_city", Text),
    ("mailing_state", Text),
    ("mailing_postal_code", Text),
    ("mailing_country", Text),
    ("phone", Text),
    ("mobile_phone", Text),
    ("email", Text),
    ("title", Text),
    ("department", Text),
    ("lead_source", Text),
    ("description", Text),
    ("owner_id", Text),
    ("has_opted_out_of_email", Text),
    ("created_date", Text),
    ("created_by_id", Text),
    ("last_modified_date", Text),
    ("last_modified_by_id", Text),
    ("system_modstamp", Text),
    ("last_activity_date", Text),
];

const OPPORTUNITY_COLUMNS: &[(&str, ColumnKind)] = &[
    ("account_id", Text),
    ("record_type_id", Text),
    ("name", Text),
    ("description", Text),
    ("stage_name", Text),
    ("amount", Text),
    ("probability", Text),
    ("close_date", Text),
    ("type", Text),
    ("next_step", Text),
    ("lead_source", Text),
    ("is_closed", Text),
    ("is_won", Text),
    ("forecast_category", Text),
    ("campaign_id", Text),
    ("owner_id", Text),
    ("fiscal_quarter", Text),
    ("fiscal_year", Text),
    ("created_date", Text),
    ("created_by_id", Text),
    ("last_modified_date", Text),
    ("last_modified_by_id", Text),
    ("system_modstamp", Text),
];

const OPPORTUNITY_HISTORY_COLUMNS: &[(&str, ColumnKind)] = &[
    ("opportunity_id", Text),
    ("created_by_id", Text),
    ("created_date", Text),
    ("stage_name", Text),
    ("amount", Text),
    ("expected_revenue", Text),
    ("close_date", Text),
    ("probability", Text),
    ("forecast_category", Text),
    ("system_modstamp", Text),
];

const TABLES: &[(&str, &[(&str, ColumnKind)])] = &[
    ("salesforce_accounts", ACCOUNT_COLUMNS),
    ("salesforce_contacts", CONTACT_COLUMNS),
    ("salesforce_opportunities", OPPORTUNITY_COLUMNS),
    ("salesforce_opportunity_histories", OPPORTUNITY_HISTORY_COLUMNS),
];

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for (table, columns) in TABLES {
            create_synced_table(manager, table, columns).await?;
        }
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for (table, _) in TABLES.iter().rev() {
            drop_synced_table(manager, table).await?;
        }
        Ok(())
    }
}
