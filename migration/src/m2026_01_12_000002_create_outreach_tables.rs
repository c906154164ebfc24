//! Migration to create the Outreach synced-entity tables.

use sea_orm_migration::prelude::*;

use crate::synced_table::{ColumnKind, create_synced_table, drop_synced_table};

use ColumnKind::{BigInt, Text};

const ACCOUNT_COLUMNS: &[(&str, ColumnKind)] = &[
    ("name", Text),
    ("natural_name", Text),
    ("company_type", Text),
    ("domain", Text),
    ("website_url", Text),
    ("created_at", Text),
    ("updated_at", Text),
];

const PROSPECT_COLUMNS: &[(&str, ColumnKind)] = &[
    ("account_id", Text),
    ("owner_id", Text),
    ("engaged_score", Text),
    ("first_name", Text),
    ("last_name", Text),
    ("middle_name", Text),
    ("occupation", Text),
    ("title", Text),
    ("open_count", BigInt),
    ("reply_count", BigInt),
    ("click_count", BigInt),
    ("engaged_at", Text),
    ("opted_out_at", Text),
    ("created_at", Text),
    ("updated_at", Text),
];

const USER_COLUMNS: &[(&str, ColumnKind)] = &[
    ("email_address", Text),
    ("first_name", Text),
    ("last_name", Text),
    ("username", Text),
];

const MAILING_COLUMNS: &[(&str, ColumnKind)] = &[
    ("prospect_id", Text),
    ("mailing_type", Text),
    ("mailbox_address", Text),
    ("subject", Text),
    ("body_text", Text),
    ("open_count", BigInt),
    ("click_count", BigInt),
    ("opened_at", Text),
    ("replied_at", Text),
    ("bounced_at", Text),
    ("marked_as_spam_at", Text),
    ("scheduled_at", Text),
    ("created_at", Text),
    ("updated_at", Text),
];

const CALL_COLUMNS: &[(&str, ColumnKind)] = &[
    ("prospect_id", Text),
    ("user_id", Text),
    ("outcome", Text),
    ("answered_at", Text),
    ("completed_at", Text),
    ("direction", Text),
    ("state", Text),
    ("record_url", Text),
    ("created_at", Text),
    ("updated_at", Text),
];

const TABLES: &[(&str, &[(&str, ColumnKind)])] = &[
    ("outreach_accounts", ACCOUNT_COLUMNS),
    ("outreach_prospects", PROSPECT_COLUMNS),
    ("outreach_users", USER_COLUMNS),
    ("outreach_mailings", MAILING_COLUMNS),
    ("outreach_calls", CALL_COLUMNS),
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
