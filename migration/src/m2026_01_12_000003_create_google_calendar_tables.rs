//! Migration to create the Google Calendar synced-entity tables.

use sea_orm_migration::prelude::*;

use crate::synced_table::{ColumnKind, create_synced_table, drop_synced_table};

use ColumnKind::{Bool, Json, Text};

const CALENDAR_COLUMNS: &[(&str, ColumnKind)] = &[
    ("summary", Text),
    ("summary_override", Text),
    ("description", Text),
    ("location", Text),
    ("time_zone", Text),
    ("access_role", Text),
    ("is_primary", Bool),
    ("hidden", Bool),
    ("sync_user", Text),
    ("sync_connection_id", Text),
];

const EVENT_COLUMNS: &[(&str, ColumnKind)] = &[
    ("calendar_id", Text),
    ("summary", Text),
    ("description", Text),
    ("status", Text),
    ("html_link", Text),
    ("recurring_event_id", Text),
    ("start_time", Json),
    ("end_time", Json),
    ("attendees", Json),
    ("creator", Json),
    ("organizer", Json),
    ("created", Text),
    ("updated", Text),
];

const TABLES: &[(&str, &[(&str, ColumnKind)])] = &[
    ("google_calendars", CALENDAR_COLUMNS),
    ("google_calendar_events", EVENT_COLUMNS),
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
