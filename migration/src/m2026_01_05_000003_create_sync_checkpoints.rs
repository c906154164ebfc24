//! Migration to create the sync_checkpoints table.
//!
//! One row per fetch attempt of a (credential, resource) pair. Rows are never
//! deleted; the latest row decides where the next attempt resumes.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SyncCheckpoints::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SyncCheckpoints::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SyncCheckpoints::TenantId).uuid().not_null())
                    .col(
                        ColumnDef::new(SyncCheckpoints::ConnectionId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SyncCheckpoints::ResourceName)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SyncCheckpoints::StartedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SyncCheckpoints::EndedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(SyncCheckpoints::Extra).json_binary().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_sync_checkpoints_connection_id")
                            .from(SyncCheckpoints::Table, SyncCheckpoints::ConnectionId)
                            .to(Credentials::Table, Credentials::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_sync_checkpoints_connection_resource_started")
                    .table(SyncCheckpoints::Table)
                    .col(SyncCheckpoints::ConnectionId)
                    .col(SyncCheckpoints::ResourceName)
                    .col(SyncCheckpoints::StartedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_sync_checkpoints_connection_resource_started")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(SyncCheckpoints::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SyncCheckpoints {
    Table,
    Id,
    TenantId,
    ConnectionId,
    ResourceName,
    StartedAt,
    EndedAt,
    Extra,
}

#[derive(DeriveIden)]
enum Credentials {
    Table,
    Id,
}
