//! Migration to create the provider_api_logs table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ProviderApiLogs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProviderApiLogs::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ProviderApiLogs::ConnectionId).uuid().not_null())
                    .col(ColumnDef::new(ProviderApiLogs::Resource).text().not_null())
                    .col(ColumnDef::new(ProviderApiLogs::Args).json_binary().not_null())
                    .col(ColumnDef::new(ProviderApiLogs::Response).json_binary().not_null())
                    .col(
                        ColumnDef::new(ProviderApiLogs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_provider_api_logs_connection_created")
                    .table(ProviderApiLogs::Table)
                    .col(ProviderApiLogs::ConnectionId)
                    .col(ProviderApiLogs::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_provider_api_logs_connection_created")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(ProviderApiLogs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ProviderApiLogs {
    Table,
    Id,
    ConnectionId,
    Resource,
    Args,
    Response,
    CreatedAt,
}
