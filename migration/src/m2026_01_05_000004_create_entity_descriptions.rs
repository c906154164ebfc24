//! Migration to create the entity_descriptions table.
//!
//! Caches the provider's live field catalog per tenant and entity.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(EntityDescriptions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EntityDescriptions::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(EntityDescriptions::TenantId).uuid().not_null())
                    .col(
                        ColumnDef::new(EntityDescriptions::ProviderType)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EntityDescriptions::EntityName)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EntityDescriptions::StandardFields)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EntityDescriptions::CustomFields)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EntityDescriptions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(EntityDescriptions::UpdatedAt)
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
                    .name("idx_entity_descriptions_tenant_provider_entity")
                    .table(EntityDescriptions::Table)
                    .col(EntityDescriptions::TenantId)
                    .col(EntityDescriptions::ProviderType)
                    .col(EntityDescriptions::EntityName)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_entity_descriptions_tenant_provider_entity")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(EntityDescriptions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum EntityDescriptions {
    Table,
    Id,
    TenantId,
    ProviderType,
    EntityName,
    StandardFields,
    CustomFields,
    CreatedAt,
    UpdatedAt,
}
