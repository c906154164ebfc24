//! Shared DDL for synced-entity tables.
//!
//! Every provider resource lands in its own table with the same envelope:
//! a local uuid key, the owning tenant, the provider-native id (unique per
//! tenant), the mapped columns, an `extra` JSON bag for unmapped fields, and
//! the checkpoint that last wrote the row.

use sea_orm_migration::prelude::*;

/// Storage type of a mapped column.
#[derive(Debug, Clone, Copy)]
pub enum ColumnKind {
    Text,
    BigInt,
    Bool,
    Json,
}

pub async fn create_synced_table(
    manager: &SchemaManager<'_>,
    table: &str,
    columns: &[(&str, ColumnKind)],
) -> Result<(), DbErr> {
    let mut create = Table::create();
    create
        .table(Alias::new(table))
        .if_not_exists()
        .col(ColumnDef::new(Alias::new("id")).uuid().not_null().primary_key())
        .col(ColumnDef::new(Alias::new("tenant_id")).uuid().not_null())
        .col(ColumnDef::new(Alias::new("native_id")).text().not_null());

    for (name, kind) in columns {
        let mut def = ColumnDef::new(Alias::new(*name));
        match kind {
            ColumnKind::Text => def.text(),
            ColumnKind::BigInt => def.big_integer(),
            ColumnKind::Bool => def.boolean(),
            ColumnKind::Json => def.json_binary(),
        };
        create.col(def.null());
    }

    create
        .col(ColumnDef::new(Alias::new("extra")).json_binary().not_null())
        .col(ColumnDef::new(Alias::new("sync_checkpoint_id")).uuid().null())
        .col(
            ColumnDef::new(Alias::new("synced_at"))
                .timestamp_with_time_zone()
                .not_null()
                .default(Expr::current_timestamp()),
        );

    manager.create_table(create.to_owned()).await?;

    manager
        .create_index(
            Index::create()
                .name(format!("idx_{table}_tenant_native"))
                .table(Alias::new(table))
                .col(Alias::new("tenant_id"))
                .col(Alias::new("native_id"))
                .unique()
                .to_owned(),
        )
        .await
}

pub async fn drop_synced_table(manager: &SchemaManager<'_>, table: &str) -> Result<(), DbErr> {
    manager
        .drop_index(
            Index::drop()
                .name(format!("idx_{table}_tenant_native"))
                .table(Alias::new(table))
                .to_owned(),
        )
        .await?;

    manager
        .drop_table(Table::drop().table(Alias::new(table)).if_exists().to_owned())
        .await
}
