//! Audit row for a single provider HTTP call.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "provider_api_logs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub connection_id: Uuid,

    /// Resource or endpoint label, e.g. `prospects` or `bulk:Account`
    pub resource: String,

    /// Method, url and query of the request
    #[sea_orm(column_type = "JsonBinary")]
    pub args: JsonValue,

    /// Status plus a truncated body
    #[sea_orm(column_type = "JsonBinary")]
    pub response: JsonValue,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
