//! Field catalog persisted from a Salesforce describe call.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "entity_descriptions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub tenant_id: Uuid,

    pub provider_type: String,

    pub entity_name: String,

    /// JSON array of `{name, type}` for non-custom fields
    #[sea_orm(column_type = "JsonBinary")]
    pub standard_fields: JsonValue,

    /// JSON array of `{name, type}` for `__c` fields
    #[sea_orm(column_type = "JsonBinary")]
    pub custom_fields: JsonValue,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
