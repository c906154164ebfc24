//! Credential entity model
//!
//! Stores the token blob produced by a provider OAuth exchange for one tenant
//! user. The blob is opaque JSON; see [`crate::token_refresh::TokenBlob`].

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "credentials")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub tenant_id: Uuid,

    /// Provider slug: `salesforce`, `outreach` or `google-calendar`
    pub provider_type: String,

    /// Email or user id of the person who authorised the credential
    pub owner: String,

    /// Access token, refresh token and provider extras
    #[sea_orm(column_type = "JsonBinary")]
    pub token_blob: JsonValue,

    pub status: String,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::tenant::Entity",
        from = "Column::TenantId",
        to = "super::tenant::Column::Id"
    )]
    Tenant,
}

impl Related<super::tenant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tenant.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
