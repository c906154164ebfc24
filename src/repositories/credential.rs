//! Credential repository for database operations
//!
//! Credentials are written by the external OAuth exchange and afterwards only
//! by the refresher, one row at a time.

use anyhow::{Result, anyhow};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::credential::{self, Entity as Credential};

pub const CREDENTIAL_STATUS_ACTIVE: &str = "active";

/// Repository for credential database operations
#[derive(Debug, Clone)]
pub struct CredentialRepository {
    pub db: Arc<DatabaseConnection>,
}

impl CredentialRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Stores a new active credential
    pub async fn create(
        &self,
        tenant_id: &Uuid,
        provider_type: &str,
        owner: &str,
        token_blob: JsonValue,
    ) -> Result<credential::Model> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let model = credential::ActiveModel {
            id: Set(id),
            tenant_id: Set(*tenant_id),
            provider_type: Set(provider_type.to_string()),
            owner: Set(owner.to_string()),
            token_blob: Set(token_blob),
            status: Set(CREDENTIAL_STATUS_ACTIVE.to_string()),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };
        model.insert(&*self.db).await?;

        // For SQLite, query the record directly since we already know the ID
        Credential::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| anyhow!("credential not persisted"))
    }

    pub async fn get_by_id(&self, id: &Uuid) -> Result<Option<credential::Model>> {
        Ok(Credential::find_by_id(*id).one(&*self.db).await?)
    }

    /// Lists active credentials for a tenant/provider pair ordered by creation time then ID
    pub async fn find_active_by_tenant_and_provider(
        &self,
        tenant_id: &Uuid,
        provider_type: &str,
    ) -> Result<Vec<credential::Model>> {
        Ok(Credential::find()
            .filter(credential::Column::TenantId.eq(*tenant_id))
            .filter(credential::Column::ProviderType.eq(provider_type))
            .filter(credential::Column::Status.eq(CREDENTIAL_STATUS_ACTIVE))
            .order_by_asc(credential::Column::CreatedAt)
            .order_by_asc(credential::Column::Id)
            .all(&*self.db)
            .await?)
    }

    /// Replaces the token blob of one credential
    pub async fn update_token_blob(
        &self,
        id: &Uuid,
        token_blob: JsonValue,
    ) -> Result<credential::Model> {
        let existing = Credential::find_by_id(*id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| anyhow!("Credential '{}' not found", id))?;

        let mut model: credential::ActiveModel = existing.into();
        model.token_blob = Set(token_blob);
        model.updated_at = Set(Utc::now().into());

        Ok(model.update(&*self.db).await?)
    }
}
