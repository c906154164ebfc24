//! Tenant repository
//!
//! Reads and creates tenants. The sync driver only ever needs the active ones.

use anyhow::{Result, anyhow};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::tenant::{self, Entity as Tenant};

pub const TENANT_STATUS_ACTIVE: &str = "active";

/// Repository for tenant database operations
#[derive(Debug, Clone)]
pub struct TenantRepository {
    pub db: Arc<DatabaseConnection>,
}

impl TenantRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Creates an active tenant
    pub async fn create(&self, name: Option<&str>, domain: Option<&str>) -> Result<tenant::Model> {
        let id = Uuid::new_v4();
        let model = tenant::ActiveModel {
            id: Set(id),
            name: Set(name.map(str::to_string)),
            domain: Set(domain.map(|d| d.trim().to_lowercase())),
            status: Set(TENANT_STATUS_ACTIVE.to_string()),
            created_at: Set(Utc::now().into()),
        };
        model.insert(&*self.db).await?;

        Tenant::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| anyhow!("tenant not persisted"))
    }

    pub async fn get_by_id(&self, id: &Uuid) -> Result<Option<tenant::Model>> {
        Ok(Tenant::find_by_id(*id).one(&*self.db).await?)
    }

    /// Lists active tenants ordered by creation time then ID
    pub async fn list_active(&self) -> Result<Vec<tenant::Model>> {
        Ok(Tenant::find()
            .filter(tenant::Column::Status.eq(TENANT_STATUS_ACTIVE))
            .order_by_asc(tenant::Column::CreatedAt)
            .order_by_asc(tenant::Column::Id)
            .all(&*self.db)
            .await?)
    }

    pub async fn set_status(&self, id: &Uuid, status: &str) -> Result<tenant::Model> {
        let existing = Tenant::find_by_id(*id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| anyhow!("Tenant '{}' not found", id))?;
        let mut model: tenant::ActiveModel = existing.into();
        model.status = Set(status.to_string());
        Ok(model.update(&*self.db).await?)
    }
}
