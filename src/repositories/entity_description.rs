//! Cached provider field catalogs (`entity_descriptions`).

use anyhow::{Result, anyhow};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::is_unique_violation;
use crate::models::entity_description::{self, Entity as EntityDescription};

#[derive(Debug, Clone)]
pub struct EntityDescriptionRepository {
    pub db: Arc<DatabaseConnection>,
}

impl EntityDescriptionRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn find(
        &self,
        tenant_id: &Uuid,
        provider_type: &str,
        entity_name: &str,
    ) -> Result<Option<entity_description::Model>> {
        Ok(EntityDescription::find()
            .filter(entity_description::Column::TenantId.eq(*tenant_id))
            .filter(entity_description::Column::ProviderType.eq(provider_type))
            .filter(entity_description::Column::EntityName.eq(entity_name))
            .one(&*self.db)
            .await?)
    }

    /// Inserts or replaces the catalog for one (tenant, provider, entity)
    pub async fn upsert(
        &self,
        tenant_id: &Uuid,
        provider_type: &str,
        entity_name: &str,
        standard_fields: JsonValue,
        custom_fields: JsonValue,
    ) -> Result<entity_description::Model> {
        if let Some(existing) = self.find(tenant_id, provider_type, entity_name).await? {
            return self
                .replace_fields(existing, standard_fields, custom_fields)
                .await;
        }

        let now = Utc::now();
        let id = Uuid::new_v4();
        let model = entity_description::ActiveModel {
            id: Set(id),
            tenant_id: Set(*tenant_id),
            provider_type: Set(provider_type.to_string()),
            entity_name: Set(entity_name.to_string()),
            standard_fields: Set(standard_fields.clone()),
            custom_fields: Set(custom_fields.clone()),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        match model.insert(&*self.db).await {
            Ok(_) => EntityDescription::find_by_id(id)
                .one(&*self.db)
                .await?
                .ok_or_else(|| anyhow!("entity description not persisted")),
            // A concurrent run inserted the same catalog first.
            Err(err) if is_unique_violation(&err) => {
                let existing = self
                    .find(tenant_id, provider_type, entity_name)
                    .await?
                    .ok_or_else(|| anyhow!("entity description vanished after conflict"))?;
                self.replace_fields(existing, standard_fields, custom_fields)
                    .await
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn replace_fields(
        &self,
        existing: entity_description::Model,
        standard_fields: JsonValue,
        custom_fields: JsonValue,
    ) -> Result<entity_description::Model> {
        let mut model: entity_description::ActiveModel = existing.into();
        model.standard_fields = Set(standard_fields);
        model.custom_fields = Set(custom_fields);
        model.updated_at = Set(Utc::now().into());
        Ok(model.update(&*self.db).await?)
    }
}
