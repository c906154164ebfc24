//! Append-only trace of outbound provider calls.

use anyhow::Result;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::provider_api_log::{self, Entity as ProviderApiLog};

#[derive(Debug, Clone)]
pub struct ApiLogRepository {
    pub db: Arc<DatabaseConnection>,
}

impl ApiLogRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn record(
        &self,
        connection_id: &Uuid,
        resource: &str,
        args: JsonValue,
        response: JsonValue,
    ) -> Result<()> {
        let model = provider_api_log::ActiveModel {
            id: Set(Uuid::new_v4()),
            connection_id: Set(*connection_id),
            resource: Set(resource.to_string()),
            args: Set(args),
            response: Set(response),
            created_at: Set(Utc::now().into()),
        };
        model.insert(&*self.db).await?;
        Ok(())
    }

    pub async fn list_by_connection(
        &self,
        connection_id: &Uuid,
    ) -> Result<Vec<provider_api_log::Model>> {
        Ok(ProviderApiLog::find()
            .filter(provider_api_log::Column::ConnectionId.eq(*connection_id))
            .order_by_asc(provider_api_log::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    pub async fn count_by_connection(&self, connection_id: &Uuid) -> Result<u64> {
        Ok(ProviderApiLog::find()
            .filter(provider_api_log::Column::ConnectionId.eq(*connection_id))
            .count(&*self.db)
            .await?)
    }
}
