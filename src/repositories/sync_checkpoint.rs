//! Checkpoint store
//!
//! Append-only history of fetch attempts per (connection, resource). Every
//! write touches a single row.

use anyhow::{Result, anyhow};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::sync_checkpoint::{self, Entity as SyncCheckpoint};
use crate::paginator::CheckpointExtra;

#[derive(Debug, Clone)]
pub struct CheckpointRepository {
    pub db: Arc<DatabaseConnection>,
}

impl CheckpointRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Most recent attempt for the pair, finished or not
    pub async fn latest(
        &self,
        connection_id: &Uuid,
        resource_name: &str,
    ) -> Result<Option<sync_checkpoint::Model>> {
        Ok(SyncCheckpoint::find()
            .filter(sync_checkpoint::Column::ConnectionId.eq(*connection_id))
            .filter(sync_checkpoint::Column::ResourceName.eq(resource_name))
            .order_by_desc(sync_checkpoint::Column::StartedAt)
            .order_by_desc(sync_checkpoint::Column::Id)
            .one(&*self.db)
            .await?)
    }

    /// Most recent attempt that walked the whole collection
    pub async fn last_completed(
        &self,
        connection_id: &Uuid,
        resource_name: &str,
    ) -> Result<Option<sync_checkpoint::Model>> {
        Ok(SyncCheckpoint::find()
            .filter(sync_checkpoint::Column::ConnectionId.eq(*connection_id))
            .filter(sync_checkpoint::Column::ResourceName.eq(resource_name))
            .filter(sync_checkpoint::Column::EndedAt.is_not_null())
            .order_by_desc(sync_checkpoint::Column::StartedAt)
            .order_by_desc(sync_checkpoint::Column::Id)
            .one(&*self.db)
            .await?)
    }

    /// Opens a new attempt
    pub async fn start(
        &self,
        tenant_id: &Uuid,
        connection_id: &Uuid,
        resource_name: &str,
        extra: &CheckpointExtra,
    ) -> Result<sync_checkpoint::Model> {
        let id = Uuid::new_v4();
        let model = sync_checkpoint::ActiveModel {
            id: Set(id),
            tenant_id: Set(*tenant_id),
            connection_id: Set(*connection_id),
            resource_name: Set(resource_name.to_string()),
            started_at: Set(Utc::now().into()),
            ended_at: Set(None),
            extra: Set(extra.to_json()),
        };
        model.insert(&*self.db).await?;

        SyncCheckpoint::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| anyhow!("checkpoint not persisted"))
    }

    /// Persists mid-attempt progress
    pub async fn record_progress(
        &self,
        id: &Uuid,
        extra: &CheckpointExtra,
    ) -> Result<sync_checkpoint::Model> {
        let existing = self.find_open(id).await?;
        let mut model: sync_checkpoint::ActiveModel = existing.into();
        model.extra = Set(extra.to_json());
        Ok(model.update(&*self.db).await?)
    }

    /// Closes the attempt; `ended_at` is written exactly once
    pub async fn finalize(
        &self,
        id: &Uuid,
        extra: &CheckpointExtra,
    ) -> Result<sync_checkpoint::Model> {
        let existing = self.find_open(id).await?;
        let mut model: sync_checkpoint::ActiveModel = existing.into();
        model.extra = Set(extra.to_json());
        model.ended_at = Set(Some(Utc::now().into()));
        Ok(model.update(&*self.db).await?)
    }

    async fn find_open(&self, id: &Uuid) -> Result<sync_checkpoint::Model> {
        let existing = SyncCheckpoint::find_by_id(*id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| anyhow!("Checkpoint '{}' not found", id))?;
        if existing.ended_at.is_some() {
            return Err(anyhow!("Checkpoint '{}' is already finalized", id));
        }
        Ok(existing)
    }
}
