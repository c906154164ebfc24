//! Sync orchestrator
//!
//! Drives one resource through describe → resume → page loop → finalize.
//! Every attempt opens its own checkpoint row; progress is written at the end
//! of each page and, with a small probability, after individual rows, always
//! after the buffered upserts are flushed. An attempt that fails leaves its
//! checkpoint open and the next run resumes from it.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use rand::{Rng, thread_rng};
use sea_orm::DatabaseConnection;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::connectors::{FieldCatalog, Provider, SyncTarget};
use crate::entity_store::EntityStore;
use crate::error::SyncError;
use crate::fetch::FetchClient;
use crate::mapper::map_row;
use crate::paginator::{CheckpointExtra, Offset, ResumePoint};
use crate::repositories::{CheckpointRepository, EntityDescriptionRepository};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    NotStarted,
    DescribingSchema,
    FetchingPage,
    MappingAndStoring,
    Checkpointing,
    Finalized,
    Aborted,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncState::NotStarted => "not_started",
            SyncState::DescribingSchema => "describing_schema",
            SyncState::FetchingPage => "fetching_page",
            SyncState::MappingAndStoring => "mapping_and_storing",
            SyncState::Checkpointing => "checkpointing",
            SyncState::Finalized => "finalized",
            SyncState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Result of one finished resource attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub resource: String,
    pub checkpoint_id: Uuid,
    pub pages: u64,
    pub upserted: u64,
    pub deleted: u64,
    pub skipped: u64,
    pub is_whole_fetch_complete: bool,
}

pub struct ResourceSync {
    db: Arc<DatabaseConnection>,
    provider: Arc<dyn Provider>,
    tenant_id: Uuid,
    batch_size: u64,
    checkpoint_probability: f64,
    checkpoints: CheckpointRepository,
    descriptions: EntityDescriptionRepository,
    state: SyncState,
}

impl ResourceSync {
    pub fn new(
        db: Arc<DatabaseConnection>,
        provider: Arc<dyn Provider>,
        tenant_id: Uuid,
        sync: &SyncConfig,
    ) -> Self {
        Self {
            checkpoints: CheckpointRepository::new(db.clone()),
            descriptions: EntityDescriptionRepository::new(db.clone()),
            db,
            provider,
            tenant_id,
            batch_size: sync.batch_size,
            checkpoint_probability: sync.checkpoint_probability,
            state: SyncState::NotStarted,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    fn transition(&mut self, next: SyncState) {
        if self.state != next {
            debug!(from = %self.state, to = %next, "Sync state transition");
            self.state = next;
        }
    }

    #[instrument(
        skip_all,
        fields(
            tenant_id = %self.tenant_id,
            provider = self.provider.kind().slug(),
            resource = %target.resource_name
        )
    )]
    pub async fn run(
        &mut self,
        client: &mut FetchClient,
        target: &SyncTarget,
    ) -> Result<SyncOutcome, SyncError> {
        let started = Instant::now();
        self.state = SyncState::NotStarted;

        let result = self.run_inner(client, target).await;

        let provider = self.provider.kind().slug();
        histogram!("sync_resource_duration_ms", "provider" => provider)
            .record(started.elapsed().as_millis() as f64);
        match &result {
            Ok(outcome) => {
                self.transition(SyncState::Finalized);
                info!(
                    pages = outcome.pages,
                    upserted = outcome.upserted,
                    deleted = outcome.deleted,
                    skipped = outcome.skipped,
                    complete = outcome.is_whole_fetch_complete,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Resource sync finished"
                );
            }
            Err(err) => {
                self.transition(SyncState::Aborted);
                warn!(error = %err, kind = err.kind(), "Resource sync aborted");
            }
        }
        result
    }

    async fn run_inner(
        &mut self,
        client: &mut FetchClient,
        target: &SyncTarget,
    ) -> Result<SyncOutcome, SyncError> {
        self.transition(SyncState::DescribingSchema);
        let catalog = self.provider.describe(client, target).await?;
        if let Some(catalog) = &catalog {
            self.descriptions
                .upsert(
                    &self.tenant_id,
                    self.provider.kind().slug(),
                    target.spec.remote_name,
                    catalog.standard_json(),
                    catalog.custom_json(),
                )
                .await?;
        }

        let resume = self.resume_point(&client.credential().id, target).await?;

        match self.walk(client, target, catalog.as_ref(), &resume).await {
            Err(SyncError::SyncTokenInvalidated) => {
                counter!("sync_token_invalidated_total", "provider" => self.provider.kind().slug())
                    .increment(1);
                warn!("Sync token invalidated; restarting from zero state");
                self.walk(client, target, catalog.as_ref(), &ResumePoint::from_zero())
                    .await
            }
            other => other,
        }
    }

    async fn resume_point(
        &self,
        connection_id: &Uuid,
        target: &SyncTarget,
    ) -> Result<ResumePoint, SyncError> {
        let Some(previous) = self
            .checkpoints
            .latest(connection_id, &target.resource_name)
            .await?
        else {
            return Ok(ResumePoint::from_zero());
        };

        match CheckpointExtra::from_json(&previous.extra) {
            Ok(extra) => Ok(ResumePoint::from_checkpoint(Some(&extra))),
            Err(err) => {
                warn!(
                    checkpoint_id = %previous.id,
                    error = %err,
                    "Unreadable checkpoint state; starting from zero"
                );
                Ok(ResumePoint::from_zero())
            }
        }
    }

    async fn walk(
        &mut self,
        client: &mut FetchClient,
        target: &SyncTarget,
        catalog: Option<&FieldCatalog>,
        resume: &ResumePoint,
    ) -> Result<SyncOutcome, SyncError> {
        let provider = self.provider.kind().slug();
        let connection_id = client.credential().id;

        let mut extra = CheckpointExtra::starting_at(resume, self.batch_size);
        let checkpoint = self
            .checkpoints
            .start(&self.tenant_id, &connection_id, &target.resource_name, &extra)
            .await?;
        debug!(
            checkpoint_id = %checkpoint.id,
            offset = ?resume.offset,
            comparison = ?resume.comparison,
            "Opened checkpoint"
        );

        let mut paginator = self.provider.paginator(target, resume, self.batch_size);
        let mut store = EntityStore::new(
            self.db.clone(),
            target.spec,
            self.tenant_id,
            Some(checkpoint.id),
            self.batch_size as usize,
        );
        let mut pages = 0u64;
        let mut skipped = 0u64;
        let mut last_seen: Option<Offset> = None;

        loop {
            self.transition(SyncState::FetchingPage);
            let request = paginator.request();
            let page = self
                .provider
                .fetch_page(client, target, catalog, &request)
                .await?;
            pages += 1;
            counter!("sync_pages_fetched_total", "provider" => provider).increment(1);

            self.transition(SyncState::MappingAndStoring);
            let mut page_last: Option<Offset> = None;
            for row in &page.rows {
                if let Some(cursor) = target.spec.cursor_field
                    && let Some(offset) = row.get(cursor).and_then(Offset::from_json)
                {
                    page_last = Some(offset);
                }

                match map_row(target.spec, row) {
                    Ok(op) => store.apply(op).await?,
                    Err(err) => {
                        skipped += 1;
                        warn!(error = %err, "Skipping unmappable row");
                    }
                }

                if let Some(offset) = &page_last
                    && thread_rng().gen_bool(self.checkpoint_probability)
                {
                    self.transition(SyncState::Checkpointing);
                    store.flush().await?;
                    extra.last_offset_check_point = Some(offset.clone());
                    self.checkpoints
                        .record_progress(&checkpoint.id, &extra)
                        .await?;
                    self.transition(SyncState::MappingAndStoring);
                }
            }

            self.transition(SyncState::Checkpointing);
            store.flush().await?;
            if page_last.is_some() {
                last_seen = page_last;
            }

            let exhausted = paginator.is_exhausted(&page, self.batch_size);
            let complete = paginator.completes_full_pass(&page, self.batch_size);
            paginator.advance(&page, last_seen.as_ref());
            paginator.progress().apply(&mut extra);
            if last_seen.is_some() {
                extra.last_offset_check_point = last_seen.clone();
            }

            if exhausted {
                extra.is_whole_fetch_complete = complete;
                self.checkpoints.finalize(&checkpoint.id, &extra).await?;
                break;
            }
            self.checkpoints
                .record_progress(&checkpoint.id, &extra)
                .await?;
        }

        counter!("sync_records_upserted_total", "provider" => provider)
            .increment(store.upserted());
        counter!("sync_records_deleted_total", "provider" => provider)
            .increment(store.deleted());

        Ok(SyncOutcome {
            resource: target.resource_name.clone(),
            checkpoint_id: checkpoint.id,
            pages,
            upserted: store.upserted(),
            deleted: store.deleted(),
            skipped,
            is_whole_fetch_complete: extra.is_whole_fetch_complete,
        })
    }
}
