//! Entity store
//!
//! Applies mapped records to a resource's synced table. Upserts are buffered
//! per store instance and written as multi-row
//! `INSERT … ON CONFLICT (tenant_id, native_id) DO UPDATE` statements; tombstones are
//! applied immediately. Both operations are idempotent, so replaying a page
//! after an interrupted attempt leaves the table unchanged.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::{Alias, Expr, InsertStatement, OnConflict, Query, SimpleExpr, Value};
use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseConnection, DbErr, QueryResult};
use tracing::debug;
use uuid::Uuid;

use crate::error::SyncError;
use crate::mapper::{ColumnValue, NormalizedRecord, RecordOp, ResourceSpec};

const KEY_COLUMNS: [&str; 3] = ["id", "tenant_id", "native_id"];
const TRAILING_COLUMNS: [&str; 3] = ["extra", "sync_checkpoint_id", "synced_at"];

// SQLite builds since 3.32 allow 32766 host parameters; Postgres and MySQL 65535.
const SQLITE_MAX_BINDS: usize = 32_766;
const SERVER_MAX_BINDS: usize = 65_535;

fn rows_per_statement(backend: DatabaseBackend, columns: usize) -> usize {
    let max_binds = match backend {
        DatabaseBackend::Sqlite => SQLITE_MAX_BINDS,
        _ => SERVER_MAX_BINDS,
    };
    (max_binds / columns.max(1)).max(1)
}

/// Pending upserts, deduplicated by native id (last write wins).
#[derive(Debug, Default)]
pub struct UpsertBuffer {
    records: Vec<NormalizedRecord>,
    positions: HashMap<String, usize>,
}

impl UpsertBuffer {
    pub fn push(&mut self, record: NormalizedRecord) {
        match self.positions.get(&record.native_id) {
            Some(&idx) => self.records[idx] = record,
            None => {
                self.positions
                    .insert(record.native_id.clone(), self.records.len());
                self.records.push(record);
            }
        }
    }

    /// Drops a pending upsert; returns whether one was buffered.
    pub fn remove(&mut self, native_id: &str) -> bool {
        if self.positions.remove(native_id).is_none() {
            return false;
        }
        self.records.retain(|r| r.native_id != native_id);
        self.positions = self
            .records
            .iter()
            .enumerate()
            .map(|(idx, r)| (r.native_id.clone(), idx))
            .collect();
        true
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn take(&mut self) -> Vec<NormalizedRecord> {
        self.positions.clear();
        std::mem::take(&mut self.records)
    }
}

/// Writes one resource's records for one tenant.
pub struct EntityStore {
    db: Arc<DatabaseConnection>,
    spec: &'static ResourceSpec,
    tenant_id: Uuid,
    checkpoint_id: Option<Uuid>,
    batch_size: usize,
    buffer: UpsertBuffer,
    upserted: u64,
    deleted: u64,
}

impl EntityStore {
    pub fn new(
        db: Arc<DatabaseConnection>,
        spec: &'static ResourceSpec,
        tenant_id: Uuid,
        checkpoint_id: Option<Uuid>,
        batch_size: usize,
    ) -> Self {
        Self {
            db,
            spec,
            tenant_id,
            checkpoint_id,
            batch_size: batch_size.max(1),
            buffer: UpsertBuffer::default(),
            upserted: 0,
            deleted: 0,
        }
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Rows written by flushes so far
    pub fn upserted(&self) -> u64 {
        self.upserted
    }

    /// Tombstones applied so far
    pub fn deleted(&self) -> u64 {
        self.deleted
    }

    pub async fn apply(&mut self, op: RecordOp) -> Result<(), SyncError> {
        match op {
            RecordOp::Upsert(record) => {
                self.buffer.push(record);
                if self.buffer.len() >= self.batch_size {
                    self.flush().await?;
                }
            }
            RecordOp::Delete { native_id } => {
                self.buffer.remove(&native_id);
                self.delete(&native_id).await?;
                self.deleted += 1;
            }
        }
        Ok(())
    }

    /// Writes every buffered upsert; returns the number of rows sent.
    ///
    /// Rows are split across statements so no statement exceeds the
    /// backend's bind parameter limit.
    pub async fn flush(&mut self) -> Result<u64, SyncError> {
        if self.buffer.is_empty() {
            return Ok(0);
        }
        let records = self.buffer.take();
        let count = records.len() as u64;

        let backend = self.db.get_database_backend();
        let rows_per_statement = rows_per_statement(backend, self.column_count());
        let now = Utc::now();

        let mut statements = 0usize;
        let mut remaining = records.into_iter().peekable();
        while remaining.peek().is_some() {
            let chunk: Vec<NormalizedRecord> =
                remaining.by_ref().take(rows_per_statement).collect();
            let insert = self.upsert_statement(chunk, now)?;
            self.db.execute(backend.build(&insert)).await?;
            statements += 1;
        }

        self.upserted += count;
        debug!(
            table = self.spec.table,
            tenant_id = %self.tenant_id,
            rows = count,
            statements,
            "Flushed upsert batch"
        );
        Ok(count)
    }

    fn column_count(&self) -> usize {
        KEY_COLUMNS.len() + self.spec.fields.len() + TRAILING_COLUMNS.len()
    }

    fn upsert_statement(
        &self,
        records: Vec<NormalizedRecord>,
        now: chrono::DateTime<Utc>,
    ) -> Result<InsertStatement, SyncError> {
        let columns = KEY_COLUMNS
            .iter()
            .copied()
            .chain(self.spec.fields.iter().map(|f| f.column))
            .chain(TRAILING_COLUMNS.iter().copied())
            .map(Alias::new);
        let updates = self
            .spec
            .fields
            .iter()
            .map(|f| f.column)
            .chain(TRAILING_COLUMNS.iter().copied())
            .map(Alias::new);

        let mut insert = Query::insert();
        insert.into_table(Alias::new(self.spec.table)).columns(columns);
        for record in records {
            insert
                .values(self.row_values(record, now))
                .map_err(|e| DbErr::Custom(format!("invalid upsert row: {e}")))?;
        }
        insert.on_conflict(
            OnConflict::columns([Alias::new("tenant_id"), Alias::new("native_id")])
                .update_columns(updates)
                .to_owned(),
        );
        Ok(insert)
    }

    fn row_values(
        &self,
        record: NormalizedRecord,
        now: chrono::DateTime<Utc>,
    ) -> Vec<SimpleExpr> {
        let mut values: Vec<SimpleExpr> = vec![
            Uuid::new_v4().into(),
            self.tenant_id.into(),
            record.native_id.clone().into(),
        ];
        for field in self.spec.fields {
            let value = record
                .value(field.column)
                .cloned()
                .map(column_value)
                .unwrap_or(Value::String(None));
            values.push(value.into());
        }
        values.push(serde_json::Value::Object(record.extra).into());
        values.push(self.checkpoint_id.into());
        values.push(now.into());
        values
    }

    async fn delete(&self, native_id: &str) -> Result<u64, SyncError> {
        let stmt = Query::delete()
            .from_table(Alias::new(self.spec.table))
            .and_where(Expr::col(Alias::new("tenant_id")).eq(self.tenant_id))
            .and_where(Expr::col(Alias::new("native_id")).eq(native_id))
            .to_owned();
        let backend = self.db.get_database_backend();
        let result = self.db.execute(backend.build(&stmt)).await?;
        Ok(result.rows_affected())
    }

    /// Number of stored rows for this tenant
    pub async fn count(&self) -> Result<u64, SyncError> {
        let stmt = Query::select()
            .expr_as(Expr::cust("COUNT(*)"), Alias::new("row_count"))
            .from(Alias::new(self.spec.table))
            .and_where(Expr::col(Alias::new("tenant_id")).eq(self.tenant_id))
            .to_owned();
        let backend = self.db.get_database_backend();
        let row = self.db.query_one(backend.build(&stmt)).await?;
        let count = match row {
            Some(row) => row.try_get::<i64>("", "row_count")?,
            None => 0,
        };
        Ok(count.max(0) as u64)
    }

    /// The stored row for one native id
    pub async fn find_row(&self, native_id: &str) -> Result<Option<QueryResult>, SyncError> {
        let stmt = Query::select()
            .expr(Expr::cust("*"))
            .from(Alias::new(self.spec.table))
            .and_where(Expr::col(Alias::new("tenant_id")).eq(self.tenant_id))
            .and_where(Expr::col(Alias::new("native_id")).eq(native_id))
            .to_owned();
        let backend = self.db.get_database_backend();
        Ok(self.db.query_one(backend.build(&stmt)).await?)
    }
}

fn column_value(value: ColumnValue) -> Value {
    match value {
        ColumnValue::Text(v) => v.into(),
        ColumnValue::Integer(v) => v.into(),
        ColumnValue::Boolean(v) => v.into(),
        ColumnValue::Json(v) => v.into(),
    }
}
