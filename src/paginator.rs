//! Pagination strategies and resumable checkpoint state.
//!
//! Each provider walks its collection differently: Outreach by id ranges,
//! Salesforce by bulk queries ordered on a cursor field, Google Calendar by
//! opaque page/sync tokens. The orchestrator drives all three through the
//! [`Paginator`] trait and persists their state as [`CheckpointExtra`].

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Upper bound of the Outreach id range filter.
pub const ID_RANGE_UPPER_BOUND: i64 = 99_999_999;

/// A raw provider row: JSON attributes or a CSV record keyed by header.
pub type Row = Map<String, JsonValue>;

/// Pagination position. Outreach ids are numeric, Salesforce ids are text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Offset {
    Numeric(i64),
    Text(String),
}

impl Offset {
    pub fn from_json(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::Number(n) => n.as_i64().map(Offset::Numeric),
            JsonValue::String(s) if !s.is_empty() => Some(Offset::Text(s.clone())),
            _ => None,
        }
    }

    /// Numeric reading of the offset; text offsets holding digits also count.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Offset::Numeric(n) => Some(*n),
            Offset::Text(s) => s.parse().ok(),
        }
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Offset::Numeric(n) => write!(f, "{n}"),
            Offset::Text(s) => f.write_str(s),
        }
    }
}

/// Comparison used against the cursor field when a pass starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    Gte,
    Gt,
}

impl Comparison {
    pub fn as_sql(self) -> &'static str {
        match self {
            Comparison::Gte => ">=",
            Comparison::Gt => ">",
        }
    }

    pub fn is_inclusive(self) -> bool {
        matches!(self, Comparison::Gte)
    }
}

/// JSON payload stored in `sync_checkpoints.extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointExtra {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_offset: Option<Offset>,
    #[serde(default = "default_start_inclusive")]
    pub start_inclusive: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_offset_check_point: Option<Offset>,
    pub batch_size: u64,
    #[serde(default)]
    pub is_whole_fetch_complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_token: Option<String>,
    #[serde(default)]
    pub initial_fetch: bool,
}

fn default_start_inclusive() -> bool {
    true
}

impl CheckpointExtra {
    /// State for a new attempt starting at `resume`.
    pub fn starting_at(resume: &ResumePoint, batch_size: u64) -> Self {
        Self {
            start_offset: resume.offset.clone(),
            start_inclusive: resume.comparison.is_inclusive(),
            last_offset_check_point: None,
            batch_size,
            is_whole_fetch_complete: false,
            sync_token: resume.sync_token.clone(),
            page_token: resume.page_token.clone(),
            initial_fetch: resume.sync_token.is_none(),
        }
    }

    pub fn from_json(value: &JsonValue) -> serde_json::Result<Self> {
        serde_json::from_value(value.clone())
    }

    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }
}

/// Where the next attempt of a resource begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumePoint {
    pub offset: Option<Offset>,
    pub comparison: Comparison,
    pub sync_token: Option<String>,
    pub page_token: Option<String>,
}

impl ResumePoint {
    pub fn from_zero() -> Self {
        Self {
            offset: None,
            comparison: Comparison::Gte,
            sync_token: None,
            page_token: None,
        }
    }

    /// Derives the resume point from the latest prior checkpoint.
    ///
    /// A completed pass resumes strictly after its last record; an interrupted
    /// one resumes at its last record so nothing in between is skipped. An
    /// attempt that recorded no progress is retried from its own start.
    pub fn from_checkpoint(previous: Option<&CheckpointExtra>) -> Self {
        let Some(prev) = previous else {
            return Self::from_zero();
        };

        let start_comparison = if prev.start_inclusive {
            Comparison::Gte
        } else {
            Comparison::Gt
        };

        let (offset, comparison) = match (&prev.last_offset_check_point, prev.is_whole_fetch_complete)
        {
            (Some(last), true) => (Some(last.clone()), Comparison::Gt),
            (Some(last), false) => (Some(last.clone()), Comparison::Gte),
            (None, _) => (prev.start_offset.clone(), start_comparison),
        };

        let page_token = if prev.is_whole_fetch_complete {
            None
        } else {
            prev.page_token.clone()
        };

        Self {
            offset,
            comparison,
            sync_token: prev.sync_token.clone(),
            page_token,
        }
    }
}

/// Parameters for the next page request, one shape per strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageRequest {
    IdRange {
        from: i64,
        to: i64,
        limit: u64,
    },
    BulkQuery {
        cursor_field: &'static str,
        comparison: Comparison,
        value: Option<Offset>,
        limit: u64,
    },
    Delta {
        sync_token: Option<String>,
        page_token: Option<String>,
        initial: bool,
    },
}

impl PageRequest {
    /// Query string pairs for the id-range strategy; empty for the others.
    pub fn query_params(&self) -> Vec<(String, String)> {
        match self {
            PageRequest::IdRange { from, to, limit } => vec![
                ("filter[id]".to_string(), format!("{from}..{to}")),
                ("page[limit]".to_string(), limit.to_string()),
                ("sort".to_string(), "id".to_string()),
            ],
            _ => Vec::new(),
        }
    }
}

/// One fetched page in provider-neutral form.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub rows: Vec<Row>,
    /// `metadata.count` of a JSON:API response
    pub total_count: Option<i64>,
    pub next_page_token: Option<String>,
    pub next_sync_token: Option<String>,
}

/// Token state a strategy wants persisted alongside the offset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Progress {
    pub sync_token: Option<String>,
    pub page_token: Option<String>,
}

impl Progress {
    pub fn apply(&self, extra: &mut CheckpointExtra) {
        if self.sync_token.is_some() {
            extra.sync_token = self.sync_token.clone();
        }
        extra.page_token = self.page_token.clone();
    }
}

/// A resumable walk over one remote collection.
pub trait Paginator: Send {
    fn request(&self) -> PageRequest;

    /// Moves past `page`; `last_seen` is the cursor value of its last row.
    fn advance(&mut self, page: &Page, last_seen: Option<&Offset>);

    fn is_exhausted(&self, page: &Page, batch_size: u64) -> bool;

    /// Whether finishing on `page` means the whole collection was walked.
    fn completes_full_pass(&self, page: &Page, batch_size: u64) -> bool {
        (page.rows.len() as u64) < batch_size
    }

    fn progress(&self) -> Progress {
        Progress::default()
    }
}

/// Offset plus id-range filter over a JSON:API collection.
#[derive(Debug, Clone)]
pub struct OffsetRangePaginator {
    offset: i64,
    limit: u64,
}

impl OffsetRangePaginator {
    pub fn new(resume: &ResumePoint, limit: u64) -> Self {
        let offset = match resume.offset.as_ref().and_then(Offset::as_i64) {
            Some(k) if resume.comparison == Comparison::Gt => k.saturating_add(1),
            Some(k) => k,
            None => 0,
        };
        Self { offset, limit }
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }
}

impl Paginator for OffsetRangePaginator {
    fn request(&self) -> PageRequest {
        PageRequest::IdRange {
            from: self.offset,
            to: ID_RANGE_UPPER_BOUND,
            limit: self.limit,
        }
    }

    fn advance(&mut self, _page: &Page, last_seen: Option<&Offset>) {
        let by_limit = self.offset.saturating_add(self.limit as i64);
        let past_last = last_seen
            .and_then(Offset::as_i64)
            .map(|id| id.saturating_add(1))
            .unwrap_or(by_limit);
        self.offset = by_limit.max(past_last);
    }

    fn is_exhausted(&self, page: &Page, _batch_size: u64) -> bool {
        matches!(page.total_count, None | Some(0))
    }
}

/// Cursor-field filtered bulk queries (`WHERE field > value ORDER BY field LIMIT n`).
#[derive(Debug, Clone)]
pub struct BulkQueryPaginator {
    cursor_field: &'static str,
    comparison: Comparison,
    value: Option<Offset>,
    limit: u64,
}

impl BulkQueryPaginator {
    pub fn new(cursor_field: &'static str, resume: &ResumePoint, limit: u64) -> Self {
        Self {
            cursor_field,
            comparison: resume.comparison,
            value: resume.offset.clone(),
            limit,
        }
    }
}

impl Paginator for BulkQueryPaginator {
    fn request(&self) -> PageRequest {
        PageRequest::BulkQuery {
            cursor_field: self.cursor_field,
            comparison: self.comparison,
            value: self.value.clone(),
            limit: self.limit,
        }
    }

    fn advance(&mut self, _page: &Page, last_seen: Option<&Offset>) {
        if let Some(last) = last_seen {
            self.value = Some(last.clone());
            self.comparison = Comparison::Gt;
        }
    }

    fn is_exhausted(&self, page: &Page, batch_size: u64) -> bool {
        (page.rows.len() as u64) < batch_size
    }
}

/// Page-token chaining within one sync-token version.
#[derive(Debug, Clone)]
pub struct DeltaTokenPaginator {
    sync_token: Option<String>,
    page_token: Option<String>,
    next_sync_token: Option<String>,
    initial: bool,
}

impl DeltaTokenPaginator {
    pub fn new(resume: &ResumePoint) -> Self {
        Self {
            sync_token: resume.sync_token.clone(),
            page_token: resume.page_token.clone(),
            next_sync_token: None,
            initial: resume.sync_token.is_none(),
        }
    }
}

impl Paginator for DeltaTokenPaginator {
    fn request(&self) -> PageRequest {
        PageRequest::Delta {
            sync_token: self.sync_token.clone(),
            page_token: self.page_token.clone(),
            initial: self.initial,
        }
    }

    fn advance(&mut self, page: &Page, _last_seen: Option<&Offset>) {
        self.page_token = page.next_page_token.clone();
        if page.next_sync_token.is_some() {
            self.next_sync_token = page.next_sync_token.clone();
        }
    }

    fn is_exhausted(&self, page: &Page, _batch_size: u64) -> bool {
        page.next_page_token.is_none()
    }

    fn completes_full_pass(&self, page: &Page, _batch_size: u64) -> bool {
        page.next_sync_token.is_some()
    }

    fn progress(&self) -> Progress {
        Progress {
            sync_token: self.next_sync_token.clone(),
            page_token: self.page_token.clone(),
        }
    }
}
