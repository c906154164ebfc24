//! Google Calendar adapter
//!
//! The calendar list and each kept calendar's events are walked with page
//! tokens inside one sync-token version. The final page of a pass carries
//! `nextSyncToken`, which seeds the next incremental run; a 410 from the
//! API invalidates it.

use async_trait::async_trait;
use sea_orm::sea_query::{Alias, Expr, Order, Query};
use sea_orm::{ConnectionTrait, FromQueryResult};
use serde_json::Value as JsonValue;
use tracing::debug;
use url::Url;

use crate::config::{OAuthClientConfig, SyncConfig};
use crate::connectors::trait_::{FieldCatalog, Provider, SyncTarget, TargetContext};
use crate::error::SyncError;
use crate::fetch::{FetchClient, FetchRequest};
use crate::mapper::{GOOGLE_CALENDAR_EVENTS, GOOGLE_CALENDAR_LIST, ProviderKind, ResourceSpec};
use crate::paginator::{DeltaTokenPaginator, Page, PageRequest, Paginator, ResumePoint, Row};

const CALENDAR_LIST_FIELDS: &str = "items(accessRole,deleted,description,hidden,id,location,primary,summary,summaryOverride,timeZone),nextPageToken,nextSyncToken";

const EVENT_FIELDS: &str = "items(attendees(additionalGuests,displayName,email,id,optional,resource,responseStatus),created,creator(displayName,email),description,end,htmlLink,id,organizer(displayName,email),recurringEventId,start,status,summary,updated),nextPageToken,nextSyncToken,timeZone";

/// Lower bound for events on a pass without a sync token.
pub const INITIAL_TIME_MIN: &str = "2015-01-01T00:00:00+00:00";

const CALENDAR_LIST_MAX_RESULTS: u64 = 250;
const CALENDAR_LIST_ATTEMPTS: u32 = 3;
const EVENTS_MAX_RESULTS: u64 = 2_500;

/// Access role Google reports for calendars shared as free/busy only.
const FREE_BUSY_READER: &str = "freeBusyReader";

pub struct GoogleCalendarProvider {
    oauth: OAuthClientConfig,
    batch_size: u64,
}

#[derive(Debug, FromQueryResult)]
struct StoredCalendar {
    native_id: String,
    access_role: Option<String>,
    hidden: Option<bool>,
}

impl GoogleCalendarProvider {
    pub fn new(oauth: OAuthClientConfig, sync: &SyncConfig) -> Self {
        Self {
            oauth,
            batch_size: sync.batch_size,
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, SyncError> {
        let mut url = Url::parse(&self.oauth.api_base).map_err(|e| {
            SyncError::Configuration(format!(
                "invalid Google Calendar API base '{}': {e}",
                self.oauth.api_base
            ))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                SyncError::Configuration(format!(
                    "Google Calendar API base '{}' cannot carry a path",
                    self.oauth.api_base
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

/// Whether a calendar's events are synced for a tenant.
pub fn keep_calendar(
    calendar_id: &str,
    access_role: Option<&str>,
    hidden: bool,
    tenant_domain: Option<&str>,
) -> bool {
    if access_role.unwrap_or(FREE_BUSY_READER) == FREE_BUSY_READER || hidden {
        return false;
    }
    match tenant_domain.map(str::trim).filter(|d| !d.is_empty()) {
        Some(domain) => calendar_id
            .rsplit_once('@')
            .is_some_and(|(_, host)| host.eq_ignore_ascii_case(domain)),
        None => true,
    }
}

#[async_trait]
impl Provider for GoogleCalendarProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::GoogleCalendar
    }

    fn oauth(&self) -> &OAuthClientConfig {
        &self.oauth
    }

    async fn targets(
        &self,
        spec: &'static ResourceSpec,
        ctx: &TargetContext,
    ) -> Result<Vec<SyncTarget>, SyncError> {
        if spec.name != GOOGLE_CALENDAR_EVENTS.name {
            return Ok(vec![SyncTarget::whole(spec)]);
        }

        let stmt = Query::select()
            .columns([
                Alias::new("native_id"),
                Alias::new("access_role"),
                Alias::new("hidden"),
            ])
            .from(Alias::new(GOOGLE_CALENDAR_LIST.table))
            .and_where(Expr::col(Alias::new("tenant_id")).eq(ctx.tenant.id))
            .order_by(Alias::new("native_id"), Order::Asc)
            .to_owned();
        let calendars =
            StoredCalendar::find_by_statement(ctx.db.get_database_backend().build(&stmt))
                .all(&*ctx.db)
                .await?;

        let total = calendars.len();
        let targets: Vec<SyncTarget> = calendars
            .into_iter()
            .filter(|c| {
                keep_calendar(
                    &c.native_id,
                    c.access_role.as_deref(),
                    c.hidden.unwrap_or(false),
                    ctx.tenant.domain.as_deref(),
                )
            })
            .map(|c| SyncTarget::scoped(spec, c.native_id))
            .collect();

        debug!(
            tenant_id = %ctx.tenant.id,
            calendars = total,
            kept = targets.len(),
            "Selected calendars for event sync"
        );
        Ok(targets)
    }

    fn target_attempts(&self, target: &SyncTarget) -> u32 {
        if target.scope.is_none() {
            CALENDAR_LIST_ATTEMPTS
        } else {
            1
        }
    }

    fn paginator(
        &self,
        _target: &SyncTarget,
        resume: &ResumePoint,
        _batch_size: u64,
    ) -> Box<dyn Paginator> {
        Box::new(DeltaTokenPaginator::new(resume))
    }

    async fn fetch_page(
        &self,
        client: &mut FetchClient,
        target: &SyncTarget,
        _catalog: Option<&FieldCatalog>,
        request: &PageRequest,
    ) -> Result<Page, SyncError> {
        let PageRequest::Delta {
            sync_token,
            page_token,
            initial,
        } = request
        else {
            return Err(SyncError::Configuration(format!(
                "google-calendar cannot serve page request {request:?}"
            )));
        };

        let mut fetch = match &target.scope {
            Some(calendar_id) => {
                let url = self.endpoint(&["calendars", calendar_id, "events"])?;
                let mut fetch = FetchRequest::get(url.as_str())
                    .query("fields", EVENT_FIELDS)
                    .query(
                        "maxResults",
                        self.batch_size.min(EVENTS_MAX_RESULTS).to_string(),
                    );
                if *initial {
                    fetch = fetch.query("timeMin", INITIAL_TIME_MIN);
                }
                fetch
            }
            None => {
                let url = self.endpoint(&["users", "me", "calendarList"])?;
                FetchRequest::get(url.as_str())
                    .query("fields", CALENDAR_LIST_FIELDS)
                    .query(
                        "maxResults",
                        self.batch_size.min(CALENDAR_LIST_MAX_RESULTS).to_string(),
                    )
                    .query("showHidden", "true")
            }
        };
        fetch = fetch
            .query("showDeleted", "true")
            .label(target.resource_name.as_str());
        if let Some(token) = page_token {
            fetch = fetch.query("pageToken", token.clone());
        }
        if let Some(token) = sync_token {
            fetch = fetch.query("syncToken", token.clone());
        }

        let response = client.send(&fetch).await?;
        let mut page = parse_page(response.json()?, target.scope.as_deref())?;
        if target.scope.is_none() {
            let credential = client.credential();
            tag_sync_user(&mut page, &credential.owner, &credential.id.to_string());
        }
        Ok(page)
    }
}

/// Records which connection last saw each calendar in the list.
pub fn tag_sync_user(page: &mut Page, owner: &str, connection_id: &str) {
    for row in &mut page.rows {
        row.insert("syncUser".to_string(), JsonValue::String(owner.to_string()));
        row.insert(
            "syncConnectionId".to_string(),
            JsonValue::String(connection_id.to_string()),
        );
    }
}

/// Converts a list response; event rows are tagged with their calendar id.
pub fn parse_page(body: &JsonValue, calendar_id: Option<&str>) -> Result<Page, SyncError> {
    let items = match body.get("items") {
        Some(JsonValue::Array(items)) => items.as_slice(),
        None | Some(JsonValue::Null) => &[],
        Some(_) => return Err(SyncError::transient("list response items is not an array")),
    };

    let rows = items
        .iter()
        .filter_map(JsonValue::as_object)
        .map(|item| {
            let mut row: Row = item.clone();
            if let Some(calendar_id) = calendar_id {
                row.insert(
                    "calendarId".to_string(),
                    JsonValue::String(calendar_id.to_string()),
                );
            }
            row
        })
        .collect();

    let token = |key: &str| {
        body.get(key)
            .and_then(JsonValue::as_str)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
    };

    Ok(Page {
        rows,
        total_count: None,
        next_page_token: token("nextPageToken"),
        next_sync_token: token("nextSyncToken"),
    })
}
