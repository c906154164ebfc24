//! Delta-token sync of calendars and events against a mocked Calendar API.

use std::sync::Arc;

use anyhow::Result;
use crm_sync::connectors::{GoogleCalendarProvider, Registry};
use crm_sync::paginator::CheckpointExtra;
use crm_sync::repositories::CheckpointRepository;
use crm_sync::sync_driver::SyncDriver;
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path, query_param},
};

#[path = "test_utils/mod.rs"]
mod test_utils;
use test_utils::{
    count_rows, create_test_credential, create_test_tenant, fresh_token_blob, setup_test_db_arc,
    test_app_config,
};

const TEAM_EVENTS: &str = "/calendar/v3/calendars/team@example.com/events";
const CALENDAR_LIST: &str = "/calendar/v3/users/me/calendarList";
const INITIAL_TIME_MIN: &str = "2015-01-01T00:00:00+00:00";

async fn mount_calendar_list(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(CALENDAR_LIST))
        .and(query_param("showHidden", "true"))
        .and(query_param("showDeleted", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {"id": "team@example.com", "accessRole": "owner", "summary": "Team", "primary": true},
                {"id": "busy@example.com", "accessRole": "freeBusyReader", "summary": "Busy"},
                {"id": "other@partner.io", "accessRole": "reader", "summary": "Partner"},
                {"id": "muted@example.com", "accessRole": "reader", "hidden": true}
            ],
            "nextSyncToken": "cal-sync-1"
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(CALENDAR_LIST))
        .and(query_param("syncToken", "cal-sync-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [],
            "nextSyncToken": "cal-sync-2"
        })))
        .with_priority(1)
        .mount(server)
        .await;
}

async fn mount_team_events(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(TEAM_EVENTS))
        .and(query_param("timeMin", INITIAL_TIME_MIN))
        .and(query_param("maxResults", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {
                    "id": "e1",
                    "status": "confirmed",
                    "summary": "Kickoff",
                    "start": {"dateTime": "2026-01-05T10:00:00Z"},
                    "end": {"dateTime": "2026-01-05T11:00:00Z"},
                    "attendees": [{"email": "ada@example.com", "responseStatus": "accepted"}]
                },
                {"id": "e2", "status": "confirmed", "summary": "Retro"}
            ],
            "nextPageToken": "p2"
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(TEAM_EVENTS))
        .and(query_param("pageToken", "p2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"id": "e2", "status": "cancelled"}],
            "nextSyncToken": "ev-sync-1"
        })))
        .with_priority(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn delta_sync_stores_kept_calendars_events_and_sync_tokens() -> Result<()> {
    let server = MockServer::start().await;
    mount_calendar_list(&server).await;
    mount_team_events(&server).await;

    let db = setup_test_db_arc().await?;
    let tenant = create_test_tenant(&db, Some("Example.com")).await?;
    let credential = create_test_credential(
        &db,
        &tenant.id,
        "google-calendar",
        fresh_token_blob("g-token"),
    )
    .await?;

    let config = test_app_config(&server.uri());
    let mut registry = Registry::new();
    registry.register(Arc::new(GoogleCalendarProvider::new(
        config.google_calendar.clone(),
        &config.sync,
    )));
    let driver = SyncDriver::new(db.clone(), registry, &config)?;

    let report = driver.run_all().await?;
    assert_eq!(report.tenants, 1);
    assert_eq!(report.failed(), 0, "{:?}", report.resources);
    assert_eq!(report.succeeded(), 2);
    assert!(report.find(&tenant.id, "calendar_list").is_some());

    let events = report
        .find(&tenant.id, "events:team@example.com")
        .expect("team calendar synced");
    let outcome = events.result.as_ref().expect("events succeeded");
    assert_eq!(outcome.pages, 2);
    assert_eq!(outcome.deleted, 1);
    assert!(outcome.is_whole_fetch_complete);

    // Free/busy, hidden and foreign-domain calendars are stored but not walked.
    assert_eq!(count_rows(&db, "google_calendars", None).await?, 4);
    assert_eq!(count_rows(&db, "google_calendar_events", None).await?, 1);
    assert_eq!(
        count_rows(
            &db,
            "google_calendar_events",
            Some("native_id = 'e1' AND calendar_id = 'team@example.com' AND summary = 'Kickoff'")
        )
        .await?,
        1
    );

    let checkpoints = CheckpointRepository::new(db.clone());
    let list = checkpoints
        .latest(&credential.id, "calendar_list")
        .await?
        .expect("calendar list checkpoint");
    assert_eq!(
        CheckpointExtra::from_json(&list.extra)?.sync_token.as_deref(),
        Some("cal-sync-1")
    );
    let team = checkpoints
        .latest(&credential.id, "events:team@example.com")
        .await?
        .expect("events checkpoint");
    let extra = CheckpointExtra::from_json(&team.extra)?;
    assert!(team.ended_at.is_some());
    assert!(extra.is_whole_fetch_complete);
    assert_eq!(extra.sync_token.as_deref(), Some("ev-sync-1"));
    assert_eq!(extra.page_token, None);
    Ok(())
}

#[tokio::test]
async fn invalidated_sync_token_restarts_from_zero() -> Result<()> {
    let server = MockServer::start().await;
    mount_calendar_list(&server).await;
    mount_team_events(&server).await;
    Mock::given(method("GET"))
        .and(path(TEAM_EVENTS))
        .and(query_param("syncToken", "ev-sync-1"))
        .respond_with(ResponseTemplate::new(410).set_body_json(json!({
            "error": {"code": 410, "message": "Sync token is no longer valid"}
        })))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;

    let db = setup_test_db_arc().await?;
    let tenant = create_test_tenant(&db, Some("example.com")).await?;
    let credential = create_test_credential(
        &db,
        &tenant.id,
        "google-calendar",
        fresh_token_blob("g-token"),
    )
    .await?;

    let config = test_app_config(&server.uri());
    let mut registry = Registry::new();
    registry.register(Arc::new(GoogleCalendarProvider::new(
        config.google_calendar.clone(),
        &config.sync,
    )));
    let driver = SyncDriver::new(db.clone(), registry, &config)?;

    driver.run_all().await?;
    let second = driver.run_all().await?;
    assert_eq!(second.failed(), 0, "{:?}", second.resources);

    let events = second
        .find(&tenant.id, "events:team@example.com")
        .expect("team calendar synced");
    assert!(events.result.as_ref().is_ok_and(|o| o.is_whole_fetch_complete));

    let resource = "resource_name = 'events:team@example.com'";
    assert_eq!(count_rows(&db, "sync_checkpoints", Some(resource)).await?, 3);
    assert_eq!(
        count_rows(
            &db,
            "sync_checkpoints",
            Some(&format!("{resource} AND ended_at IS NULL"))
        )
        .await?,
        1
    );

    let latest = CheckpointRepository::new(db.clone())
        .latest(&credential.id, "events:team@example.com")
        .await?
        .expect("events checkpoint");
    let extra = CheckpointExtra::from_json(&latest.extra)?;
    assert!(extra.initial_fetch);
    assert_eq!(extra.sync_token.as_deref(), Some("ev-sync-1"));

    // The calendar list advanced with its own token.
    let list = CheckpointRepository::new(db.clone())
        .latest(&credential.id, "calendar_list")
        .await?
        .expect("calendar list checkpoint");
    assert_eq!(
        CheckpointExtra::from_json(&list.extra)?.sync_token.as_deref(),
        Some("cal-sync-2")
    );
    assert_eq!(count_rows(&db, "google_calendar_events", None).await?, 1);
    Ok(())
}

#[tokio::test]
async fn calendar_list_reruns_after_exhausted_fetch_retries() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CALENDAR_LIST))
        .respond_with(ResponseTemplate::new(503).set_body_string("backend unavailable"))
        .with_priority(1)
        .up_to_n_times(3)
        .expect(3)
        .mount(&server)
        .await;
    mount_calendar_list(&server).await;
    mount_team_events(&server).await;

    let db = setup_test_db_arc().await?;
    let tenant = create_test_tenant(&db, Some("example.com")).await?;
    let credential = create_test_credential(
        &db,
        &tenant.id,
        "google-calendar",
        fresh_token_blob("g-token"),
    )
    .await?;

    let config = test_app_config(&server.uri());
    let mut registry = Registry::new();
    registry.register(Arc::new(GoogleCalendarProvider::new(
        config.google_calendar.clone(),
        &config.sync,
    )));
    let driver = SyncDriver::new(db.clone(), registry, &config)?;

    let report = driver.run_all().await?;
    assert_eq!(report.failed(), 0, "{:?}", report.resources);
    let list = report
        .find(&tenant.id, "calendar_list")
        .expect("calendar list reported");
    assert!(list.result.as_ref().is_ok_and(|o| o.is_whole_fetch_complete));

    // The abandoned first attempt keeps its open checkpoint.
    let resource = "resource_name = 'calendar_list'";
    assert_eq!(count_rows(&db, "sync_checkpoints", Some(resource)).await?, 2);
    assert_eq!(
        count_rows(
            &db,
            "sync_checkpoints",
            Some(&format!("{resource} AND ended_at IS NULL"))
        )
        .await?,
        1
    );

    assert_eq!(
        count_rows(
            &db,
            "google_calendars",
            Some(&format!(
                "sync_user = 'owner@example.com' AND sync_connection_id = '{}'",
                credential.id
            ))
        )
        .await?,
        4
    );
    Ok(())
}
