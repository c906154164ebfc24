//! End-to-end resource walks against a mocked Outreach API.

use std::sync::Arc;

use anyhow::Result;
use crm_sync::config::SyncConfig;
use crm_sync::connectors::{OutreachProvider, Provider, SyncTarget};
use crm_sync::error::SyncError;
use crm_sync::fetch::{FetchClient, RetryPolicy, http_client};
use crm_sync::mapper::{ProviderKind, find_resource};
use crm_sync::models::credential;
use crm_sync::paginator::{CheckpointExtra, Comparison, Offset, ResumePoint};
use crm_sync::repositories::{CheckpointRepository, CredentialRepository};
use crm_sync::sync_orchestrator::{ResourceSync, SyncState};
use crm_sync::token_refresh::CredentialRefresher;
use sea_orm::{ConnectionTrait, DatabaseConnection, Statement};
use serde_json::{Value as JsonValue, json};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path, query_param},
};

#[path = "test_utils/mod.rs"]
mod test_utils;
use test_utils::{
    count_rows, create_test_credential, create_test_tenant, fresh_token_blob, setup_test_db_arc,
    test_app_config, test_sync_config,
};

fn accounts_page(ids: &[i64], count: i64) -> JsonValue {
    let data: Vec<JsonValue> = ids
        .iter()
        .map(|id| {
            json!({
                "type": "account",
                "id": id,
                "attributes": {"name": format!("Account {id}"), "domain": format!("a{id}.io")},
                "relationships": {"owner": {"data": {"type": "user", "id": 9}}}
            })
        })
        .collect();
    json!({"data": data, "metadata": {"count": count}})
}

async fn mount_range(server: &MockServer, from: i64, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/api/v2/accounts"))
        .and(query_param("filter[id]", format!("{from}..99999999").as_str()))
        .and(query_param("page[limit]", "2"))
        .and(query_param("sort", "id"))
        .respond_with(response)
        .mount(server)
        .await;
}

struct Harness {
    db: Arc<DatabaseConnection>,
    provider: Arc<dyn Provider>,
    tenant_id: uuid::Uuid,
    credential: credential::Model,
    base_url: String,
}

impl Harness {
    async fn new(server: &MockServer) -> Result<Self> {
        let db = setup_test_db_arc().await?;
        let tenant = create_test_tenant(&db, None).await?;
        let credential =
            create_test_credential(&db, &tenant.id, "outreach", fresh_token_blob("token")).await?;
        let config = test_app_config(&server.uri());
        Ok(Self {
            provider: Arc::new(OutreachProvider::new(config.outreach.clone())),
            db,
            tenant_id: tenant.id,
            credential,
            base_url: server.uri(),
        })
    }

    fn client(&self) -> Result<FetchClient> {
        let config = test_app_config(&self.base_url);
        let http = http_client(&config.sync)?;
        let refresher = CredentialRefresher::new(
            ProviderKind::Outreach,
            config.outreach.clone(),
            http.clone(),
            CredentialRepository::new(self.db.clone()),
            config.sync.refresh_slack_seconds,
        );
        Ok(FetchClient::new(
            ProviderKind::Outreach,
            http,
            refresher,
            self.credential.clone(),
            RetryPolicy::from_config(&config.sync),
        ))
    }

    fn resource_sync(&self) -> ResourceSync {
        self.resource_sync_with(&test_sync_config())
    }

    fn resource_sync_with(&self, sync: &SyncConfig) -> ResourceSync {
        ResourceSync::new(self.db.clone(), self.provider.clone(), self.tenant_id, sync)
    }

    async fn latest_extra(&self) -> Result<(CheckpointExtra, bool)> {
        let checkpoint = CheckpointRepository::new(self.db.clone())
            .latest(&self.credential.id, "accounts")
            .await?
            .expect("checkpoint exists");
        Ok((
            CheckpointExtra::from_json(&checkpoint.extra)?,
            checkpoint.ended_at.is_some(),
        ))
    }
}

#[tokio::test]
async fn walks_id_ranges_until_count_is_zero() -> Result<()> {
    let server = MockServer::start().await;
    mount_range(&server, 0, ResponseTemplate::new(200).set_body_json(accounts_page(&[1, 2], 3))).await;
    // Ids jump past the limit; the next range starts after the last id seen.
    mount_range(&server, 3, ResponseTemplate::new(200).set_body_json(accounts_page(&[10], 1))).await;
    mount_range(&server, 11, ResponseTemplate::new(200).set_body_json(accounts_page(&[], 0))).await;

    let harness = Harness::new(&server).await?;
    let target = SyncTarget::whole(find_resource(ProviderKind::Outreach, "accounts")?);
    let mut client = harness.client()?;
    let mut sync = harness.resource_sync();

    let outcome = sync.run(&mut client, &target).await?;
    assert_eq!(sync.state(), SyncState::Finalized);
    assert_eq!(outcome.pages, 3);
    assert_eq!(outcome.upserted, 3);
    assert!(outcome.is_whole_fetch_complete);

    assert_eq!(count_rows(&harness.db, "outreach_accounts", None).await?, 3);
    assert_eq!(
        count_rows(&harness.db, "outreach_accounts", Some("native_id = '10' AND name = 'Account 10'"))
            .await?,
        1
    );

    let (extra, ended) = harness.latest_extra().await?;
    assert!(ended);
    assert!(extra.is_whole_fetch_complete);
    assert_eq!(extra.last_offset_check_point, Some(Offset::Numeric(10)));
    Ok(())
}

#[tokio::test]
async fn interrupted_walk_resumes_inclusively_then_exclusively() -> Result<()> {
    let server = MockServer::start().await;
    mount_range(&server, 0, ResponseTemplate::new(200).set_body_json(accounts_page(&[1, 2], 3))).await;
    mount_range(&server, 3, ResponseTemplate::new(503)).await;
    // Resumed attempt re-reads the last checkpointed id.
    mount_range(&server, 2, ResponseTemplate::new(200).set_body_json(accounts_page(&[2, 5], 2))).await;
    mount_range(&server, 6, ResponseTemplate::new(200).set_body_json(accounts_page(&[], 0))).await;

    let harness = Harness::new(&server).await?;
    let target = SyncTarget::whole(find_resource(ProviderKind::Outreach, "accounts")?);

    let mut sync = harness.resource_sync();
    let err = sync
        .run(&mut harness.client()?, &target)
        .await
        .unwrap_err();
    assert!(err.is_transient());
    assert_eq!(sync.state(), SyncState::Aborted);

    let (extra, ended) = harness.latest_extra().await?;
    assert!(!ended);
    assert!(!extra.is_whole_fetch_complete);
    assert_eq!(extra.last_offset_check_point, Some(Offset::Numeric(2)));
    assert_eq!(count_rows(&harness.db, "outreach_accounts", None).await?, 2);

    let checkpoints = CheckpointRepository::new(harness.db.clone());
    assert!(
        checkpoints
            .last_completed(&harness.credential.id, "accounts")
            .await?
            .is_none()
    );

    let mut sync = harness.resource_sync();
    let outcome = sync.run(&mut harness.client()?, &target).await?;
    assert!(outcome.is_whole_fetch_complete);
    assert_eq!(count_rows(&harness.db, "outreach_accounts", None).await?, 3);

    let (extra, ended) = harness.latest_extra().await?;
    assert!(ended);
    assert_eq!(extra.start_offset, Some(Offset::Numeric(2)));
    assert!(extra.start_inclusive);
    assert_eq!(extra.last_offset_check_point, Some(Offset::Numeric(5)));
    let completed = checkpoints
        .last_completed(&harness.credential.id, "accounts")
        .await?
        .expect("finished attempt");
    assert_eq!(completed.id, outcome.checkpoint_id);

    // A completed pass resumes strictly after its last id.
    let mut sync = harness.resource_sync();
    let outcome = sync.run(&mut harness.client()?, &target).await?;
    assert_eq!(outcome.pages, 1);
    assert_eq!(outcome.upserted, 0);

    let (extra, ended) = harness.latest_extra().await?;
    assert!(ended);
    assert_eq!(extra.start_offset, Some(Offset::Numeric(5)));
    assert!(!extra.start_inclusive);

    assert_eq!(
        count_rows(
            &harness.db,
            "sync_checkpoints",
            Some("resource_name = 'accounts' AND ended_at IS NULL")
        )
        .await?,
        1
    );
    assert_eq!(count_rows(&harness.db, "sync_checkpoints", None).await?, 3);
    Ok(())
}

#[tokio::test]
async fn relationship_ids_are_kept_in_extra() -> Result<()> {
    let server = MockServer::start().await;
    mount_range(&server, 0, ResponseTemplate::new(200).set_body_json(accounts_page(&[4], 1))).await;
    mount_range(&server, 5, ResponseTemplate::new(200).set_body_json(accounts_page(&[], 0))).await;

    let harness = Harness::new(&server).await?;
    let target = SyncTarget::whole(find_resource(ProviderKind::Outreach, "accounts")?);
    harness
        .resource_sync()
        .run(&mut harness.client()?, &target)
        .await?;

    assert_eq!(
        count_rows(
            &harness.db,
            "outreach_accounts",
            Some("native_id = '4' AND extra LIKE '%ownerId%'")
        )
        .await?,
        1
    );
    Ok(())
}

#[tokio::test]
async fn row_checkpoints_follow_flushed_rows_and_survive_a_failed_write() -> Result<()> {
    let server = MockServer::start().await;
    mount_range(&server, 0, ResponseTemplate::new(200).set_body_json(accounts_page(&[1, 2, 3], 3))).await;
    mount_range(&server, 2, ResponseTemplate::new(200).set_body_json(accounts_page(&[2, 3], 2))).await;
    mount_range(&server, 4, ResponseTemplate::new(200).set_body_json(accounts_page(&[], 0))).await;

    let harness = Harness::new(&server).await?;
    let target = SyncTarget::whole(find_resource(ProviderKind::Outreach, "accounts")?);
    let every_row = SyncConfig {
        checkpoint_probability: 1.0,
        ..test_sync_config()
    };

    // The write of account 3 fails after accounts 1 and 2 were checkpointed.
    let backend = harness.db.get_database_backend();
    harness
        .db
        .execute(Statement::from_string(
            backend,
            "CREATE TRIGGER reject_account_3 BEFORE INSERT ON outreach_accounts \
             WHEN NEW.native_id = '3' BEGIN SELECT RAISE(ABORT, 'disk full'); END"
                .to_string(),
        ))
        .await?;

    let mut sync = harness.resource_sync_with(&every_row);
    let err = sync
        .run(&mut harness.client()?, &target)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Database(_)), "{err}");
    assert_eq!(sync.state(), SyncState::Aborted);

    let (extra, ended) = harness.latest_extra().await?;
    assert!(!ended);
    assert_eq!(extra.last_offset_check_point, Some(Offset::Numeric(2)));
    assert_eq!(count_rows(&harness.db, "outreach_accounts", None).await?, 2);

    harness
        .db
        .execute(Statement::from_string(
            backend,
            "DROP TRIGGER reject_account_3".to_string(),
        ))
        .await?;

    let outcome = harness
        .resource_sync_with(&every_row)
        .run(&mut harness.client()?, &target)
        .await?;
    assert!(outcome.is_whole_fetch_complete);
    assert_eq!(count_rows(&harness.db, "outreach_accounts", None).await?, 3);

    let (extra, ended) = harness.latest_extra().await?;
    assert!(ended);
    assert_eq!(extra.start_offset, Some(Offset::Numeric(2)));
    assert!(extra.start_inclusive);
    assert_eq!(extra.last_offset_check_point, Some(Offset::Numeric(3)));
    Ok(())
}

#[tokio::test]
async fn full_page_without_count_ends_incomplete() -> Result<()> {
    let server = MockServer::start().await;
    let mut page = accounts_page(&[1, 2], 0);
    page.as_object_mut()
        .expect("page object")
        .remove("metadata");
    mount_range(&server, 0, ResponseTemplate::new(200).set_body_json(page)).await;

    let harness = Harness::new(&server).await?;
    let target = SyncTarget::whole(find_resource(ProviderKind::Outreach, "accounts")?);
    let outcome = harness
        .resource_sync()
        .run(&mut harness.client()?, &target)
        .await?;

    assert_eq!(outcome.pages, 1);
    assert_eq!(outcome.upserted, 2);
    assert!(!outcome.is_whole_fetch_complete);

    let (extra, ended) = harness.latest_extra().await?;
    assert!(ended);
    assert!(!extra.is_whole_fetch_complete);
    assert_eq!(extra.last_offset_check_point, Some(Offset::Numeric(2)));

    // An unfinished walk is picked up again inclusively.
    let resume = ResumePoint::from_checkpoint(Some(&extra));
    assert_eq!(resume.offset, Some(Offset::Numeric(2)));
    assert_eq!(resume.comparison, Comparison::Gte);
    Ok(())
}
