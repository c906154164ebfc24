//! Multi-tenant passes: credential selection and failure isolation.

use anyhow::Result;
use crm_sync::connectors::Registry;
use crm_sync::mapper::ProviderKind;
use crm_sync::repositories::TenantRepository;
use crm_sync::sync_driver::{CREDENTIAL_STEP, SyncDriver};
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_string_contains, header, method, path, path_regex},
};

#[path = "test_utils/mod.rs"]
mod test_utils;
use test_utils::{
    count_rows, create_test_credential, create_test_tenant, fresh_token_blob, setup_test_db_arc,
    test_app_config,
};

async fn mount_outreach(server: &MockServer) {
    // Only the earliest credential's token is accepted.
    Mock::given(method("GET"))
        .and(path_regex(r"^/api/v2/[a-z]+$"))
        .and(header("authorization", "Bearer token-a"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [],
            "metadata": {"count": 0}
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2/prospects"))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(json!({"errors": [{"title": "Forbidden"}]})),
        )
        .with_priority(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("refresh_token=revoked"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})))
        .mount(server)
        .await;
}

#[tokio::test]
async fn failures_stay_within_their_resource_and_tenant() -> Result<()> {
    let server = MockServer::start().await;
    mount_outreach(&server).await;

    let db = setup_test_db_arc().await?;
    let healthy = create_test_tenant(&db, None).await?;
    create_test_credential(&db, &healthy.id, "outreach", fresh_token_blob("token-a")).await?;
    create_test_credential(&db, &healthy.id, "outreach", fresh_token_blob("token-late")).await?;

    let revoked = create_test_tenant(&db, None).await?;
    create_test_credential(
        &db,
        &revoked.id,
        "outreach",
        json!({
            "access_token": "old",
            "refresh_token": "revoked",
            "expires_in": 3600,
            "issued_at": chrono::Utc::now().timestamp() - 7200,
        }),
    )
    .await?;

    let config = test_app_config(&server.uri());
    let registry = Registry::from_config(&config);
    let driver = SyncDriver::new(db.clone(), registry, &config)?;
    let report = driver.run_all().await?;

    assert_eq!(report.tenants, 2);

    // Healthy tenant: every resource but the forbidden one succeeds.
    for resource in ["accounts", "users", "mailings", "calls"] {
        let entry = report.find(&healthy.id, resource).expect("resource reported");
        assert!(entry.result.is_ok(), "{resource}: {:?}", entry.result);
        assert_eq!(entry.provider, ProviderKind::Outreach);
    }
    let prospects = report.find(&healthy.id, "prospects").expect("prospects reported");
    assert!(
        prospects
            .result
            .as_ref()
            .is_err_and(|err| err.contains("403"))
    );

    // Revoked tenant: the refresh failure is reported once and nothing runs.
    let tenant_reports: Vec<_> = report
        .resources
        .iter()
        .filter(|r| r.tenant_id == revoked.id)
        .collect();
    assert_eq!(tenant_reports.len(), 1);
    assert_eq!(tenant_reports[0].resource, CREDENTIAL_STEP);
    assert!(
        tenant_reports[0]
            .result
            .as_ref()
            .is_err_and(|err| err.contains("invalid_grant"))
    );

    assert_eq!(report.succeeded(), 4);
    assert_eq!(report.failed(), 2);
    assert_eq!(
        count_rows(
            &db,
            "sync_checkpoints",
            Some("resource_name = 'prospects' AND ended_at IS NULL")
        )
        .await?,
        1
    );
    Ok(())
}

#[tokio::test]
async fn filters_restrict_tenants_and_providers() -> Result<()> {
    let server = MockServer::start().await;
    mount_outreach(&server).await;

    let db = setup_test_db_arc().await?;
    let first = create_test_tenant(&db, None).await?;
    let second = create_test_tenant(&db, None).await?;
    for tenant in [&first, &second] {
        create_test_credential(&db, &tenant.id, "outreach", fresh_token_blob("token-a")).await?;
    }

    let config = test_app_config(&server.uri());
    let driver = SyncDriver::new(db.clone(), Registry::from_config(&config), &config)?
        .with_tenant_filter(Some(second.id))
        .with_provider_filter(Some(ProviderKind::Outreach));
    let report = driver.run_all().await?;

    assert_eq!(report.tenants, 1);
    assert!(report.resources.iter().all(|r| r.tenant_id == second.id));
    assert_eq!(report.resources.len(), 5);

    // Salesforce is registered but has no credential for the tenant.
    let driver = SyncDriver::new(db.clone(), Registry::from_config(&config), &config)?
        .with_tenant_filter(Some(second.id))
        .with_provider_filter(Some(ProviderKind::Salesforce));
    let report = driver.run_all().await?;
    assert!(report.resources.is_empty());
    Ok(())
}

#[tokio::test]
async fn inactive_tenants_are_skipped() -> Result<()> {
    let server = MockServer::start().await;
    mount_outreach(&server).await;

    let db = setup_test_db_arc().await?;
    let tenant = create_test_tenant(&db, None).await?;
    create_test_credential(&db, &tenant.id, "outreach", fresh_token_blob("token-a")).await?;
    TenantRepository::new(db.clone())
        .set_status(&tenant.id, "suspended")
        .await?;

    let config = test_app_config(&server.uri());
    let report = SyncDriver::new(db.clone(), Registry::from_config(&config), &config)?
        .run_all()
        .await?;

    assert_eq!(report.tenants, 0);
    assert!(report.resources.is_empty());

    // Naming the tenant explicitly does not bypass its status.
    let report = SyncDriver::new(db.clone(), Registry::from_config(&config), &config)?
        .with_tenant_filter(Some(tenant.id))
        .run_all()
        .await?;
    assert_eq!(report.tenants, 0);
    assert!(report.resources.is_empty());

    assert_eq!(count_rows(&db, "sync_checkpoints", None).await?, 0);
    Ok(())
}
