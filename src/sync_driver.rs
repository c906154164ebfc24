//! Tenant sync driver
//!
//! One pass over every active tenant: for each configured provider, pick the
//! tenant's designated credential and run every resource in priority order.
//! Failures are recorded in the [`RunReport`] and never stop sibling
//! resources, providers or tenants.

use std::sync::Arc;

use metrics::counter;
use sea_orm::DatabaseConnection;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::{AppConfig, SyncConfig};
use crate::connectors::{Provider, Registry, SyncTarget, TargetContext};
use crate::error::SyncError;
use crate::fetch::{FetchClient, RetryPolicy, http_client};
use crate::mapper::ProviderKind;
use crate::models::{credential, tenant};
use crate::repositories::tenant::TENANT_STATUS_ACTIVE;
use crate::repositories::{ApiLogRepository, CredentialRepository, TenantRepository};
use crate::sync_orchestrator::{ResourceSync, SyncOutcome};
use crate::token_refresh::CredentialRefresher;

/// Resource name recorded when a provider fails before any resource runs.
pub const CREDENTIAL_STEP: &str = "credential";

#[derive(Debug, Clone)]
pub struct ResourceReport {
    pub tenant_id: Uuid,
    pub provider: ProviderKind,
    pub resource: String,
    pub result: Result<SyncOutcome, String>,
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub tenants: usize,
    pub resources: Vec<ResourceReport>,
}

impl RunReport {
    pub fn succeeded(&self) -> usize {
        self.resources.iter().filter(|r| r.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.resources.iter().filter(|r| r.result.is_err()).count()
    }

    pub fn find(&self, tenant_id: &Uuid, resource: &str) -> Option<&ResourceReport> {
        self.resources
            .iter()
            .find(|r| r.tenant_id == *tenant_id && r.resource == resource)
    }
}

pub struct SyncDriver {
    db: Arc<DatabaseConnection>,
    registry: Registry,
    sync: SyncConfig,
    http: reqwest::Client,
    tenant_filter: Option<Uuid>,
    provider_filter: Option<ProviderKind>,
}

impl SyncDriver {
    pub fn new(
        db: Arc<DatabaseConnection>,
        registry: Registry,
        config: &AppConfig,
    ) -> Result<Self, SyncError> {
        Ok(Self {
            http: http_client(&config.sync)?,
            db,
            registry,
            sync: config.sync.clone(),
            tenant_filter: None,
            provider_filter: None,
        })
    }

    pub fn with_tenant_filter(mut self, tenant_id: Option<Uuid>) -> Self {
        self.tenant_filter = tenant_id;
        self
    }

    pub fn with_provider_filter(mut self, provider: Option<ProviderKind>) -> Self {
        self.provider_filter = provider;
        self
    }

    /// Runs one pass. Only failing to list tenants is an error.
    pub async fn run_all(&self) -> Result<RunReport, SyncError> {
        let tenants = TenantRepository::new(self.db.clone());
        let selected = match self.tenant_filter {
            Some(id) => match tenants.get_by_id(&id).await? {
                Some(tenant) if tenant.status == TENANT_STATUS_ACTIVE => vec![tenant],
                Some(tenant) => {
                    warn!(tenant_id = %id, status = %tenant.status, "Requested tenant is not active");
                    Vec::new()
                }
                None => {
                    warn!(tenant_id = %id, "Requested tenant not found");
                    Vec::new()
                }
            },
            None => tenants.list_active().await?,
        };

        info!(
            tenants = selected.len(),
            providers = self.providers().len(),
            "Starting sync pass"
        );

        let mut report = RunReport::default();
        for tenant in &selected {
            report.tenants += 1;
            let results = self.run_tenant(tenant).await;
            report.resources.extend(results);
        }

        info!(
            tenants = report.tenants,
            succeeded = report.succeeded(),
            failed = report.failed(),
            "Sync pass finished"
        );
        Ok(report)
    }

    #[instrument(skip_all, fields(tenant_id = %tenant.id))]
    pub async fn run_tenant(&self, tenant: &tenant::Model) -> Vec<ResourceReport> {
        let mut results = Vec::new();
        for provider in self.providers() {
            self.run_provider(tenant, provider, &mut results).await;
        }
        results
    }

    fn providers(&self) -> Vec<Arc<dyn Provider>> {
        self.registry
            .providers()
            .into_iter()
            .filter(|p| self.provider_filter.is_none_or(|kind| p.kind() == kind))
            .collect()
    }

    async fn run_provider(
        &self,
        tenant: &tenant::Model,
        provider: Arc<dyn Provider>,
        results: &mut Vec<ResourceReport>,
    ) {
        let kind = provider.kind();
        let Some(credential) = (match self.designated_credential(tenant, kind).await {
            Ok(credential) => credential,
            Err(err) => {
                self.record_failure(results, tenant, kind, CREDENTIAL_STEP, &err);
                return;
            }
        }) else {
            debug!(provider = kind.slug(), "No active credential; skipping provider");
            return;
        };

        let refresher = CredentialRefresher::new(
            kind,
            provider.oauth().clone(),
            self.http.clone(),
            CredentialRepository::new(self.db.clone()),
            self.sync.refresh_slack_seconds,
        );
        let mut client = FetchClient::new(
            kind,
            self.http.clone(),
            refresher,
            credential,
            RetryPolicy::from_config(&self.sync),
        )
        .with_api_log(ApiLogRepository::new(self.db.clone()));

        if let Err(err) = client.ensure_fresh().await {
            self.record_failure(results, tenant, kind, CREDENTIAL_STEP, &err);
            return;
        }

        let ctx = TargetContext {
            db: self.db.clone(),
            tenant: tenant.clone(),
        };

        for spec in provider.resources() {
            let targets = match provider.targets(spec, &ctx).await {
                Ok(targets) => targets,
                Err(err) => {
                    self.record_failure(results, tenant, kind, spec.name, &err);
                    continue;
                }
            };

            for target in targets {
                let result = self.run_target(&provider, &mut client, tenant, &target).await;
                match result {
                    Ok(outcome) => results.push(ResourceReport {
                        tenant_id: tenant.id,
                        provider: kind,
                        resource: target.resource_name.clone(),
                        result: Ok(outcome),
                    }),
                    Err(err) => {
                        self.record_failure(results, tenant, kind, &target.resource_name, &err)
                    }
                }
            }
        }
    }

    async fn run_target(
        &self,
        provider: &Arc<dyn Provider>,
        client: &mut FetchClient,
        tenant: &tenant::Model,
        target: &SyncTarget,
    ) -> Result<SyncOutcome, SyncError> {
        let attempts = provider.target_attempts(target).max(1);
        let mut attempt = 1;
        loop {
            let result =
                ResourceSync::new(self.db.clone(), provider.clone(), tenant.id, &self.sync)
                    .run(client, target)
                    .await;
            match result {
                Err(err) if attempt < attempts && reruns_after(&err) => {
                    warn!(
                        tenant_id = %tenant.id,
                        resource = %target.resource_name,
                        attempt,
                        attempts,
                        error = %err,
                        "Resource sync failed; running it again"
                    );
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// The earliest active credential for the pair.
    async fn designated_credential(
        &self,
        tenant: &tenant::Model,
        kind: ProviderKind,
    ) -> Result<Option<credential::Model>, SyncError> {
        let mut credentials = CredentialRepository::new(self.db.clone())
            .find_active_by_tenant_and_provider(&tenant.id, kind.slug())
            .await?;
        if credentials.len() > 1 {
            warn!(
                provider = kind.slug(),
                count = credentials.len(),
                chosen = %credentials[0].id,
                "Multiple active credentials; using the earliest"
            );
        }
        Ok(if credentials.is_empty() {
            None
        } else {
            Some(credentials.swap_remove(0))
        })
    }

    fn record_failure(
        &self,
        results: &mut Vec<ResourceReport>,
        tenant: &tenant::Model,
        kind: ProviderKind,
        resource: &str,
        err: &SyncError,
    ) {
        counter!(
            "sync_resource_failures_total",
            "provider" => kind.slug(),
            "kind" => err.kind()
        )
        .increment(1);
        error!(
            tenant_id = %tenant.id,
            provider = kind.slug(),
            resource,
            error = %err,
            kind = err.kind(),
            "Resource sync failed"
        );
        results.push(ResourceReport {
            tenant_id: tenant.id,
            provider: kind,
            resource: resource.to_string(),
            result: Err(err.to_string()),
        });
    }
}

/// Credential and configuration failures repeat on every rerun.
fn reruns_after(err: &SyncError) -> bool {
    !matches!(
        err,
        SyncError::CredentialRefresh { .. }
            | SyncError::AuthExpired(_)
            | SyncError::Configuration(_)
    )
}
