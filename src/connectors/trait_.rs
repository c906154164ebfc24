//! Provider adapter contract.
//!
//! An adapter turns the provider-neutral [`PageRequest`] of a paginator into
//! concrete HTTP calls and returns rows in a uniform [`Page`]. The generic
//! orchestrator drives every adapter the same way.

use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::config::OAuthClientConfig;
use crate::error::SyncError;
use crate::fetch::FetchClient;
use crate::mapper::{ProviderKind, ResourceSpec, resources_for};
use crate::models::tenant;
use crate::paginator::{Page, PageRequest, Paginator, ResumePoint};

/// One resource walk the orchestrator performs.
#[derive(Debug, Clone)]
pub struct SyncTarget {
    pub spec: &'static ResourceSpec,
    /// Name recorded on checkpoints, e.g. `Account` or `events:team@example.com`
    pub resource_name: String,
    /// Parent object the resource is scoped to (a calendar id)
    pub scope: Option<String>,
}

impl SyncTarget {
    pub fn whole(spec: &'static ResourceSpec) -> Self {
        Self {
            spec,
            resource_name: spec.name.to_string(),
            scope: None,
        }
    }

    pub fn scoped(spec: &'static ResourceSpec, scope: impl Into<String>) -> Self {
        let scope = scope.into();
        Self {
            spec,
            resource_name: format!("{}:{}", spec.name, scope),
            scope: Some(scope),
        }
    }
}

/// One field of a provider's live field catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
}

impl FieldDescriptor {
    pub fn is_custom(&self) -> bool {
        self.name.ends_with("__c")
    }
}

/// Field catalog returned by a describe call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldCatalog {
    pub fields: Vec<FieldDescriptor>,
}

impl FieldCatalog {
    pub fn standard_json(&self) -> JsonValue {
        serde_json::to_value(
            self.fields
                .iter()
                .filter(|f| !f.is_custom())
                .collect::<Vec<_>>(),
        )
        .unwrap_or(JsonValue::Array(Vec::new()))
    }

    pub fn custom_json(&self) -> JsonValue {
        serde_json::to_value(
            self.fields
                .iter()
                .filter(|f| f.is_custom())
                .collect::<Vec<_>>(),
        )
        .unwrap_or(JsonValue::Array(Vec::new()))
    }
}

/// Inputs an adapter may need to expand its catalog into targets.
#[derive(Debug, Clone)]
pub struct TargetContext {
    pub db: Arc<DatabaseConnection>,
    pub tenant: tenant::Model,
}

#[async_trait]
pub trait Provider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// OAuth client used to refresh this provider's credentials.
    fn oauth(&self) -> &OAuthClientConfig;

    /// Resource catalog in sync priority order.
    fn resources(&self) -> Vec<&'static ResourceSpec> {
        resources_for(self.kind())
    }

    /// Concrete targets for one catalog entry.
    async fn targets(
        &self,
        spec: &'static ResourceSpec,
        _ctx: &TargetContext,
    ) -> Result<Vec<SyncTarget>, SyncError> {
        Ok(vec![SyncTarget::whole(spec)])
    }

    /// Fetches the live field catalog; `None` when the provider has no describe call.
    async fn describe(
        &self,
        _client: &mut FetchClient,
        _target: &SyncTarget,
    ) -> Result<Option<FieldCatalog>, SyncError> {
        Ok(None)
    }

    /// Whole-run attempts for a target before its failure is reported.
    fn target_attempts(&self, _target: &SyncTarget) -> u32 {
        1
    }

    fn paginator(
        &self,
        target: &SyncTarget,
        resume: &ResumePoint,
        batch_size: u64,
    ) -> Box<dyn Paginator>;

    async fn fetch_page(
        &self,
        client: &mut FetchClient,
        target: &SyncTarget,
        catalog: Option<&FieldCatalog>,
        request: &PageRequest,
    ) -> Result<Page, SyncError>;
}
