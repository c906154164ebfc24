//! Outreach adapter
//!
//! JSON:API collections walked by id range. Each resource object is flattened
//! into one row: `id`, its attributes, and `<relationship>Id` for every
//! to-one relationship.

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::config::OAuthClientConfig;
use crate::connectors::trait_::{FieldCatalog, Provider, SyncTarget};
use crate::error::SyncError;
use crate::fetch::{FetchClient, FetchRequest};
use crate::mapper::ProviderKind;
use crate::paginator::{OffsetRangePaginator, Page, PageRequest, Paginator, ResumePoint, Row};

const JSON_API: &str = "application/vnd.api+json";

pub struct OutreachProvider {
    oauth: OAuthClientConfig,
}

impl OutreachProvider {
    pub fn new(oauth: OAuthClientConfig) -> Self {
        Self { oauth }
    }
}

#[async_trait]
impl Provider for OutreachProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Outreach
    }

    fn oauth(&self) -> &OAuthClientConfig {
        &self.oauth
    }

    fn paginator(
        &self,
        _target: &SyncTarget,
        resume: &ResumePoint,
        batch_size: u64,
    ) -> Box<dyn Paginator> {
        Box::new(OffsetRangePaginator::new(resume, batch_size))
    }

    async fn fetch_page(
        &self,
        client: &mut FetchClient,
        target: &SyncTarget,
        _catalog: Option<&FieldCatalog>,
        request: &PageRequest,
    ) -> Result<Page, SyncError> {
        if !matches!(request, PageRequest::IdRange { .. }) {
            return Err(SyncError::Configuration(format!(
                "outreach cannot serve page request {request:?}"
            )));
        }

        let url = format!(
            "{}/{}",
            self.oauth.api_base.trim_end_matches('/'),
            target.spec.remote_name
        );
        let mut fetch = FetchRequest::get(url)
            .header("Accept", JSON_API)
            .label(target.resource_name.as_str());
        for (key, value) in request.query_params() {
            fetch = fetch.query(key, value);
        }

        let response = client.send(&fetch).await?;
        parse_page(response.json()?)
    }
}

/// Converts a JSON:API list response into a [`Page`].
pub fn parse_page(body: &JsonValue) -> Result<Page, SyncError> {
    let data = body
        .get("data")
        .and_then(JsonValue::as_array)
        .ok_or_else(|| SyncError::transient("JSON:API response has no data array"))?;

    let total_count = body
        .get("metadata")
        .or_else(|| body.get("meta"))
        .and_then(|meta| meta.get("count"))
        .and_then(JsonValue::as_i64);

    Ok(Page {
        rows: data.iter().map(flatten_resource).collect(),
        total_count,
        ..Page::default()
    })
}

fn flatten_resource(resource: &JsonValue) -> Row {
    let mut row = Row::new();
    if let Some(id) = resource.get("id") {
        row.insert("id".to_string(), id.clone());
    }
    if let Some(JsonValue::Object(attributes)) = resource.get("attributes") {
        for (key, value) in attributes {
            row.insert(key.clone(), value.clone());
        }
    }
    if let Some(JsonValue::Object(relationships)) = resource.get("relationships") {
        for (name, relationship) in relationships {
            let Some(id) = relationship.get("data").and_then(|data| data.get("id")) else {
                continue;
            };
            row.entry(format!("{name}Id")).or_insert_with(|| id.clone());
        }
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flattens_attributes_and_relationship_ids() {
        let page = parse_page(&json!({
            "data": [{
                "type": "prospect",
                "id": 42,
                "attributes": {"firstName": "Ada", "openCount": 3},
                "relationships": {
                    "account": {"data": {"type": "account", "id": 7}},
                    "owner": {"data": null},
                    "sequenceStates": {"data": [{"type": "sequenceState", "id": 1}]}
                }
            }],
            "metadata": {"count": 1}
        }))
        .unwrap();

        assert_eq!(page.total_count, Some(1));
        let row = &page.rows[0];
        assert_eq!(row["id"], 42);
        assert_eq!(row["firstName"], "Ada");
        assert_eq!(row["accountId"], 7);
        assert!(!row.contains_key("ownerId"));
        assert!(!row.contains_key("sequenceStatesId"));
    }

    #[test]
    fn missing_count_is_none() {
        let page = parse_page(&json!({"data": []})).unwrap();
        assert_eq!(page.total_count, None);
    }

    #[test]
    fn non_array_data_is_transient() {
        let err = parse_page(&json!({"errors": [{"title": "oops"}]})).unwrap_err();
        assert!(err.is_transient());
    }
}
