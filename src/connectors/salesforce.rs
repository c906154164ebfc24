//! Salesforce adapter
//!
//! Records are read through Bulk API 2.0 query jobs: one `queryAll` job per
//! page, polled until complete, with CSV results downloaded by following the
//! `Sforce-Locator` header. The field list comes from the sObject describe
//! call so custom fields are requested too.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};
use tokio::time::sleep;
use tracing::{debug, info};

use crate::config::{OAuthClientConfig, SyncConfig};
use crate::connectors::trait_::{FieldCatalog, FieldDescriptor, Provider, SyncTarget};
use crate::error::SyncError;
use crate::fetch::{FetchClient, FetchRequest};
use crate::mapper::{ProviderKind, ResourceSpec, Tombstone};
use crate::paginator::{
    BulkQueryPaginator, Comparison, Offset, Page, PageRequest, Paginator, ResumePoint, Row,
};

/// Field types the Bulk API cannot export as CSV.
const UNSUPPORTED_FIELD_TYPES: &[&str] = &["address", "location", "base64"];

const LOCATOR_HEADER: &str = "Sforce-Locator";

pub struct SalesforceProvider {
    oauth: OAuthClientConfig,
    api_version: String,
    poll_interval: Duration,
    max_polls: u32,
}

impl SalesforceProvider {
    pub fn new(oauth: OAuthClientConfig, api_version: impl Into<String>, sync: &SyncConfig) -> Self {
        Self {
            oauth,
            api_version: api_version.into(),
            poll_interval: Duration::from_millis(sync.bulk_poll_interval_ms),
            max_polls: sync.bulk_max_polls,
        }
    }

    /// `{instance}/services/data/v{version}` for the credential's org.
    fn data_base(&self, client: &FetchClient) -> Result<String, SyncError> {
        let token = client.token()?;
        let instance = token
            .instance_url
            .filter(|url| !url.trim().is_empty())
            .or_else(|| Some(self.oauth.api_base.clone()).filter(|url| !url.trim().is_empty()))
            .ok_or_else(|| {
                SyncError::Configuration(format!(
                    "credential {} has no Salesforce instance_url",
                    client.credential().id
                ))
            })?;
        Ok(format!(
            "{}/services/data/v{}",
            instance.trim_end_matches('/'),
            self.api_version
        ))
    }

    async fn create_job(
        &self,
        client: &mut FetchClient,
        jobs_url: &str,
        label: &str,
        soql: &str,
    ) -> Result<String, SyncError> {
        let response = client
            .send(
                &FetchRequest::post_json(
                    jobs_url,
                    json!({ "operation": "queryAll", "query": soql }),
                )
                .label(label),
            )
            .await?;

        response
            .json()?
            .get("id")
            .and_then(JsonValue::as_str)
            .map(str::to_string)
            .ok_or_else(|| SyncError::unexpected("bulk query job response carries no id"))
    }

    async fn wait_for_job(
        &self,
        client: &mut FetchClient,
        job_url: &str,
        label: &str,
    ) -> Result<(), SyncError> {
        for poll in 1..=self.max_polls {
            let response = client
                .send(&FetchRequest::get(job_url).label(label))
                .await?;
            let body = response.json()?;
            let state = body.get("state").and_then(JsonValue::as_str).unwrap_or("");

            match state {
                "JobComplete" => {
                    debug!(job_url, polls = poll, "Bulk query job complete");
                    return Ok(());
                }
                "Failed" | "Aborted" => {
                    let reason = body
                        .get("errorMessage")
                        .and_then(JsonValue::as_str)
                        .unwrap_or("no error message");
                    return Err(SyncError::unexpected(format!(
                        "bulk query job {job_url} ended in state {state}: {reason}"
                    )));
                }
                _ if poll < self.max_polls => sleep(self.poll_interval).await,
                _ => {}
            }
        }

        Err(SyncError::transient(format!(
            "bulk query job {job_url} did not complete after {} polls",
            self.max_polls
        )))
    }

    async fn download_results(
        &self,
        client: &mut FetchClient,
        job_url: &str,
        label: &str,
    ) -> Result<Vec<Row>, SyncError> {
        let results_url = format!("{job_url}/results");
        let mut rows = Vec::new();
        let mut locator: Option<String> = None;

        loop {
            let mut request = FetchRequest::get(&results_url)
                .header("Accept", "text/csv")
                .text()
                .label(label);
            if let Some(locator) = &locator {
                request = request.query("locator", locator.clone());
            }

            let response = client.send(&request).await?;
            let next = response
                .header(LOCATOR_HEADER)
                .map(str::trim)
                .filter(|value| !value.is_empty() && *value != "null")
                .map(str::to_string);

            rows.extend(parse_csv(&response.into_text())?);

            match next {
                Some(next) => locator = Some(next),
                None => return Ok(rows),
            }
        }
    }
}

#[async_trait]
impl Provider for SalesforceProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Salesforce
    }

    fn oauth(&self) -> &OAuthClientConfig {
        &self.oauth
    }

    async fn describe(
        &self,
        client: &mut FetchClient,
        target: &SyncTarget,
    ) -> Result<Option<FieldCatalog>, SyncError> {
        let url = format!(
            "{}/sobjects/{}/describe",
            self.data_base(client)?,
            target.spec.remote_name
        );
        let label = format!("{}:describe", target.resource_name);
        let response = client.send(&FetchRequest::get(url).label(label)).await?;
        Ok(Some(parse_describe(response.json()?)?))
    }

    fn paginator(
        &self,
        target: &SyncTarget,
        resume: &ResumePoint,
        batch_size: u64,
    ) -> Box<dyn Paginator> {
        let cursor_field = target.spec.cursor_field.unwrap_or("Id");
        Box::new(BulkQueryPaginator::new(cursor_field, resume, batch_size))
    }

    async fn fetch_page(
        &self,
        client: &mut FetchClient,
        target: &SyncTarget,
        catalog: Option<&FieldCatalog>,
        request: &PageRequest,
    ) -> Result<Page, SyncError> {
        let PageRequest::BulkQuery {
            cursor_field,
            comparison,
            value,
            limit,
        } = request
        else {
            return Err(SyncError::Configuration(format!(
                "salesforce cannot serve page request {request:?}"
            )));
        };

        let fields = select_fields(target.spec, catalog);
        let soql = build_soql(
            target.spec.remote_name,
            &fields,
            cursor_field,
            *comparison,
            value.as_ref(),
            *limit,
        );

        let jobs_url = format!("{}/jobs/query", self.data_base(client)?);
        let label = target.resource_name.as_str();

        let job_id = self.create_job(client, &jobs_url, label, &soql).await?;
        let job_url = format!("{jobs_url}/{job_id}");
        self.wait_for_job(client, &job_url, label).await?;
        let rows = self.download_results(client, &job_url, label).await?;

        info!(
            resource = label,
            job_id = %job_id,
            rows = rows.len(),
            "Downloaded bulk query results"
        );

        Ok(Page {
            rows,
            ..Page::default()
        })
    }
}

/// Reads `fields[].{name,type}` from an sObject describe response.
pub fn parse_describe(body: &JsonValue) -> Result<FieldCatalog, SyncError> {
    let fields = body
        .get("fields")
        .and_then(JsonValue::as_array)
        .ok_or_else(|| SyncError::transient("describe response has no fields array"))?;

    Ok(FieldCatalog {
        fields: fields
            .iter()
            .filter_map(|field| {
                Some(FieldDescriptor {
                    name: field.get("name")?.as_str()?.to_string(),
                    field_type: field
                        .get("type")
                        .and_then(JsonValue::as_str)
                        .unwrap_or("string")
                        .to_string(),
                })
            })
            .collect(),
    })
}

/// Fields to request: the exportable part of the live catalog, or the mapped
/// fields when no catalog is available. `Id` and the deletion flag always lead.
pub fn select_fields(spec: &ResourceSpec, catalog: Option<&FieldCatalog>) -> Vec<String> {
    let mut fields = vec![spec.native_id_source.to_string()];
    if let Tombstone::Flag(flag) = spec.tombstone {
        fields.push(flag.to_string());
    }
    if let Some(cursor) = spec.cursor_field {
        fields.push(cursor.to_string());
    }

    match catalog {
        Some(catalog) => fields.extend(
            catalog
                .fields
                .iter()
                .filter(|f| !UNSUPPORTED_FIELD_TYPES.contains(&f.field_type.as_str()))
                .map(|f| f.name.clone()),
        ),
        None => fields.extend(spec.source_keys()),
    }

    let mut seen = std::collections::HashSet::new();
    fields.retain(|field| seen.insert(field.clone()));
    fields
}

pub fn build_soql(
    entity: &str,
    fields: &[String],
    cursor_field: &str,
    comparison: Comparison,
    value: Option<&Offset>,
    limit: u64,
) -> String {
    let mut soql = format!("SELECT {} FROM {entity}", fields.join(", "));
    if let Some(value) = value {
        soql.push_str(&format!(
            " WHERE {cursor_field} {} '{}'",
            comparison.as_sql(),
            escape_soql(&value.to_string())
        ));
    }
    soql.push_str(&format!(" ORDER BY {cursor_field} LIMIT {limit}"));
    soql
}

fn escape_soql(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Parses a Bulk API CSV result into string-valued rows keyed by header.
pub fn parse_csv(text: &str) -> Result<Vec<Row>, SyncError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers = reader
        .headers()
        .map_err(|e| SyncError::transient(format!("malformed bulk CSV header: {e}")))?
        .clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record =
            record.map_err(|e| SyncError::transient(format!("malformed bulk CSV record: {e}")))?;
        let row: Row = headers
            .iter()
            .zip(record.iter())
            .map(|(name, value)| (name.to_string(), JsonValue::String(value.to_string())))
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::SALESFORCE_RESOURCES;

    #[test]
    fn soql_without_value_has_no_filter() {
        let soql = build_soql(
            "Account",
            &["Id".into(), "Name".into()],
            "Id",
            Comparison::Gte,
            None,
            100,
        );
        assert_eq!(soql, "SELECT Id, Name FROM Account ORDER BY Id LIMIT 100");
    }

    #[test]
    fn soql_filters_and_escapes_cursor_value() {
        let soql = build_soql(
            "Contact",
            &["Id".into()],
            "Id",
            Comparison::Gt,
            Some(&Offset::Text("003'x".into())),
            50,
        );
        assert_eq!(
            soql,
            "SELECT Id FROM Contact WHERE Id > '003\\'x' ORDER BY Id LIMIT 50"
        );
    }

    #[test]
    fn csv_rows_keep_empty_strings_for_mapper() {
        let rows = parse_csv("Id,Name,IsDeleted\n001,\"Acme, Inc\",false\n002,,true\n").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["Name"], "Acme, Inc");
        assert_eq!(rows[1]["Name"], "");
        assert_eq!(rows[1]["IsDeleted"], "true");
    }

    #[test]
    fn empty_result_body_has_no_rows() {
        assert!(parse_csv("").unwrap().is_empty());
        assert!(parse_csv("Id,Name\n").unwrap().is_empty());
    }

    #[test]
    fn select_fields_skips_unexportable_types() {
        let account = &SALESFORCE_RESOURCES[0];
        let catalog = FieldCatalog {
            fields: vec![
                FieldDescriptor {
                    name: "Id".into(),
                    field_type: "id".into(),
                },
                FieldDescriptor {
                    name: "Name".into(),
                    field_type: "string".into(),
                },
                FieldDescriptor {
                    name: "BillingAddress".into(),
                    field_type: "address".into(),
                },
                FieldDescriptor {
                    name: "Tier__c".into(),
                    field_type: "picklist".into(),
                },
            ],
        };
        let fields = select_fields(account, Some(&catalog));
        assert_eq!(fields, vec!["Id", "IsDeleted", "Name", "Tier__c"]);
    }

    #[test]
    fn describe_reads_names_and_types() {
        let catalog = parse_describe(&json!({
            "fields": [
                {"name": "Id", "type": "id"},
                {"name": "Tier__c", "type": "picklist"},
                {"label": "nameless"}
            ]
        }))
        .unwrap();
        assert_eq!(catalog.fields.len(), 2);
        assert!(catalog.fields[1].is_custom());
    }
}
