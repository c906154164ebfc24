//! Authenticated HTTP wrapper shared by every provider adapter.
//!
//! Each call refreshes the credential when its expiry is near, sends the
//! request with a bearer token and classifies the outcome. Transient failures
//! are retried with capped exponential backoff; a 401 triggers one forced
//! refresh and one retry outside that budget.

use std::time::{Duration, Instant};

use metrics::counter;
use rand::{Rng, thread_rng};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Method, StatusCode};
use serde_json::{Value as JsonValue, json};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::mapper::ProviderKind;
use crate::models::credential;
use crate::repositories::ApiLogRepository;
use crate::token_refresh::{CredentialRefresher, TokenBlob};

/// Response bodies longer than this are truncated in `provider_api_logs`.
const LOGGED_BODY_CHARS: usize = 2_000;

/// Builds the shared HTTP client.
pub fn http_client(sync: &SyncConfig) -> Result<reqwest::Client, SyncError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(sync.http_timeout_seconds))
        .user_agent(concat!("crm-sync/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| SyncError::Configuration(format!("failed to build HTTP client: {e}")))
}

/// Capped exponential backoff with additive jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub max: Duration,
    pub jitter_factor: f64,
}

impl RetryPolicy {
    pub fn from_config(sync: &SyncConfig) -> Self {
        Self {
            max_attempts: sync.fetch_max_attempts,
            base: Duration::from_millis(sync.backoff_base_ms),
            max: Duration::from_secs(sync.backoff_max_seconds),
            jitter_factor: sync.jitter_factor,
        }
    }

    /// Delay before the next attempt after `attempts_completed` failures.
    pub fn backoff(&self, attempts_completed: u32, retry_after: Option<Duration>) -> Duration {
        let base = self.base.as_secs_f64();
        let max = self.max.as_secs_f64();
        let exponent = attempts_completed.saturating_sub(1).min(30) as i32;

        let mut backoff = (base * 2_f64.powi(exponent)).min(max);
        if let Some(retry_after) = retry_after {
            backoff = backoff.max(retry_after.as_secs_f64().min(max));
        }

        let jitter = if self.jitter_factor > 0.0 && backoff > 0.0 {
            thread_rng().gen_range(0.0..(self.jitter_factor * backoff))
        } else {
            0.0
        };

        Duration::from_secs_f64(backoff + jitter)
    }
}

/// Expected shape of a successful response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFormat {
    Json,
    Text,
}

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(&'static str, String)>,
    pub json_body: Option<JsonValue>,
    pub expect: BodyFormat,
    /// Resource label written to `provider_api_logs`
    pub label: String,
}

impl FetchRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            json_body: None,
            expect: BodyFormat::Json,
            label: String::new(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post_json(url: impl Into<String>, body: JsonValue) -> Self {
        let mut request = Self::new(Method::POST, url);
        request.json_body = Some(body);
        request
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    pub fn text(mut self) -> Self {
        self.expect = BodyFormat::Text;
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

#[derive(Debug, Clone)]
pub enum FetchBody {
    Json(JsonValue),
    Text(String),
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: FetchBody,
}

impl FetchResponse {
    pub fn json(&self) -> Result<&JsonValue, SyncError> {
        match &self.body {
            FetchBody::Json(value) => Ok(value),
            FetchBody::Text(_) => Err(SyncError::transient("expected a JSON body")),
        }
    }

    pub fn into_text(self) -> String {
        match self.body {
            FetchBody::Text(text) => text,
            FetchBody::Json(value) => value.to_string(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Outcome of a single HTTP attempt, before retry policy is applied.
enum AttemptError {
    Transient {
        message: String,
        retry_after: Option<Duration>,
    },
    AuthRejected(String),
    Fatal(SyncError),
}

impl From<SyncError> for AttemptError {
    fn from(error: SyncError) -> Self {
        match error {
            SyncError::TransientFetch(message) => AttemptError::Transient {
                message,
                retry_after: None,
            },
            other => AttemptError::Fatal(other),
        }
    }
}

/// Per-credential HTTP client; owns the current credential row.
pub struct FetchClient {
    provider: ProviderKind,
    http: reqwest::Client,
    refresher: CredentialRefresher,
    credential: credential::Model,
    retry: RetryPolicy,
    api_logs: Option<ApiLogRepository>,
}

impl FetchClient {
    pub fn new(
        provider: ProviderKind,
        http: reqwest::Client,
        refresher: CredentialRefresher,
        credential: credential::Model,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            http,
            refresher,
            credential,
            retry,
            api_logs: None,
        }
    }

    pub fn with_api_log(mut self, api_logs: ApiLogRepository) -> Self {
        self.api_logs = Some(api_logs);
        self
    }

    pub fn provider(&self) -> ProviderKind {
        self.provider
    }

    /// The credential as of the last refresh.
    pub fn credential(&self) -> &credential::Model {
        &self.credential
    }

    pub fn token(&self) -> Result<TokenBlob, SyncError> {
        TokenBlob::from_json(&self.credential.token_blob)
    }

    /// Refreshes ahead of a batch of calls, surfacing refresh failures early.
    pub async fn ensure_fresh(&mut self) -> Result<(), SyncError> {
        self.credential = self.refresher.ensure_fresh(&self.credential).await?;
        Ok(())
    }

    pub async fn send(&mut self, request: &FetchRequest) -> Result<FetchResponse, SyncError> {
        let mut transient_failures = 0u32;
        let mut auth_retried = false;

        loop {
            match self.attempt(request).await {
                Ok(response) => return Ok(response),
                Err(AttemptError::AuthRejected(message)) if !auth_retried => {
                    auth_retried = true;
                    warn!(
                        provider = self.provider.slug(),
                        credential_id = %self.credential.id,
                        resource = %request.label,
                        "Access token rejected; forcing refresh"
                    );
                    self.credential = self.refresher.force_refresh(&self.credential).await?;
                    debug!(reason = %message, "Retrying after forced refresh");
                }
                Err(AttemptError::AuthRejected(message)) => {
                    return Err(SyncError::AuthExpired(message));
                }
                Err(AttemptError::Transient {
                    message,
                    retry_after,
                }) => {
                    transient_failures += 1;
                    if transient_failures >= self.retry.max_attempts {
                        warn!(
                            provider = self.provider.slug(),
                            resource = %request.label,
                            attempts = transient_failures,
                            error = %message,
                            "Giving up after transient failures"
                        );
                        return Err(SyncError::TransientFetch(message));
                    }

                    let delay = self.retry.backoff(transient_failures, retry_after);
                    counter!("fetch_retries_total", "provider" => self.provider.slug())
                        .increment(1);
                    warn!(
                        provider = self.provider.slug(),
                        resource = %request.label,
                        attempt = transient_failures,
                        delay_ms = delay.as_millis() as u64,
                        error = %message,
                        "Transient fetch failure; backing off"
                    );
                    sleep(delay).await;
                }
                Err(AttemptError::Fatal(error)) => return Err(error),
            }
        }
    }

    async fn attempt(&mut self, request: &FetchRequest) -> Result<FetchResponse, AttemptError> {
        self.credential = self.refresher.ensure_fresh(&self.credential).await?;
        let token = self.token()?;

        let mut builder = self
            .http
            .request(request.method.clone(), &request.url)
            .bearer_auth(&token.access_token);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }
        if let Some(body) = &request.json_body {
            builder = builder.json(body);
        }

        let started = Instant::now();
        let response = match builder.send().await {
            Ok(response) => response,
            Err(err) => {
                let error = SyncError::from(err);
                self.log_call(request, None, &error.to_string(), started)
                    .await;
                return Err(error.into());
            }
        };

        let status = response.status();
        let headers = response.headers().clone();
        let text = match response.text().await {
            Ok(text) => text,
            Err(err) => {
                let error = SyncError::from(err);
                self.log_call(request, Some(status), &error.to_string(), started)
                    .await;
                return Err(error.into());
            }
        };
        self.log_call(request, Some(status), &text, started).await;

        if status.is_success() {
            let body = match request.expect {
                BodyFormat::Text => FetchBody::Text(text),
                BodyFormat::Json => match serde_json::from_str(&text) {
                    Ok(value) => FetchBody::Json(value),
                    Err(err) => {
                        return Err(AttemptError::Transient {
                            message: format!("malformed JSON from {}: {err}", request.url),
                            retry_after: None,
                        });
                    }
                },
            };
            return Ok(FetchResponse {
                status,
                headers,
                body,
            });
        }

        Err(classify_failure(status, &headers, text))
    }

    async fn log_call(
        &self,
        request: &FetchRequest,
        status: Option<StatusCode>,
        body: &str,
        started: Instant,
    ) {
        let Some(api_logs) = &self.api_logs else {
            return;
        };

        let args = json!({
            "method": request.method.as_str(),
            "url": request.url,
            "query": request.query,
        });
        let response = json!({
            "status": status.map(|s| s.as_u16()),
            "duration_ms": started.elapsed().as_millis() as u64,
            "body": truncate(body, LOGGED_BODY_CHARS),
        });

        if let Err(err) = api_logs
            .record(&self.credential.id, &request.label, args, response)
            .await
        {
            warn!(error = %err, resource = %request.label, "Failed to record provider API call");
        }
    }
}

fn classify_failure(status: StatusCode, headers: &HeaderMap, body: String) -> AttemptError {
    match status {
        StatusCode::UNAUTHORIZED => AttemptError::AuthRejected(body),
        StatusCode::GONE => AttemptError::Fatal(SyncError::SyncTokenInvalidated),
        StatusCode::TOO_MANY_REQUESTS => AttemptError::Transient {
            message: format!("rate limited: {}", truncate(&body, 200)),
            retry_after: headers
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs),
        },
        s if s.is_server_error() => AttemptError::Transient {
            message: format!("server error {}: {}", s.as_u16(), truncate(&body, 200)),
            retry_after: None,
        },
        s => AttemptError::Fatal(SyncError::unexpected_status(s.as_u16(), body)),
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            base: Duration::from_millis(500),
            max: Duration::from_secs(8),
            jitter_factor: 0.0,
        }
    }

    #[test]
    fn backoff_doubles_until_capped() {
        let policy = policy();
        assert_eq!(policy.backoff(1, None), Duration::from_millis(500));
        assert_eq!(policy.backoff(2, None), Duration::from_secs(1));
        assert_eq!(policy.backoff(3, None), Duration::from_secs(2));
        assert_eq!(policy.backoff(10, None), Duration::from_secs(8));
    }

    #[test]
    fn retry_after_is_honoured_up_to_cap() {
        let policy = policy();
        assert_eq!(
            policy.backoff(1, Some(Duration::from_secs(3))),
            Duration::from_secs(3)
        );
        assert_eq!(
            policy.backoff(1, Some(Duration::from_secs(120))),
            Duration::from_secs(8)
        );
    }

    #[test]
    fn jitter_stays_within_factor() {
        let policy = RetryPolicy {
            jitter_factor: 0.5,
            ..policy()
        };
        for _ in 0..50 {
            let delay = policy.backoff(2, None);
            assert!(delay >= Duration::from_secs(1));
            assert!(delay < Duration::from_millis(1_500));
        }
    }

    #[test]
    fn status_classification() {
        let headers = HeaderMap::new();
        assert!(matches!(
            classify_failure(StatusCode::UNAUTHORIZED, &headers, String::new()),
            AttemptError::AuthRejected(_)
        ));
        assert!(matches!(
            classify_failure(StatusCode::GONE, &headers, String::new()),
            AttemptError::Fatal(SyncError::SyncTokenInvalidated)
        ));
        assert!(matches!(
            classify_failure(StatusCode::BAD_GATEWAY, &headers, String::new()),
            AttemptError::Transient { .. }
        ));
        assert!(matches!(
            classify_failure(StatusCode::FORBIDDEN, &headers, "no".into()),
            AttemptError::Fatal(SyncError::UnexpectedProvider {
                status: Some(403),
                ..
            })
        ));
    }

    #[test]
    fn rate_limit_reads_retry_after() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, "4".parse().unwrap());
        match classify_failure(StatusCode::TOO_MANY_REQUESTS, &headers, String::new()) {
            AttemptError::Transient { retry_after, .. } => {
                assert_eq!(retry_after, Some(Duration::from_secs(4)))
            }
            _ => panic!("expected transient"),
        }
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("ééé", 2), "éé");
        assert_eq!(truncate("ab", 5), "ab");
    }
}
