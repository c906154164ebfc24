//! # Credential Refresher
//!
//! Keeps a stored OAuth credential usable: predicts expiry from the token blob
//! and exchanges the refresh token when the access token is about to lapse.
//! A failed exchange never overwrites the stored credential.

use chrono::Utc;
use metrics::counter;
use serde_json::{Map, Value as JsonValue};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::config::OAuthClientConfig;
use crate::error::SyncError;
use crate::mapper::ProviderKind;
use crate::models::credential;
use crate::repositories::CredentialRepository;

/// Millisecond timestamps are larger than any plausible second timestamp.
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Decoded view of `credentials.token_blob`.
///
/// Unknown keys are kept in `extra` and written back untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenBlob {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Lifetime in seconds; Salesforce omits it
    pub expires_in: Option<i64>,
    /// Unix seconds at which the access token was issued
    pub issued_at: Option<i64>,
    /// Per-org API host (Salesforce)
    pub instance_url: Option<String>,
    pub extra: Map<String, JsonValue>,
}

impl TokenBlob {
    pub fn from_json(value: &JsonValue) -> Result<Self, SyncError> {
        let JsonValue::Object(map) = value else {
            return Err(SyncError::Configuration(
                "token blob is not a JSON object".to_string(),
            ));
        };

        let mut extra = map.clone();
        let access_token = take_string(&mut extra, "access_token").ok_or_else(|| {
            SyncError::Configuration("token blob has no access_token".to_string())
        })?;
        let refresh_token = take_string(&mut extra, "refresh_token");
        let expires_in = take_i64(&mut extra, "expires_in");
        // Salesforce sends `issued_at` in milliseconds, Outreach sends `created_at` in seconds.
        let issued_at = take_i64(&mut extra, "issued_at");
        let created_at = take_i64(&mut extra, "created_at");
        let issued_at = issued_at.or(created_at).map(|ts| {
            if ts > MILLIS_THRESHOLD {
                ts / 1000
            } else {
                ts
            }
        });
        let instance_url = take_string(&mut extra, "instance_url");

        Ok(Self {
            access_token,
            refresh_token,
            expires_in,
            issued_at,
            instance_url,
            extra,
        })
    }

    pub fn to_json(&self) -> JsonValue {
        let mut map = self.extra.clone();
        map.insert(
            "access_token".to_string(),
            JsonValue::String(self.access_token.clone()),
        );
        if let Some(refresh_token) = &self.refresh_token {
            map.insert(
                "refresh_token".to_string(),
                JsonValue::String(refresh_token.clone()),
            );
        }
        if let Some(expires_in) = self.expires_in {
            map.insert("expires_in".to_string(), JsonValue::from(expires_in));
        }
        if let Some(issued_at) = self.issued_at {
            map.insert("issued_at".to_string(), JsonValue::from(issued_at));
        }
        if let Some(instance_url) = &self.instance_url {
            map.insert(
                "instance_url".to_string(),
                JsonValue::String(instance_url.clone()),
            );
        }
        JsonValue::Object(map)
    }

    /// Whether the token must be refreshed before use at `now` (unix seconds).
    ///
    /// A blob without `expires_in` is never predicted stale; one with a
    /// lifetime but no issue time is.
    pub fn is_near_expiry(&self, now: i64, slack_seconds: i64) -> bool {
        match (self.expires_in, self.issued_at) {
            (None, _) => false,
            (Some(_), None) => true,
            // Out-of-range timestamps are treated as expired.
            (Some(expires_in), Some(issued_at)) => issued_at
                .checked_add(expires_in)
                .and_then(|expiry| expiry.checked_sub(slack_seconds))
                .is_none_or(|refresh_at| refresh_at <= now),
        }
    }

    /// Overlays a refresh response on this blob.
    ///
    /// Providers may omit the refresh token and instance url on refresh; the
    /// stored values are kept in that case.
    pub fn merge_refresh(&self, response: TokenBlob, now: i64) -> TokenBlob {
        let mut extra = self.extra.clone();
        extra.extend(response.extra);

        TokenBlob {
            access_token: response.access_token,
            refresh_token: response.refresh_token.or_else(|| self.refresh_token.clone()),
            expires_in: response.expires_in.or(self.expires_in),
            issued_at: Some(response.issued_at.unwrap_or(now)),
            instance_url: response.instance_url.or_else(|| self.instance_url.clone()),
            extra,
        }
    }
}

fn take_string(map: &mut Map<String, JsonValue>, key: &str) -> Option<String> {
    match map.remove(key)? {
        JsonValue::String(s) if !s.is_empty() => Some(s),
        _ => None,
    }
}

fn take_i64(map: &mut Map<String, JsonValue>, key: &str) -> Option<i64> {
    match map.remove(key)? {
        JsonValue::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Refreshes one provider's credentials through its token endpoint.
#[derive(Debug, Clone)]
pub struct CredentialRefresher {
    provider: ProviderKind,
    oauth: OAuthClientConfig,
    http: reqwest::Client,
    credentials: CredentialRepository,
    slack_seconds: i64,
}

impl CredentialRefresher {
    pub fn new(
        provider: ProviderKind,
        oauth: OAuthClientConfig,
        http: reqwest::Client,
        credentials: CredentialRepository,
        slack_seconds: u64,
    ) -> Self {
        Self {
            provider,
            oauth,
            http,
            credentials,
            slack_seconds: slack_seconds as i64,
        }
    }

    /// Returns the credential unchanged when its token is still valid,
    /// otherwise refreshes and persists it first.
    pub async fn ensure_fresh(
        &self,
        credential: &credential::Model,
    ) -> Result<credential::Model, SyncError> {
        let blob = TokenBlob::from_json(&credential.token_blob)?;
        if !blob.is_near_expiry(Utc::now().timestamp(), self.slack_seconds) {
            return Ok(credential.clone());
        }

        debug!(
            credential_id = %credential.id,
            provider = self.provider.slug(),
            "Access token near expiry; refreshing"
        );
        self.refresh(credential, &blob).await
    }

    /// Refreshes regardless of the predicted expiry (the provider rejected the token).
    pub async fn force_refresh(
        &self,
        credential: &credential::Model,
    ) -> Result<credential::Model, SyncError> {
        let blob = TokenBlob::from_json(&credential.token_blob)?;
        self.refresh(credential, &blob).await
    }

    #[instrument(skip_all, fields(credential_id = %credential.id, provider = self.provider.slug()))]
    async fn refresh(
        &self,
        credential: &credential::Model,
        blob: &TokenBlob,
    ) -> Result<credential::Model, SyncError> {
        let refresh_token = blob.refresh_token.as_deref().ok_or_else(|| {
            SyncError::Configuration(format!(
                "credential {} has no refresh token",
                credential.id
            ))
        })?;
        let (client_id, client_secret) = self.oauth.credentials().ok_or_else(|| {
            SyncError::Configuration(format!(
                "{} client id/secret are not configured",
                self.provider.slug()
            ))
        })?;

        let params = [
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("redirect_uri", self.oauth.redirect_uri.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];

        let started = Instant::now();
        let response = self
            .http
            .post(&self.oauth.token_url)
            .header("Accept", "application/json")
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            counter!("credential_refresh_failure_total", "provider" => self.provider.slug())
                .increment(1);
            warn!(
                status = status.as_u16(),
                body = %body,
                "Credential refresh rejected by provider"
            );
            return Err(SyncError::CredentialRefresh {
                provider: self.provider.slug().to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let refreshed = serde_json::from_str::<JsonValue>(&body)
            .map_err(|err| err.to_string())
            .and_then(|json| TokenBlob::from_json(&json).map_err(|err| err.to_string()))
            .map_err(|reason| {
                counter!("credential_refresh_failure_total", "provider" => self.provider.slug())
                    .increment(1);
                SyncError::CredentialRefresh {
                    provider: self.provider.slug().to_string(),
                    status: status.as_u16(),
                    body: format!("unusable refresh response ({reason}): {body}"),
                }
            })?;

        let merged = blob.merge_refresh(refreshed, Utc::now().timestamp());
        let updated = self
            .credentials
            .update_token_blob(&credential.id, merged.to_json())
            .await?;

        counter!("credential_refresh_total", "provider" => self.provider.slug()).increment(1);
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Credential refreshed"
        );

        Ok(updated)
    }
}
