//! Configuration loading for the CRM sync engine.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `CRM_SYNC_`, producing a typed [`AppConfig`].

use std::{collections::BTreeMap, env, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const ENV_PREFIX: &str = "CRM_SYNC_";
const REDACTED: &str = "[REDACTED]";

/// Application configuration derived from `CRM_SYNC_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_acquire_timeout_ms")]
    pub db_acquire_timeout_ms: u64,
    #[serde(default = "OAuthClientConfig::salesforce")]
    pub salesforce: OAuthClientConfig,
    #[serde(default = "default_salesforce_api_version")]
    pub salesforce_api_version: String,
    #[serde(default = "OAuthClientConfig::outreach")]
    pub outreach: OAuthClientConfig,
    #[serde(default = "OAuthClientConfig::google_calendar")]
    pub google_calendar: OAuthClientConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

/// OAuth client registration and API location for one provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct OAuthClientConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub redirect_uri: String,
    pub token_url: String,
    pub api_base: String,
}

impl OAuthClientConfig {
    fn salesforce() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: String::new(),
            token_url: "https://login.salesforce.com/services/oauth2/token".to_string(),
            // Salesforce data calls go to the per-org instance url stored in the credential.
            api_base: String::new(),
        }
    }

    fn outreach() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: String::new(),
            token_url: "https://api.outreach.io/oauth/token".to_string(),
            api_base: "https://api.outreach.io/api/v2".to_string(),
        }
    }

    fn google_calendar() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: String::new(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            api_base: "https://www.googleapis.com/calendar/v3".to_string(),
        }
    }

    /// Returns `(client_id, client_secret)` when both are configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.client_id.as_deref(), self.client_secret.as_deref()) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => Some((id, secret)),
            _ => None,
        }
    }

    fn apply_layer(&mut self, layered: &mut BTreeMap<String, String>, prefix: &str) {
        if let Some(value) = take_non_empty(layered, &format!("{prefix}_CLIENT_ID")) {
            self.client_id = Some(value);
        }
        if let Some(value) = take_non_empty(layered, &format!("{prefix}_CLIENT_SECRET")) {
            self.client_secret = Some(value);
        }
        if let Some(value) = take_non_empty(layered, &format!("{prefix}_REDIRECT_URI")) {
            self.redirect_uri = value;
        }
        if let Some(value) = take_non_empty(layered, &format!("{prefix}_TOKEN_URL")) {
            self.token_url = value;
        }
        if let Some(value) = take_non_empty(layered, &format!("{prefix}_API_BASE")) {
            self.api_base = value;
        }
    }

    fn redact(&mut self) {
        if self.client_id.is_some() {
            self.client_id = Some(REDACTED.to_string());
        }
        if self.client_secret.is_some() {
            self.client_secret = Some(REDACTED.to_string());
        }
    }
}

/// Tuning knobs for the sync loop, fetch retries and credential refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SyncConfig {
    /// Rows requested per page and flushed per multi-row write (default: 100)
    ///
    /// Environment variable: `CRM_SYNC_SYNC_BATCH_SIZE`
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,

    /// Per-row probability of persisting checkpoint progress mid-page (default: 0.01)
    ///
    /// Environment variable: `CRM_SYNC_SYNC_CHECKPOINT_PROBABILITY`
    #[serde(default = "default_checkpoint_probability")]
    pub checkpoint_probability: f64,

    /// Guard band before token expiry that triggers a refresh (default: 30)
    ///
    /// Environment variable: `CRM_SYNC_SYNC_REFRESH_SLACK_SECONDS`
    #[serde(default = "default_refresh_slack_seconds")]
    pub refresh_slack_seconds: u64,

    /// Attempts per fetch before a transient failure is surfaced (default: 5)
    ///
    /// Environment variable: `CRM_SYNC_SYNC_FETCH_MAX_ATTEMPTS`
    #[serde(default = "default_fetch_max_attempts")]
    pub fetch_max_attempts: u32,

    /// First retry delay in milliseconds, doubled per attempt (default: 500)
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Ceiling for a single retry delay in seconds (default: 8)
    #[serde(default = "default_backoff_max_seconds")]
    pub backoff_max_seconds: u64,

    /// Random fraction added on top of each retry delay (default: 0.1)
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,

    /// Sleep between bulk job status polls in milliseconds (default: 10000)
    #[serde(default = "default_bulk_poll_interval_ms")]
    pub bulk_poll_interval_ms: u64,

    /// Status polls before a bulk job is given up as stuck (default: 60)
    #[serde(default = "default_bulk_max_polls")]
    pub bulk_max_polls: u32,

    /// Per-request HTTP timeout in seconds (default: 30)
    #[serde(default = "default_http_timeout_seconds")]
    pub http_timeout_seconds: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            checkpoint_probability: default_checkpoint_probability(),
            refresh_slack_seconds: default_refresh_slack_seconds(),
            fetch_max_attempts: default_fetch_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_seconds: default_backoff_max_seconds(),
            jitter_factor: default_jitter_factor(),
            bulk_poll_interval_ms: default_bulk_poll_interval_ms(),
            bulk_max_polls: default_bulk_max_polls(),
            http_timeout_seconds: default_http_timeout_seconds(),
        }
    }
}

impl SyncConfig {
    /// Validate sync configuration bounds
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 || self.batch_size > 10_000 {
            return Err(ConfigError::InvalidBatchSize {
                value: self.batch_size,
            });
        }

        if !(0.0..=1.0).contains(&self.checkpoint_probability) {
            return Err(ConfigError::InvalidCheckpointProbability {
                value: self.checkpoint_probability,
            });
        }

        if self.refresh_slack_seconds > 300 {
            return Err(ConfigError::InvalidRefreshSlack {
                value: self.refresh_slack_seconds,
            });
        }

        if self.fetch_max_attempts == 0 || self.fetch_max_attempts > 10 {
            return Err(ConfigError::InvalidFetchAttempts {
                value: self.fetch_max_attempts,
            });
        }

        if self.backoff_max_seconds == 0 || self.backoff_max_seconds > 60 {
            return Err(ConfigError::InvalidBackoffCeiling {
                value: self.backoff_max_seconds,
            });
        }

        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ConfigError::InvalidJitter {
                value: self.jitter_factor,
            });
        }

        if self.bulk_max_polls == 0 {
            return Err(ConfigError::InvalidBulkPolls);
        }

        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            database_url: default_database_url(),
            db_max_connections: default_db_max_connections(),
            db_acquire_timeout_ms: default_db_acquire_timeout_ms(),
            salesforce: OAuthClientConfig::salesforce(),
            salesforce_api_version: default_salesforce_api_version(),
            outreach: OAuthClientConfig::outreach(),
            google_calendar: OAuthClientConfig::google_calendar(),
            sync: SyncConfig::default(),
        }
    }
}

impl AppConfig {
    /// Returns a redacted JSON representation (secrets are redacted).
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        let mut config = self.clone();
        config.salesforce.redact();
        config.outreach.redact();
        config.google_calendar.redact();
        if let Some((scheme, _)) = config.database_url.split_once("://")
            && !scheme.starts_with("sqlite")
        {
            config.database_url = format!("{scheme}://{REDACTED}");
        }
        serde_json::to_string_pretty(&config)
    }

    /// Validates the configuration, returning an error if settings are out of bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_url.trim().is_empty() {
            return Err(ConfigError::MissingDatabaseUrl);
        }

        if !matches!(self.log_format.as_str(), "json" | "pretty") {
            return Err(ConfigError::InvalidLogFormat {
                value: self.log_format.clone(),
            });
        }

        if self.salesforce_api_version.parse::<f32>().is_err() {
            return Err(ConfigError::InvalidSalesforceApiVersion {
                value: self.salesforce_api_version.clone(),
            });
        }

        self.sync.validate()?;

        Ok(())
    }
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn is_scratch_profile(profile: &str) -> bool {
    matches!(profile, "local" | "test")
}

fn default_database_url() -> String {
    "sqlite::memory:".to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_acquire_timeout_ms() -> u64 {
    5000
}

fn default_salesforce_api_version() -> String {
    "58.0".to_string()
}

fn default_batch_size() -> u64 {
    100
}

fn default_checkpoint_probability() -> f64 {
    0.01
}

fn default_refresh_slack_seconds() -> u64 {
    30
}

fn default_fetch_max_attempts() -> u32 {
    5
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_max_seconds() -> u64 {
    8
}

fn default_jitter_factor() -> f64 {
    0.1
}

fn default_bulk_poll_interval_ms() -> u64 {
    10_000
}

fn default_bulk_max_polls() -> u32 {
    60
}

fn default_http_timeout_seconds() -> u64 {
    30
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("invalid value '{value}' for {key}")]
    InvalidNumber { key: String, value: String },
    #[error("database url is missing; set CRM_SYNC_DATABASE_URL (required outside the local and test profiles)")]
    MissingDatabaseUrl,
    #[error("log format must be 'json' or 'pretty', got '{value}'")]
    InvalidLogFormat { value: String },
    #[error("salesforce api version must look like '58.0', got '{value}'")]
    InvalidSalesforceApiVersion { value: String },
    #[error("sync batch size must be between 1 and 10000, got {value}")]
    InvalidBatchSize { value: u64 },
    #[error("checkpoint probability must be between 0.0 and 1.0, got {value}")]
    InvalidCheckpointProbability { value: f64 },
    #[error("refresh slack must not exceed 300 seconds, got {value}")]
    InvalidRefreshSlack { value: u64 },
    #[error("fetch max attempts must be between 1 and 10, got {value}")]
    InvalidFetchAttempts { value: u32 },
    #[error("backoff ceiling must be between 1 and 60 seconds, got {value}")]
    InvalidBackoffCeiling { value: u64 },
    #[error("jitter factor must be between 0.0 and 1.0, got {value}")]
    InvalidJitter { value: f64 },
    #[error("bulk max polls must be at least 1")]
    InvalidBulkPolls,
}

fn take_non_empty(layered: &mut BTreeMap<String, String>, key: &str) -> Option<String> {
    layered
        .remove(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn take_parsed<T: std::str::FromStr>(
    layered: &mut BTreeMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match take_non_empty(layered, key) {
        Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidNumber {
            key: format!("{ENV_PREFIX}{key}"),
            value: raw,
        }),
        None => Ok(default),
    }
}

/// Loads configuration using layered `.env` files and `CRM_SYNC_*` env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Loads `.env` layers, overlays the process environment and validates the result.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        // Overlay process environment last so it wins.
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                layered.insert(stripped.to_string(), value);
            }
        }

        let profile = take_non_empty(&mut layered, "PROFILE").unwrap_or(profile_hint);
        let log_level = take_non_empty(&mut layered, "LOG_LEVEL").unwrap_or_else(default_log_level);
        let log_format =
            take_non_empty(&mut layered, "LOG_FORMAT").unwrap_or_else(default_log_format);
        // Only local and test runs may fall back to an in-memory database.
        let database_url = take_non_empty(&mut layered, "DATABASE_URL").unwrap_or_else(|| {
            if is_scratch_profile(&profile) {
                default_database_url()
            } else {
                String::new()
            }
        });
        let db_max_connections = take_parsed(
            &mut layered,
            "DB_MAX_CONNECTIONS",
            default_db_max_connections(),
        )?;
        let db_acquire_timeout_ms = take_parsed(
            &mut layered,
            "DB_ACQUIRE_TIMEOUT_MS",
            default_db_acquire_timeout_ms(),
        )?;

        let mut salesforce = OAuthClientConfig::salesforce();
        salesforce.apply_layer(&mut layered, "SALESFORCE");
        let salesforce_api_version = take_non_empty(&mut layered, "SALESFORCE_API_VERSION")
            .unwrap_or_else(default_salesforce_api_version);

        let mut outreach = OAuthClientConfig::outreach();
        outreach.apply_layer(&mut layered, "OUTREACH");

        let mut google_calendar = OAuthClientConfig::google_calendar();
        google_calendar.apply_layer(&mut layered, "GOOGLE_CALENDAR");

        let sync = SyncConfig {
            batch_size: take_parsed(&mut layered, "SYNC_BATCH_SIZE", default_batch_size())?,
            checkpoint_probability: take_parsed(
                &mut layered,
                "SYNC_CHECKPOINT_PROBABILITY",
                default_checkpoint_probability(),
            )?,
            refresh_slack_seconds: take_parsed(
                &mut layered,
                "SYNC_REFRESH_SLACK_SECONDS",
                default_refresh_slack_seconds(),
            )?,
            fetch_max_attempts: take_parsed(
                &mut layered,
                "SYNC_FETCH_MAX_ATTEMPTS",
                default_fetch_max_attempts(),
            )?,
            backoff_base_ms: take_parsed(
                &mut layered,
                "SYNC_BACKOFF_BASE_MS",
                default_backoff_base_ms(),
            )?,
            backoff_max_seconds: take_parsed(
                &mut layered,
                "SYNC_BACKOFF_MAX_SECONDS",
                default_backoff_max_seconds(),
            )?,
            jitter_factor: take_parsed(
                &mut layered,
                "SYNC_JITTER_FACTOR",
                default_jitter_factor(),
            )?,
            bulk_poll_interval_ms: take_parsed(
                &mut layered,
                "SYNC_BULK_POLL_INTERVAL_MS",
                default_bulk_poll_interval_ms(),
            )?,
            bulk_max_polls: take_parsed(
                &mut layered,
                "SYNC_BULK_MAX_POLLS",
                default_bulk_max_polls(),
            )?,
            http_timeout_seconds: take_parsed(
                &mut layered,
                "SYNC_HTTP_TIMEOUT_SECONDS",
                default_http_timeout_seconds(),
            )?,
        };

        let config = AppConfig {
            profile,
            log_level,
            log_format,
            database_url,
            db_max_connections,
            db_acquire_timeout_ms,
            salesforce,
            salesforce_api_version,
            outreach,
            google_calendar,
            sync,
        };

        config.validate()?;
        Ok(config)
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var(format!("{ENV_PREFIX}PROFILE"))
            .ok()
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sync.batch_size, 100);
        assert_eq!(config.outreach.api_base, "https://api.outreach.io/api/v2");
    }

    #[test]
    fn sync_bounds_are_enforced() {
        let mut sync = SyncConfig {
            batch_size: 0,
            ..SyncConfig::default()
        };
        assert!(matches!(
            sync.validate(),
            Err(ConfigError::InvalidBatchSize { value: 0 })
        ));

        sync.batch_size = 100;
        sync.checkpoint_probability = 1.5;
        assert!(sync.validate().is_err());

        sync.checkpoint_probability = 1.0;
        sync.fetch_max_attempts = 11;
        assert!(matches!(
            sync.validate(),
            Err(ConfigError::InvalidFetchAttempts { value: 11 })
        ));

        sync.fetch_max_attempts = 10;
        sync.backoff_max_seconds = 0;
        assert!(sync.validate().is_err());

        sync.backoff_max_seconds = 8;
        assert!(sync.validate().is_ok());
    }

    #[test]
    fn unknown_log_format_rejected() {
        let config = AppConfig {
            log_format: "xml".to_string(),
            ..AppConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidLogFormat { .. })
        ));
    }

    #[test]
    fn provider_credentials_require_both_halves() {
        let mut oauth = OAuthClientConfig::outreach();
        assert!(oauth.credentials().is_none());
        oauth.client_id = Some("id".to_string());
        assert!(oauth.credentials().is_none());
        oauth.client_secret = Some("secret".to_string());
        assert_eq!(oauth.credentials(), Some(("id", "secret")));
    }

    #[test]
    fn redacted_json_masks_client_secrets() {
        let mut config = AppConfig::default();
        config.outreach.client_id = Some("visible-id".to_string());
        config.outreach.client_secret = Some("super-secret".to_string());
        config.database_url = "postgres://user:pw@db:5432/warehouse".to_string();

        let json = config.redacted_json().unwrap();
        assert!(!json.contains("super-secret"));
        assert!(!json.contains("visible-id"));
        assert!(!json.contains("user:pw"));
        assert!(json.contains(REDACTED));
    }
}
