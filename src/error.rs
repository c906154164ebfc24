//! Error taxonomy for the sync engine.
//!
//! Every failure a resource sync can hit is classified into one of the
//! variants below so retry policy can discriminate on the variant instead of
//! on message text.

use thiserror::Error;

use crate::mapper::MappingError;

/// Failure raised while syncing one resource.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The provider rejected a refresh-token exchange. Fatal for the attempt.
    #[error("credential refresh failed for {provider} (status {status}): {body}")]
    CredentialRefresh {
        provider: String,
        status: u16,
        body: String,
    },

    /// Malformed or temporarily unavailable response; retried with backoff.
    #[error("transient fetch error: {0}")]
    TransientFetch(String),

    /// The remote API rejected the access token despite the expiry prediction.
    #[error("access token rejected by provider: {0}")]
    AuthExpired(String),

    /// The delta-sync token is no longer valid; cursor state must be discarded.
    #[error("sync token invalidated by provider")]
    SyncTokenInvalidated,

    /// Anything else the provider returned that the engine cannot act on.
    #[error("unexpected provider error{}: {message}", .status.map(|s| format!(" (status {s})")).unwrap_or_default())]
    UnexpectedProvider {
        status: Option<u16>,
        message: String,
    },

    #[error("record mapping failed: {0}")]
    Mapping(#[from] MappingError),

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl SyncError {
    pub fn unexpected<S: Into<String>>(message: S) -> Self {
        Self::UnexpectedProvider {
            status: None,
            message: message.into(),
        }
    }

    pub fn unexpected_status<S: Into<String>>(status: u16, message: S) -> Self {
        Self::UnexpectedProvider {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn transient<S: Into<String>>(message: S) -> Self {
        Self::TransientFetch(message.into())
    }

    /// Whether the fetch client may retry the same request after a backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientFetch(_))
    }

    /// Short machine-friendly label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CredentialRefresh { .. } => "credential_refresh",
            Self::TransientFetch(_) => "transient_fetch",
            Self::AuthExpired(_) => "auth_expired",
            Self::SyncTokenInvalidated => "sync_token_invalidated",
            Self::UnexpectedProvider { .. } => "unexpected_provider",
            Self::Mapping(_) => "mapping",
            Self::Database(_) => "database",
            Self::Configuration(_) => "configuration",
        }
    }
}

impl From<anyhow::Error> for SyncError {
    fn from(error: anyhow::Error) -> Self {
        match error.downcast::<sea_orm::DbErr>() {
            Ok(db_err) => Self::Database(db_err),
            Err(other) => Self::Configuration(format!("{other:#}")),
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() || error.is_connect() || error.is_request() || error.is_body() {
            Self::TransientFetch(format!("network error: {error}"))
        } else if error.is_decode() {
            Self::TransientFetch(format!("malformed response: {error}"))
        } else {
            Self::unexpected(format!("http client error: {error}"))
        }
    }
}

/// Recognises unique-constraint violations across the supported backends.
pub fn is_unique_violation(error: &sea_orm::DbErr) -> bool {
    use sea_orm::RuntimeErr;

    const PG_UNIQUE: &str = "23505";
    const SQLITE_DUPLICATE_CODES: &[&str] = &["1555", "2067"];

    let runtime_err = match error {
        sea_orm::DbErr::Query(RuntimeErr::SqlxError(sqlx_err))
        | sea_orm::DbErr::Exec(RuntimeErr::SqlxError(sqlx_err)) => sqlx_err,
        _ => return false,
    };

    let Some(db_error) = runtime_err.as_database_error() else {
        return false;
    };

    if db_error.is_unique_violation() {
        return true;
    }

    if let Some(code) = db_error.code() {
        let code_str = code.as_ref();
        return code_str == PG_UNIQUE || SQLITE_DUPLICATE_CODES.contains(&code_str);
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_fetch_is_retryable() {
        assert!(SyncError::transient("bad json").is_transient());
        assert!(!SyncError::AuthExpired("401".into()).is_transient());
        assert!(!SyncError::SyncTokenInvalidated.is_transient());
        assert!(
            !SyncError::CredentialRefresh {
                provider: "outreach".into(),
                status: 400,
                body: "invalid_grant".into(),
            }
            .is_transient()
        );
        assert!(!SyncError::unexpected("boom").is_transient());
    }

    #[test]
    fn unexpected_display_includes_status_when_known() {
        let err = SyncError::unexpected_status(403, "forbidden");
        assert_eq!(
            err.to_string(),
            "unexpected provider error (status 403): forbidden"
        );

        let err = SyncError::unexpected("no instance url");
        assert_eq!(err.to_string(), "unexpected provider error: no instance url");
    }

    #[test]
    fn credential_refresh_error_carries_body() {
        let err = SyncError::CredentialRefresh {
            provider: "salesforce".into(),
            status: 400,
            body: r#"{"error":"invalid_grant"}"#.into(),
        };
        assert!(err.to_string().contains("invalid_grant"));
        assert_eq!(err.kind(), "credential_refresh");
    }

    #[test]
    fn anyhow_wrapping_db_error_maps_to_database() {
        let err: SyncError = anyhow::Error::new(sea_orm::DbErr::Custom("down".into())).into();
        assert!(matches!(err, SyncError::Database(_)));
    }

    #[test]
    fn non_sqlx_errors_are_not_unique_violations() {
        assert!(!is_unique_violation(&sea_orm::DbErr::Custom("x".into())));
    }
}
