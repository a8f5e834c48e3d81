//! Error taxonomy of the sync pipeline.
//!
//! Request-level failures (`SyncError`) abort the whole request. Everything
//! else is scoped to the account (`AccountError`) or degrades silently.

use std::time::Duration;
use thiserror::Error;

/// Outbound call failure after the retry policy gave up.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{url} answered {status} after {attempts} attempt(s)")]
    Status {
        url: String,
        status: u16,
        attempts: u32,
    },
    #[error("{url} timed out after {attempts} attempt(s)")]
    Timeout { url: String, attempts: u32 },
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("invalid JSON from {url}: {message}")]
    Decode { url: String, message: String },
}

impl FetchError {
    /// HTTP status of the last attempt, when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Account credentials could not be produced.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("integration account {0} not found")]
    UnknownAccount(String),
    #[error("integration account {0} is inactive")]
    Inactive(String),
    #[error("no stored access token for account {0}")]
    SecretMissing(String),
    #[error("secret store could not resolve account {account}: {message}")]
    SecretUnavailable { account: String, message: String },
    #[error("integration account {0} has no seller identity")]
    MissingSellerId(String),
    #[error("account lookup failed: {0}")]
    Lookup(String),
}

/// Cache or durable store write/read failure.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("failed to encode claim {claim_id}: {source}")]
    Encode {
        claim_id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to decode stored claim: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Failure isolated to one account; reported as a warning.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error("listing failed: {0}")]
    Listing(#[from] FetchError),
}

/// Failure of the request as a whole.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Auth(String),
    #[error("sync did not finish within {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("internal error: {0}")]
    Internal(String),
}

impl SyncError {
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::Validation(_) => "VALIDATION_ERROR",
            SyncError::Auth(_) => "UNAUTHORIZED",
            SyncError::Timeout(_) => "SYNC_TIMEOUT",
            SyncError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        SyncError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_error_messages_name_the_cause() {
        let err: AccountError = CredentialError::Inactive("acc-1".into()).into();
        assert_eq!(err.to_string(), "integration account acc-1 is inactive");

        let err: AccountError = FetchError::Status {
            url: "https://api/claims".into(),
            status: 500,
            attempts: 3,
        }
        .into();
        assert_eq!(
            err.to_string(),
            "listing failed: https://api/claims answered 500 after 3 attempt(s)"
        );
    }

    #[test]
    fn sync_error_codes() {
        assert_eq!(SyncError::Validation("x".into()).code(), "VALIDATION_ERROR");
        assert_eq!(SyncError::Auth("x".into()).code(), "UNAUTHORIZED");
        assert_eq!(
            SyncError::Timeout(Duration::from_secs(120)).to_string(),
            "sync did not finish within 120s"
        );
    }
}
