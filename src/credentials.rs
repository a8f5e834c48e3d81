//! Access token and seller identity for one integration account.
//!
//! The account row comes from the local database; the decrypted token comes
//! from the internal secret-resolution endpoint. No retries: a failure here
//! is reported for the account and the sync moves on.

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::config::Config;
use crate::db::{self, Pool};
use crate::errors::CredentialError;
use crate::extract;
use crate::model::AccountCredentials;

#[async_trait]
pub trait CredentialResolver: Send + Sync {
    /// Credentials of `account_id`, which must belong to `organization_id`.
    async fn resolve(
        &self,
        organization_id: &str,
        account_id: &str,
    ) -> Result<AccountCredentials, CredentialError>;
}

#[derive(Debug, Deserialize)]
struct SecretResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    user_id: Option<serde_json::Value>,
}

#[derive(Clone)]
pub struct SecretStoreResolver {
    pool: Pool,
    http: Client,
    base_url: Url,
    token: String,
    provider: String,
    timeout: Duration,
}

impl fmt::Debug for SecretStoreResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretStoreResolver")
            .field("base_url", &self.base_url)
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}

impl SecretStoreResolver {
    pub fn new(
        pool: Pool,
        base_url: Url,
        token: String,
        provider: String,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .user_agent(concat!("claims-sync/", env!("CARGO_PKG_VERSION")))
            .no_proxy()
            .build()?;
        Ok(Self {
            pool,
            http,
            base_url,
            token,
            provider,
            timeout,
        })
    }

    pub fn from_config(pool: Pool, cfg: &Config) -> anyhow::Result<Self> {
        Ok(Self::new(
            pool,
            Url::parse(&cfg.secrets.base_url)?,
            cfg.secrets.token.clone(),
            cfg.marketplace.provider.clone(),
            Duration::from_millis(cfg.secrets.timeout_ms),
        )?)
    }

    fn resolve_url(&self) -> Result<Url, CredentialError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| CredentialError::Lookup("secret store URL cannot carry a path".into()))?
            .pop_if_empty()
            .extend(["secrets", "resolve"]);
        Ok(url)
    }

    async fn fetch_secret(&self, account_id: &str) -> Result<SecretResponse, CredentialError> {
        let unavailable = |message: String| CredentialError::SecretUnavailable {
            account: account_id.to_string(),
            message,
        };

        let res = self
            .http
            .post(self.resolve_url()?)
            .bearer_auth(&self.token)
            .timeout(self.timeout)
            .json(&json!({ "account_id": account_id, "provider": self.provider }))
            .send()
            .await
            .map_err(|err| unavailable(err.to_string()))?;

        match res.status() {
            StatusCode::NOT_FOUND => Err(CredentialError::SecretMissing(account_id.to_string())),
            status if !status.is_success() => {
                let body = res.text().await.unwrap_or_default();
                Err(unavailable(format!("status {}: {}", status, body.trim())))
            }
            _ => res
                .json::<SecretResponse>()
                .await
                .map_err(|err| unavailable(format!("invalid response: {}", err))),
        }
    }
}

#[async_trait]
impl CredentialResolver for SecretStoreResolver {
    #[instrument(skip(self))]
    async fn resolve(
        &self,
        organization_id: &str,
        account_id: &str,
    ) -> Result<AccountCredentials, CredentialError> {
        let account = db::find_account(&self.pool, account_id)
            .await
            .map_err(|err| CredentialError::Lookup(err.to_string()))?
            .filter(|a| a.organization_id == organization_id)
            .ok_or_else(|| CredentialError::UnknownAccount(account_id.to_string()))?;
        if !account.is_active {
            return Err(CredentialError::Inactive(account_id.to_string()));
        }

        let secret = self.fetch_secret(account_id).await?;
        let access_token = secret
            .access_token
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| CredentialError::SecretMissing(account_id.to_string()))?;
        let seller_id = secret
            .user_id
            .as_ref()
            .and_then(|v| extract::get::<String>(v, ""))
            .or(account.seller_id)
            .ok_or_else(|| CredentialError::MissingSellerId(account_id.to_string()))?;

        debug!(%seller_id, "credentials resolved");
        Ok(AccountCredentials {
            account_id: account.id,
            organization_id: account.organization_id,
            account_name: account.name,
            seller_id,
            access_token,
        })
    }
}
