use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Url;
use serde_json::Value;
use std::fmt;
use std::time::Duration;

use crate::config::Config;
use crate::errors::FetchError;
use crate::http::RetryingHttpClient;
use crate::marketplace::model::ClaimPage;

pub mod model;

/// Parameters of one claim-search page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimSearch<'a> {
    pub seller_id: &'a str,
    pub date_from: DateTime<Utc>,
    pub date_to: DateTime<Utc>,
    pub offset: u32,
    pub limit: u32,
}

/// Outbound surface of the marketplace API.
///
/// `search_claims` is a hard call; every other method is a soft sub-call that
/// yields `None` when the resource is missing or the call failed.
#[async_trait]
pub trait MarketplaceApi: Send + Sync {
    async fn search_claims(
        &self,
        query: &ClaimSearch<'_>,
        token: &str,
    ) -> Result<ClaimPage, FetchError>;

    async fn return_details(&self, claim_id: &str, token: &str) -> Option<Value>;

    async fn order(&self, order_id: &str, token: &str) -> Option<Value>;

    async fn messages(&self, claim_id: &str, token: &str) -> Option<Value>;

    async fn item(&self, item_id: &str, token: &str) -> Option<Value>;

    async fn shipment_history(&self, shipment_id: &str, token: &str) -> Option<Value>;

    async fn reason(&self, reason_id: &str, token: &str) -> Option<Value>;

    async fn seller(&self, seller_id: &str, token: &str) -> Option<Value>;
}

#[derive(Clone)]
pub struct MarketplaceClient {
    http: RetryingHttpClient,
    base_url: Url,
    list_timeout: Duration,
    enrich_timeout: Duration,
}

impl fmt::Debug for MarketplaceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarketplaceClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl MarketplaceClient {
    pub fn new(
        http: RetryingHttpClient,
        base_url: Url,
        list_timeout: Duration,
        enrich_timeout: Duration,
    ) -> Self {
        Self {
            http,
            base_url,
            list_timeout,
            enrich_timeout,
        }
    }

    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let http = RetryingHttpClient::new(cfg.retry.policy())?;
        let base_url = Url::parse(&cfg.marketplace.base_url)?;
        Ok(Self::new(
            http,
            base_url,
            cfg.sync.list_timeout(),
            cfg.sync.enrich_timeout(),
        ))
    }

    /// Base URL extended with percent-encoded path segments.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, FetchError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| FetchError::Transport {
                url: self.base_url.to_string(),
                message: "marketplace base URL cannot carry a path".into(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub fn search_url(&self, query: &ClaimSearch<'_>) -> Result<Url, FetchError> {
        let mut url = self.endpoint(&["post-purchase", "v1", "claims", "search"])?;
        url.query_pairs_mut()
            .append_pair("player_role", "respondent")
            .append_pair("player_user_id", query.seller_id)
            .append_pair(
                "date_created.from",
                &query.date_from.to_rfc3339_opts(SecondsFormat::Millis, true),
            )
            .append_pair(
                "date_created.to",
                &query.date_to.to_rfc3339_opts(SecondsFormat::Millis, true),
            )
            .append_pair("offset", &query.offset.to_string())
            .append_pair("limit", &query.limit.to_string());
        Ok(url)
    }

    async fn soft(&self, segments: &[&str], token: &str) -> Option<Value> {
        let url = self.endpoint(segments).ok()?;
        self.http
            .fetch_soft(&url, token, self.enrich_timeout)
            .await
            .filter(|v| !v.is_null())
    }
}

#[async_trait]
impl MarketplaceApi for MarketplaceClient {
    async fn search_claims(
        &self,
        query: &ClaimSearch<'_>,
        token: &str,
    ) -> Result<ClaimPage, FetchError> {
        let url = self.search_url(query)?;
        let page = self.http.fetch(&url, token, self.list_timeout).await?;
        Ok(page
            .map(|p| ClaimPage::from_payload(&p))
            .unwrap_or_default())
    }

    async fn return_details(&self, claim_id: &str, token: &str) -> Option<Value> {
        self.soft(&["post-purchase", "v2", "claims", claim_id, "returns"], token)
            .await
    }

    async fn order(&self, order_id: &str, token: &str) -> Option<Value> {
        self.soft(&["orders", order_id], token).await
    }

    async fn messages(&self, claim_id: &str, token: &str) -> Option<Value> {
        self.soft(&["post-purchase", "v1", "claims", claim_id, "messages"], token)
            .await
    }

    async fn item(&self, item_id: &str, token: &str) -> Option<Value> {
        self.soft(&["items", item_id], token).await
    }

    async fn shipment_history(&self, shipment_id: &str, token: &str) -> Option<Value> {
        self.soft(&["shipments", shipment_id, "history"], token).await
    }

    async fn reason(&self, reason_id: &str, token: &str) -> Option<Value> {
        self.soft(&["post-purchase", "v1", "claims", "reasons", reason_id], token)
            .await
    }

    async fn seller(&self, seller_id: &str, token: &str) -> Option<Value> {
        self.soft(&["users", seller_id], token).await
    }
}
