//! Request orchestration: validate, resolve the organization, consult the
//! cache, and on a miss list, enrich, map and persist every account.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

use crate::config::{Config, Heuristics, SyncSettings};
use crate::credentials::CredentialResolver;
use crate::db::{self, ClaimsCache, ClaimsStore, Pool};
use crate::enrich::{BatchRunner, EnrichmentOrchestrator};
use crate::errors::{AccountError, SyncError};
use crate::lister::ClaimsLister;
use crate::mapping::{AccountContext, Claim, FieldMapper};
use crate::marketplace::MarketplaceApi;
use crate::model::{
    AccountWarning, Caller, DateRange, Source, SyncRequest, SyncResponse, ValidatedRequest,
};

#[derive(Clone)]
pub struct SyncService {
    pool: Pool,
    credentials: Arc<dyn CredentialResolver>,
    lister: ClaimsLister,
    orchestrator: EnrichmentOrchestrator,
    mapper: FieldMapper,
    cache: ClaimsCache,
    store: ClaimsStore,
    lookback_days: i64,
    overall_timeout: Duration,
    internal_token: String,
}

impl SyncService {
    pub fn new(
        pool: Pool,
        api: Arc<dyn MarketplaceApi>,
        credentials: Arc<dyn CredentialResolver>,
        settings: &SyncSettings,
        heuristics: Heuristics,
        internal_token: impl Into<String>,
    ) -> Self {
        Self {
            lister: ClaimsLister::new(api.clone(), settings.page_size, settings.max_pages),
            orchestrator: EnrichmentOrchestrator::new(api, BatchRunner::new(settings.batch_size)),
            mapper: FieldMapper::new(heuristics),
            cache: ClaimsCache::new(pool.clone(), settings.cache_ttl()),
            store: ClaimsStore::new(pool.clone()),
            lookback_days: settings.default_lookback_days,
            overall_timeout: settings.overall_timeout(),
            internal_token: internal_token.into(),
            credentials,
            pool,
        }
    }

    pub fn from_config(
        pool: Pool,
        api: Arc<dyn MarketplaceApi>,
        credentials: Arc<dyn CredentialResolver>,
        cfg: &Config,
    ) -> Self {
        Self::new(
            pool,
            api,
            credentials,
            &cfg.sync,
            cfg.heuristics.clone(),
            cfg.app.internal_token.clone(),
        )
    }

    /// Deadline for the live listing and enrichment of all accounts.
    pub fn with_overall_timeout(mut self, timeout: Duration) -> Self {
        self.overall_timeout = timeout;
        self
    }

    pub fn cache(&self) -> &ClaimsCache {
        &self.cache
    }

    pub fn store(&self) -> &ClaimsStore {
        &self.store
    }

    #[instrument(
        skip_all,
        fields(accounts = request.account_ids.len(), force = request.force_refresh)
    )]
    pub async fn sync(
        &self,
        caller: &Caller,
        request: SyncRequest,
    ) -> Result<SyncResponse, SyncError> {
        let request = request.validate(Utc::now(), self.lookback_days)?;
        let organization_id = self.resolve_organization(caller, &request.account_ids).await?;

        if request.force_refresh {
            if let Err(err) = self
                .cache
                .invalidate(&organization_id, &request.account_ids)
                .await
            {
                warn!(%err, "cache invalidation failed");
            }
        } else {
            match self
                .cache
                .get(&organization_id, &request.account_ids, &request.range)
                .await
            {
                Ok(Some(hit)) => {
                    info!(claims = hit.claims.len(), "served from cache");
                    return Ok(SyncResponse {
                        success: true,
                        total: hit.claims.len(),
                        claims: hit.claims,
                        source: Source::Cache,
                        cached_at: hit.cached_at,
                        expires_at: hit.expires_at,
                        warnings: None,
                    });
                }
                Ok(None) => {}
                Err(err) => warn!(%err, "cache read failed, fetching live"),
            }
        }

        let (claims, warnings) =
            tokio::time::timeout(self.overall_timeout, self.sync_live(&organization_id, &request))
                .await
                .map_err(|_| {
                    error!(timeout = ?self.overall_timeout, "sync deadline exceeded");
                    SyncError::Timeout(self.overall_timeout)
                })?;

        let cached_at = Utc::now();
        info!(claims = claims.len(), warnings = warnings.len(), "live sync complete");
        Ok(SyncResponse {
            success: true,
            total: claims.len(),
            claims,
            source: Source::Live,
            cached_at,
            expires_at: cached_at + self.cache.ttl(),
            warnings: (!warnings.is_empty()).then_some(warnings),
        })
    }

    /// Organization owning the request: from the session, or for a trusted
    /// caller from the first requested account.
    async fn resolve_organization(
        &self,
        caller: &Caller,
        account_ids: &[String],
    ) -> Result<String, SyncError> {
        match caller {
            Caller::Session(token) => db::session_organization(&self.pool, token, Utc::now())
                .await?
                .ok_or_else(|| SyncError::Auth("invalid or expired session".into())),
            Caller::Internal(token) => {
                if token.is_empty() || *token != self.internal_token {
                    return Err(SyncError::Auth("invalid internal token".into()));
                }
                let first = account_ids
                    .first()
                    .ok_or_else(|| SyncError::Validation("no account to resolve".into()))?;
                db::account_organization(&self.pool, first)
                    .await?
                    .ok_or_else(|| SyncError::Validation(format!("unknown account {}", first)))
            }
            Caller::Anonymous => Err(SyncError::Auth("authentication required".into())),
        }
    }

    /// Accounts run one after another; a failing account becomes a warning.
    async fn sync_live(
        &self,
        organization_id: &str,
        request: &ValidatedRequest,
    ) -> (Vec<Claim>, Vec<AccountWarning>) {
        let mut claims = Vec::new();
        let mut warnings = Vec::new();
        for account_id in &request.account_ids {
            match self
                .sync_account(organization_id, account_id, &request.range)
                .await
            {
                Ok(mut produced) => claims.append(&mut produced),
                Err(err) => {
                    warn!(%account_id, %err, "account sync failed");
                    warnings.push(AccountWarning {
                        account_id: account_id.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }
        (claims, warnings)
    }

    #[instrument(skip(self, range))]
    async fn sync_account(
        &self,
        organization_id: &str,
        account_id: &str,
        range: &DateRange,
    ) -> Result<Vec<Claim>, AccountError> {
        let creds = self.credentials.resolve(organization_id, account_id).await?;
        let listed = self
            .lister
            .list_claims(&creds.seller_id, &creds.access_token, range)
            .await?;
        let enrichment = self
            .orchestrator
            .enrich(listed, &creds.seller_id, &creds.access_token)
            .await;

        let ctx = AccountContext {
            organization_id,
            account_id,
            account_name: &creds.account_name,
        };
        let claims: Vec<Claim> = enrichment
            .claims
            .iter()
            .map(|enriched| self.mapper.map(enriched, &ctx))
            .collect();

        self.persist(organization_id, account_id, &claims).await;
        Ok(claims)
    }

    /// Cache and durable writes are best effort.
    async fn persist(&self, organization_id: &str, account_id: &str, claims: &[Claim]) {
        if let Err(err) = self.cache.put(organization_id, account_id, claims).await {
            warn!(%account_id, %err, "cache write failed");
        }
        if let Err(err) = self.store.upsert(claims).await {
            warn!(%account_id, %err, "durable upsert failed");
        }
    }
}
