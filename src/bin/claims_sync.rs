use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use claims_sync::config;
use claims_sync::credentials::SecretStoreResolver;
use claims_sync::db;
use claims_sync::marketplace::MarketplaceClient;
use claims_sync::model::{normalize_account_id, Caller, DateRange, SyncRequest};
use claims_sync::sync::SyncService;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Run one forced live claims sync for the given accounts and exit"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Start of the creation-date range (RFC 3339 or YYYY-MM-DD)
    #[arg(long)]
    from: Option<String>,

    /// End of the creation-date range (RFC 3339 or YYYY-MM-DD)
    #[arg(long)]
    to: Option<String>,

    /// Integration account ids to sync
    #[arg(required = true)]
    accounts: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| cfg.database_url());
    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let api = Arc::new(MarketplaceClient::from_config(&cfg)?);
    let credentials = Arc::new(SecretStoreResolver::from_config(pool.clone(), &cfg)?);
    let service = SyncService::from_config(pool.clone(), api, credentials, &cfg);

    let request = SyncRequest {
        account_ids: args.accounts.clone(),
        date_from: args.from.clone(),
        date_to: args.to.clone(),
        force_refresh: true,
    };
    let caller = Caller::Internal(cfg.app.internal_token.clone());

    info!(accounts = args.accounts.len(), "starting one-shot sync");
    let response = match service.sync(&caller, request).await {
        Ok(response) => response,
        Err(err) => {
            error!(code = err.code(), %err, "sync failed");
            std::process::exit(1);
        }
    };

    for warning in response.warnings.iter().flatten() {
        warn!(account_id = %warning.account_id, error = %warning.error, "account degraded");
    }

    let range = DateRange::resolve(
        args.from.as_deref(),
        args.to.as_deref(),
        Utc::now(),
        cfg.sync.default_lookback_days,
    )
    .context("date range")?;
    for account_id in args.accounts.iter().filter_map(|raw| normalize_account_id(raw)) {
        let Some(organization_id) = db::account_organization(&pool, &account_id).await? else {
            continue;
        };
        let fetched = response
            .claims
            .iter()
            .filter(|c| c.integration_account_id == account_id)
            .count();
        let stored = service
            .store()
            .list(&organization_id, &account_id, &range)
            .await?
            .len();
        info!(%account_id, fetched, stored, "account summary");
    }

    info!(
        total = response.total,
        source = response.source.as_str(),
        warnings = response.warnings.as_ref().map_or(0, Vec::len),
        expires_at = %response.expires_at,
        "one-shot sync completed"
    );
    Ok(())
}
