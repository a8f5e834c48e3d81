use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use claims_sync::config;
use claims_sync::credentials::SecretStoreResolver;
use claims_sync::db;
use claims_sync::handlers::{self, AppState};
use claims_sync::marketplace::MarketplaceClient;
use claims_sync::sync::SyncService;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
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
    let service = SyncService::from_config(pool, api, credentials, &cfg);
    let app = handlers::router(AppState {
        service: Arc::new(service),
    });

    let listener = tokio::net::TcpListener::bind(&cfg.app.listen_addr).await?;
    info!(addr = %cfg.app.listen_addr, "claims sync listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;

    Ok(())
}
