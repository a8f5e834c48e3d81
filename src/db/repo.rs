use super::model::AccountRow;
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::instrument;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // WAL lets the cache and durable writers proceed while readers are active.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=NORMAL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// Single-connection in-memory pool with migrations applied.
pub async fn memory_pool() -> Result<Pool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

/// For file-backed SQLite URLs, expand a leading `~/` and make sure the parent
/// directory exists. In-memory and non-sqlite URLs pass through untouched.
fn prepare_sqlite_url(url: &str) -> String {
    let Some(rest) = url.strip_prefix("sqlite:") else {
        return url.to_string();
    };
    if rest.starts_with(":memory") {
        return url.to_string();
    }

    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match rest.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (rest, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(tail), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), tail),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    // Create the file on first start.
    let mut query = query_part.map(str::to_string).unwrap_or_default();
    if !query.contains("mode=") {
        if !query.is_empty() {
            query.push('&');
        }
        query.push_str("mode=rwc");
    }
    format!("sqlite://{}?{}", expanded, query)
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Insert or replace an integration account row.
#[instrument(skip_all)]
pub async fn upsert_account(pool: &Pool, account: &AccountRow) -> Result<()> {
    sqlx::query(
        "INSERT INTO integration_accounts (id, organization_id, name, provider, seller_id, is_active) \
         VALUES (?, ?, ?, ?, ?, ?) \
         ON CONFLICT(id) DO UPDATE SET organization_id = excluded.organization_id, \
             name = excluded.name, provider = excluded.provider, \
             seller_id = excluded.seller_id, is_active = excluded.is_active",
    )
    .bind(&account.id)
    .bind(&account.organization_id)
    .bind(&account.name)
    .bind(&account.provider)
    .bind(&account.seller_id)
    .bind(account.is_active)
    .execute(pool)
    .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn find_account(
    pool: &Pool,
    account_id: &str,
) -> Result<Option<AccountRow>, sqlx::Error> {
    let row = sqlx::query(
        "SELECT id, organization_id, name, provider, seller_id, is_active \
         FROM integration_accounts WHERE id = ?",
    )
    .bind(account_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| AccountRow {
        id: row.get("id"),
        organization_id: row.get("organization_id"),
        name: row.get("name"),
        provider: row.get("provider"),
        seller_id: row
            .try_get::<Option<String>, _>("seller_id")
            .ok()
            .flatten()
            .filter(|s| !s.trim().is_empty()),
        is_active: row.get("is_active"),
    }))
}

/// Organization owning an account, used for trusted background callers.
#[instrument(skip_all)]
pub async fn account_organization(
    pool: &Pool,
    account_id: &str,
) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar("SELECT organization_id FROM integration_accounts WHERE id = ?")
        .bind(account_id)
        .fetch_optional(pool)
        .await
}

#[instrument(skip_all)]
pub async fn insert_session(
    pool: &Pool,
    token: &str,
    user_id: &str,
    organization_id: &str,
    expires_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO sessions (token, user_id, organization_id, expires_at) VALUES (?, ?, ?, ?) \
         ON CONFLICT(token) DO UPDATE SET user_id = excluded.user_id, \
             organization_id = excluded.organization_id, expires_at = excluded.expires_at",
    )
    .bind(token)
    .bind(user_id)
    .bind(organization_id)
    .bind(expires_at.timestamp_millis())
    .execute(pool)
    .await?;
    Ok(())
}

/// Organization of a live session; expired or unknown tokens yield `None`.
#[instrument(skip_all)]
pub async fn session_organization(
    pool: &Pool,
    token: &str,
    now: DateTime<Utc>,
) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar("SELECT organization_id FROM sessions WHERE token = ? AND expires_at > ?")
        .bind(token)
        .bind(now.timestamp_millis())
        .fetch_optional(pool)
        .await
}
