//! TTL-indexed cache of canonical claim records.
//!
//! Staleness is a read-time predicate on `ttl_expires_at`; nothing evicts
//! rows in the background. A write replaces the account's previous rows.

use chrono::{DateTime, Duration, TimeZone, Utc};
use sqlx::Row;
use tracing::{debug, instrument};

use super::repo::Pool;
use crate::errors::PersistenceError;
use crate::mapping::Claim;
use crate::model::DateRange;

/// Result of a cache hit.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedClaims {
    pub claims: Vec<Claim>,
    /// Oldest write among the returned accounts.
    pub cached_at: DateTime<Utc>,
    /// Earliest expiry among the returned accounts.
    pub expires_at: DateTime<Utc>,
}

/// Timestamps of a cache write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheWrite {
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ClaimsCache {
    pool: Pool,
    ttl: Duration,
}

impl ClaimsCache {
    pub fn new(pool: Pool, ttl: Duration) -> Self {
        Self { pool, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh claims for the given accounts, filtered to `range`.
    /// `None` (a miss) when no account has a non-expired entry.
    pub async fn get(
        &self,
        organization_id: &str,
        account_ids: &[String],
        range: &DateRange,
    ) -> Result<Option<CachedClaims>, PersistenceError> {
        self.get_at(organization_id, account_ids, range, Utc::now())
            .await
    }

    #[instrument(skip(self, account_ids, range), fields(accounts = account_ids.len()))]
    pub async fn get_at(
        &self,
        organization_id: &str,
        account_ids: &[String],
        range: &DateRange,
        now: DateTime<Utc>,
    ) -> Result<Option<CachedClaims>, PersistenceError> {
        let mut fresh_rows = 0usize;
        let mut claims = Vec::new();
        let mut cached_at: Option<i64> = None;
        let mut expires_at: Option<i64> = None;

        for account_id in account_ids {
            let rows = sqlx::query(
                "SELECT claim_data, date_created, cached_at, ttl_expires_at FROM claims_cache \
                 WHERE organization_id = ? AND integration_account_id = ? AND ttl_expires_at > ? \
                 ORDER BY position ASC",
            )
            .bind(organization_id)
            .bind(account_id)
            .bind(now.timestamp_millis())
            .fetch_all(&self.pool)
            .await?;

            fresh_rows += rows.len();
            for row in rows {
                let written: i64 = row.get("cached_at");
                let expiry: i64 = row.get("ttl_expires_at");
                cached_at = Some(cached_at.map_or(written, |c| c.min(written)));
                expires_at = Some(expires_at.map_or(expiry, |e| e.min(expiry)));

                // Undated claims are kept: the live path never drops them either.
                let date_created: Option<i64> = row.get("date_created");
                let in_range = match date_created.and_then(millis_to_utc) {
                    Some(at) => range.contains(at),
                    None => true,
                };
                if !in_range {
                    continue;
                }
                let data: String = row.get("claim_data");
                claims.push(
                    serde_json::from_str::<Claim>(&data).map_err(PersistenceError::Decode)?,
                );
            }
        }

        if fresh_rows == 0 {
            debug!("cache miss");
            return Ok(None);
        }

        let cached_at = cached_at.and_then(millis_to_utc).unwrap_or(now);
        let expires_at = expires_at.and_then(millis_to_utc).unwrap_or(now);
        debug!(claims = claims.len(), "cache hit");
        Ok(Some(CachedClaims {
            claims,
            cached_at,
            expires_at,
        }))
    }

    /// Replace the account's cached claims.
    pub async fn put(
        &self,
        organization_id: &str,
        account_id: &str,
        claims: &[Claim],
    ) -> Result<CacheWrite, PersistenceError> {
        self.put_at(organization_id, account_id, claims, Utc::now())
            .await
    }

    #[instrument(skip(self, claims), fields(claims = claims.len()))]
    pub async fn put_at(
        &self,
        organization_id: &str,
        account_id: &str,
        claims: &[Claim],
        now: DateTime<Utc>,
    ) -> Result<CacheWrite, PersistenceError> {
        let write = CacheWrite {
            cached_at: now,
            expires_at: now + self.ttl,
        };

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "DELETE FROM claims_cache WHERE organization_id = ? AND integration_account_id = ?",
        )
        .bind(organization_id)
        .bind(account_id)
        .execute(&mut *tx)
        .await?;

        for (position, claim) in claims.iter().enumerate() {
            let data = serde_json::to_string(claim).map_err(|source| PersistenceError::Encode {
                claim_id: claim.claim_id.clone(),
                source,
            })?;
            sqlx::query(
                "INSERT INTO claims_cache (organization_id, integration_account_id, claim_id, position, \
                     date_created, claim_data, cached_at, ttl_expires_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
                 ON CONFLICT(organization_id, integration_account_id, claim_id) DO UPDATE SET \
                     position = excluded.position, date_created = excluded.date_created, \
                     claim_data = excluded.claim_data, cached_at = excluded.cached_at, \
                     ttl_expires_at = excluded.ttl_expires_at",
            )
            .bind(organization_id)
            .bind(account_id)
            .bind(&claim.claim_id)
            .bind(position as i64)
            .bind(claim.date_created.map(|d| d.timestamp_millis()))
            .bind(data)
            .bind(write.cached_at.timestamp_millis())
            .bind(write.expires_at.timestamp_millis())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(write)
    }

    /// Hard-delete every entry of the given accounts. Returns deleted rows.
    #[instrument(skip(self, account_ids), fields(accounts = account_ids.len()))]
    pub async fn invalidate(
        &self,
        organization_id: &str,
        account_ids: &[String],
    ) -> Result<u64, PersistenceError> {
        let mut deleted = 0;
        for account_id in account_ids {
            deleted += sqlx::query(
                "DELETE FROM claims_cache WHERE organization_id = ? AND integration_account_id = ?",
            )
            .bind(organization_id)
            .bind(account_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        }
        Ok(deleted)
    }
}

fn millis_to_utc(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repo::memory_pool;
    use crate::mapping::tests::sample_claim;

    const ORG: &str = "org-1";

    fn range() -> DateRange {
        DateRange {
            from: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            to: Utc.with_ymd_and_hms(2025, 1, 31, 23, 59, 59).unwrap(),
        }
    }

    fn claim(account: &str, id: &str, day: u32) -> Claim {
        let mut c = sample_claim(ORG, account, id);
        c.date_created = Some(Utc.with_ymd_and_hms(2025, 1, day, 12, 0, 0).unwrap());
        c
    }

    async fn cache() -> ClaimsCache {
        ClaimsCache::new(memory_pool().await.unwrap(), Duration::minutes(5))
    }

    #[tokio::test]
    async fn put_then_get_round_trips_in_order() {
        let cache = cache().await;
        let now = Utc::now();
        let claims = vec![claim("a1", "c2", 3), claim("a1", "c1", 2)];
        let write = cache.put_at(ORG, "a1", &claims, now).await.unwrap();
        assert_eq!(write.expires_at - write.cached_at, Duration::minutes(5));

        let hit = cache
            .get_at(ORG, &["a1".into()], &range(), now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.claims, claims);
        assert_eq!(hit.cached_at.timestamp_millis(), now.timestamp_millis());
    }

    #[tokio::test]
    async fn expired_entries_are_a_miss() {
        let cache = cache().await;
        let written = Utc::now() - Duration::minutes(6);
        cache
            .put_at(ORG, "a1", &[claim("a1", "c1", 2)], written)
            .await
            .unwrap();
        let result = cache
            .get_at(ORG, &["a1".into()], &range(), Utc::now())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn hit_filters_by_requested_range() {
        let cache = cache().await;
        let now = Utc::now();
        let mut undated = claim("a1", "c3", 1);
        undated.date_created = None;
        let mut february = claim("a1", "c2", 1);
        february.date_created = Some(Utc.with_ymd_and_hms(2025, 2, 10, 0, 0, 0).unwrap());
        cache
            .put_at(ORG, "a1", &[claim("a1", "c1", 5), february, undated], now)
            .await
            .unwrap();

        let hit = cache
            .get_at(ORG, &["a1".into()], &range(), now)
            .await
            .unwrap()
            .unwrap();
        let ids: Vec<&str> = hit.claims.iter().map(|c| c.claim_id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c3"]);
    }

    #[tokio::test]
    async fn one_fresh_account_is_enough_for_a_hit() {
        let cache = cache().await;
        let now = Utc::now();
        cache
            .put_at(ORG, "a1", &[claim("a1", "c1", 5)], now)
            .await
            .unwrap();
        let hit = cache
            .get_at(ORG, &["a2".into(), "a1".into()], &range(), now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.claims.len(), 1);

        let other_org = cache
            .get_at("org-2", &["a1".into()], &range(), now)
            .await
            .unwrap();
        assert!(other_org.is_none());
    }

    #[tokio::test]
    async fn rewrite_supersedes_previous_rows() {
        let cache = cache().await;
        let now = Utc::now();
        cache
            .put_at(ORG, "a1", &[claim("a1", "c1", 5), claim("a1", "c2", 6)], now)
            .await
            .unwrap();
        cache
            .put_at(ORG, "a1", &[claim("a1", "c3", 7)], now)
            .await
            .unwrap();
        let hit = cache
            .get_at(ORG, &["a1".into()], &range(), now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.claims.len(), 1);
        assert_eq!(hit.claims[0].claim_id, "c3");
    }

    #[tokio::test]
    async fn invalidate_deletes_only_requested_accounts() {
        let cache = cache().await;
        let now = Utc::now();
        cache.put_at(ORG, "a1", &[claim("a1", "c1", 5)], now).await.unwrap();
        cache.put_at(ORG, "a2", &[claim("a2", "c2", 5)], now).await.unwrap();

        let deleted = cache.invalidate(ORG, &["a1".into()]).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(cache
            .get_at(ORG, &["a1".into()], &range(), now)
            .await
            .unwrap()
            .is_none());
        assert!(cache
            .get_at(ORG, &["a2".into()], &range(), now)
            .await
            .unwrap()
            .is_some());
    }
}
