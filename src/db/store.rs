//! Permanent claims table, independent of cache freshness.

use chrono::{DateTime, TimeZone, Utc};
use sqlx::Row;
use tracing::instrument;

use super::repo::Pool;
use crate::errors::PersistenceError;
use crate::mapping::Claim;
use crate::model::DateRange;

#[derive(Debug, Clone)]
pub struct ClaimsStore {
    pool: Pool,
}

impl ClaimsStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Insert or overwrite records by `(organization, account, claim id)`.
    /// Last write wins. Returns the number of rows written.
    #[instrument(skip_all, fields(claims = claims.len()))]
    pub async fn upsert(&self, claims: &[Claim]) -> Result<usize, PersistenceError> {
        if claims.is_empty() {
            return Ok(0);
        }
        let synced_at = Utc::now().timestamp_millis();
        let mut tx = self.pool.begin().await?;
        for claim in claims {
            let data = serde_json::to_string(claim).map_err(|source| PersistenceError::Encode {
                claim_id: claim.claim_id.clone(),
                source,
            })?;
            sqlx::query(
                "INSERT INTO claims (organization_id, integration_account_id, claim_id, order_id, return_id, \
                     status, stage, reason_id, reason_category, amount_claimed, currency, date_created, \
                     last_updated, data, synced_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
                 ON CONFLICT(organization_id, integration_account_id, claim_id) DO UPDATE SET \
                     order_id = excluded.order_id, return_id = excluded.return_id, \
                     status = excluded.status, stage = excluded.stage, \
                     reason_id = excluded.reason_id, reason_category = excluded.reason_category, \
                     amount_claimed = excluded.amount_claimed, currency = excluded.currency, \
                     date_created = excluded.date_created, last_updated = excluded.last_updated, \
                     data = excluded.data, synced_at = excluded.synced_at",
            )
            .bind(&claim.organization_id)
            .bind(&claim.integration_account_id)
            .bind(&claim.claim_id)
            .bind(&claim.identity.order_id)
            .bind(&claim.identity.return_id)
            .bind(&claim.identity.status)
            .bind(&claim.identity.stage)
            .bind(&claim.identity.reason_id)
            .bind(&claim.identity.reason_category)
            .bind(claim.financial.amount_claimed)
            .bind(&claim.financial.currency)
            .bind(claim.date_created.map(|d| d.timestamp_millis()))
            .bind(claim.last_updated.map(|d| d.timestamp_millis()))
            .bind(data)
            .bind(synced_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(claims.len())
    }

    /// Stored records of one account created within `range`, newest first.
    #[instrument(skip(self, range))]
    pub async fn list(
        &self,
        organization_id: &str,
        account_id: &str,
        range: &DateRange,
    ) -> Result<Vec<Claim>, PersistenceError> {
        let rows = sqlx::query(
            "SELECT data FROM claims \
             WHERE organization_id = ? AND integration_account_id = ? \
               AND date_created BETWEEN ? AND ? \
             ORDER BY date_created DESC, claim_id ASC",
        )
        .bind(organization_id)
        .bind(account_id)
        .bind(range.from.timestamp_millis())
        .bind(range.to.timestamp_millis())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let data: String = row.get("data");
                serde_json::from_str(&data).map_err(PersistenceError::Decode)
            })
            .collect()
    }

    /// When the record was last written, if it exists.
    pub async fn synced_at(
        &self,
        organization_id: &str,
        account_id: &str,
        claim_id: &str,
    ) -> Result<Option<DateTime<Utc>>, PersistenceError> {
        let millis: Option<i64> = sqlx::query_scalar(
            "SELECT synced_at FROM claims \
             WHERE organization_id = ? AND integration_account_id = ? AND claim_id = ?",
        )
        .bind(organization_id)
        .bind(account_id)
        .bind(claim_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(millis.and_then(|ms| Utc.timestamp_millis_opt(ms).single()))
    }
}
