use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::errors::SyncError;
use crate::mapping::Claim;

/// Inbound body of the sync endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    #[serde(default)]
    pub account_ids: Vec<String>,
    #[serde(default)]
    pub date_from: Option<String>,
    #[serde(default)]
    pub date_to: Option<String>,
    #[serde(default)]
    pub force_refresh: bool,
}

/// Canonical lowercase hyphenated form of an account id, or `None` when it
/// is not a UUID.
pub fn normalize_account_id(raw: &str) -> Option<String> {
    Uuid::parse_str(raw.trim()).ok().map(|id| id.to_string())
}

/// A request that passed validation: normalised account ids and a closed range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRequest {
    pub account_ids: Vec<String>,
    pub range: DateRange,
    pub force_refresh: bool,
}

impl SyncRequest {
    /// Check the request shape and complete the date range.
    ///
    /// Runs before any lookup or outbound call.
    pub fn validate(
        &self,
        now: DateTime<Utc>,
        lookback_days: i64,
    ) -> Result<ValidatedRequest, SyncError> {
        if self.account_ids.is_empty() {
            return Err(SyncError::Validation(
                "accountIds must contain at least one account".into(),
            ));
        }

        let mut account_ids: Vec<String> = Vec::with_capacity(self.account_ids.len());
        for raw in &self.account_ids {
            let id = normalize_account_id(raw)
                .ok_or_else(|| SyncError::Validation(format!("invalid account id: {:?}", raw)))?;
            if !account_ids.contains(&id) {
                account_ids.push(id);
            }
        }

        let range = DateRange::resolve(
            self.date_from.as_deref(),
            self.date_to.as_deref(),
            now,
            lookback_days,
        )?;

        Ok(ValidatedRequest {
            account_ids,
            range,
            force_refresh: self.force_refresh,
        })
    }
}

/// Closed interval of claim creation dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl DateRange {
    /// Complete a possibly partial range. A missing `to` ends today at
    /// 23:59:59.999; a missing `from` starts `lookback_days` before the end
    /// date at midnight, so a lone past `to` still yields a valid window.
    pub fn resolve(
        from: Option<&str>,
        to: Option<&str>,
        now: DateTime<Utc>,
        lookback_days: i64,
    ) -> Result<Self, SyncError> {
        let to = match to.map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => parse_bound(raw, Bound::End)
                .ok_or_else(|| SyncError::Validation(format!("invalid dateTo: {:?}", raw)))?,
            None => end_of_day(now.date_naive()),
        };
        let from = match from.map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => parse_bound(raw, Bound::Start)
                .ok_or_else(|| SyncError::Validation(format!("invalid dateFrom: {:?}", raw)))?,
            None => start_of_day(to.date_naive() - Duration::days(lookback_days)),
        };
        if from > to {
            return Err(SyncError::Validation(
                "dateFrom must not be after dateTo".into(),
            ));
        }
        Ok(Self { from, to })
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from <= at && at <= self.to
    }
}

#[derive(Clone, Copy)]
enum Bound {
    Start,
    End,
}

fn parse_bound(raw: &str, bound: Bound) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    Some(match bound {
        Bound::Start => start_of_day(date),
        Bound::End => end_of_day(date),
    })
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    start_of_day(date) + Duration::days(1) - Duration::milliseconds(1)
}

/// Where the returned claims came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Cache,
    Live,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Cache => "cache",
            Source::Live => "live",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccountWarning {
    pub account_id: String,
    pub error: String,
}

/// Successful (possibly partial) sync result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub success: bool,
    pub claims: Vec<Claim>,
    pub total: usize,
    pub source: Source,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<AccountWarning>>,
}

/// Who is asking for a sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    /// End user carrying a session token.
    Session(String),
    /// Background job presenting the internal service token.
    Internal(String),
    Anonymous,
}

/// Decrypted credentials and identity of one integration account.
#[derive(Clone, PartialEq, Eq)]
pub struct AccountCredentials {
    pub account_id: String,
    pub organization_id: String,
    pub account_name: String,
    pub seller_id: String,
    pub access_token: String,
}

impl fmt::Debug for AccountCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountCredentials")
            .field("account_id", &self.account_id)
            .field("organization_id", &self.organization_id)
            .field("account_name", &self.account_name)
            .field("seller_id", &self.seller_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const ACCOUNT: &str = "8f14e45f-ceea-467f-a8f5-0c6e2d4b1a10";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 15, 14, 30, 0).unwrap()
    }

    #[test]
    fn default_range_is_sixty_day_lookback_to_end_of_today() {
        let range = DateRange::resolve(None, None, now(), 60).unwrap();
        assert_eq!(range.from, Utc.with_ymd_and_hms(2025, 1, 14, 0, 0, 0).unwrap());
        assert_eq!(
            range.to,
            Utc.with_ymd_and_hms(2025, 3, 15, 23, 59, 59).unwrap() + Duration::milliseconds(999)
        );
    }

    #[test]
    fn partial_range_is_completed() {
        let range = DateRange::resolve(Some("2025-03-01T00:00:00Z"), None, now(), 60).unwrap();
        assert_eq!(range.from, Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap());
        assert_eq!(range.to.date_naive(), now().date_naive());

        let range = DateRange::resolve(None, Some("2025-02-01"), now(), 60).unwrap();
        assert_eq!(range.from, Utc.with_ymd_and_hms(2024, 12, 3, 0, 0, 0).unwrap());
        assert_eq!(
            range.to,
            Utc.with_ymd_and_hms(2025, 2, 1, 23, 59, 59).unwrap() + Duration::milliseconds(999)
        );
    }

    #[test]
    fn lone_end_date_older_than_lookback_is_valid() {
        let range =
            DateRange::resolve(None, Some("2024-12-01T00:00:00Z"), now(), 60).unwrap();
        assert_eq!(range.to, Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap());
        assert_eq!(range.from, Utc.with_ymd_and_hms(2024, 10, 2, 0, 0, 0).unwrap());

        let request = SyncRequest {
            account_ids: vec![ACCOUNT.into()],
            date_to: Some("2024-12-01".into()),
            ..Default::default()
        };
        assert!(request.validate(now(), 60).is_ok());
    }

    #[test]
    fn offsets_are_normalised_to_utc() {
        let range = DateRange::resolve(
            Some("2025-01-01T00:00:00-03:00"),
            Some("2025-01-31T23:59:59Z"),
            now(),
            60,
        )
        .unwrap();
        assert_eq!(range.from, Utc.with_ymd_and_hms(2025, 1, 1, 3, 0, 0).unwrap());
        assert!(range.contains(Utc.with_ymd_and_hms(2025, 1, 31, 23, 59, 59).unwrap()));
        assert!(!range.contains(Utc.with_ymd_and_hms(2025, 1, 1, 2, 59, 59).unwrap()));
    }

    #[test]
    fn rejects_unparseable_and_inverted_ranges() {
        assert!(matches!(
            DateRange::resolve(Some("yesterday"), None, now(), 60),
            Err(SyncError::Validation(msg)) if msg.contains("dateFrom")
        ));
        assert!(matches!(
            DateRange::resolve(None, Some("2025-13-45"), now(), 60),
            Err(SyncError::Validation(msg)) if msg.contains("dateTo")
        ));
        assert!(matches!(
            DateRange::resolve(Some("2025-02-01"), Some("2025-01-01"), now(), 60),
            Err(SyncError::Validation(_))
        ));
    }

    #[test]
    fn account_ids_normalise_to_lowercase() {
        assert_eq!(
            normalize_account_id(" 3F2B8C1E-6A57-4D2B-9B1E-5D0C7E4F8A21 ").as_deref(),
            Some("3f2b8c1e-6a57-4d2b-9b1e-5d0c7e4f8a21")
        );
        assert_eq!(normalize_account_id("not-an-id"), None);

        let mixed = SyncRequest {
            account_ids: vec![ACCOUNT.to_uppercase(), ACCOUNT.into()],
            ..Default::default()
        };
        assert_eq!(mixed.validate(now(), 60).unwrap().account_ids, vec![ACCOUNT.to_string()]);
    }

    #[test]
    fn validate_requires_well_formed_accounts() {
        let empty = SyncRequest::default();
        assert!(matches!(empty.validate(now(), 60), Err(SyncError::Validation(_))));

        let bad = SyncRequest {
            account_ids: vec![ACCOUNT.into(), "not-an-id".into()],
            ..Default::default()
        };
        assert!(matches!(
            bad.validate(now(), 60),
            Err(SyncError::Validation(msg)) if msg.contains("not-an-id")
        ));
    }

    #[test]
    fn validate_normalises_and_dedupes_accounts() {
        let req = SyncRequest {
            account_ids: vec![ACCOUNT.to_uppercase(), format!(" {} ", ACCOUNT)],
            force_refresh: true,
            ..Default::default()
        };
        let validated = req.validate(now(), 60).unwrap();
        assert_eq!(validated.account_ids, vec![ACCOUNT.to_string()]);
        assert!(validated.force_refresh);
    }

    #[test]
    fn request_uses_camel_case_wire_names() {
        let req: SyncRequest = serde_json::from_str(
            r#"{"accountIds":["a"],"dateFrom":"2025-01-01","forceRefresh":true}"#,
        )
        .unwrap();
        assert_eq!(req.account_ids, vec!["a".to_string()]);
        assert_eq!(req.date_from.as_deref(), Some("2025-01-01"));
        assert!(req.date_to.is_none());
        assert!(req.force_refresh);
    }

    #[test]
    fn credentials_debug_hides_token() {
        let creds = AccountCredentials {
            account_id: "a".into(),
            organization_id: "o".into(),
            account_name: "Store".into(),
            seller_id: "123".into(),
            access_token: "APP_USR-secret".into(),
        };
        let rendered = format!("{:?}", creds);
        assert!(!rendered.contains("APP_USR-secret"));
        assert!(rendered.contains("seller_id"));
    }
}
