//! Canonical claim record and the field mapper that produces it.
//!
//! The record is composed of eight independent groups. Each group reads the
//! enriched bundle through [`Sources`] and owns its own fields; groups may call
//! each other's pure helpers but never share state, so their order does not
//! matter. Every field is always serialised: missing data is `null` (or an
//! empty list), never an absent key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Heuristics;
use crate::enrich::EnrichedClaim;
use crate::extract;

pub mod communication;
pub mod context;
pub mod financial;
pub mod identity;
pub mod pack;
pub mod quality;
pub mod raw;
pub mod tracking;

pub use communication::CommunicationFields;
pub use context::ContextFields;
pub use financial::FinancialFields;
pub use identity::{IdentityFields, ReasonInfo};
pub use pack::PackFields;
pub use quality::QualityFields;
pub use raw::RawPayloads;
pub use tracking::{TrackingEvent, TrackingFields};

/// One canonical claim, unique per `(organization_id, integration_account_id, claim_id)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claim {
    pub organization_id: String,
    pub integration_account_id: String,
    pub account_name: String,
    pub claim_id: String,
    pub date_created: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub identity: IdentityFields,
    #[serde(flatten)]
    pub financial: FinancialFields,
    #[serde(flatten)]
    pub communication: CommunicationFields,
    #[serde(flatten)]
    pub tracking: TrackingFields,
    #[serde(flatten)]
    pub context: ContextFields,
    #[serde(flatten)]
    pub quality: QualityFields,
    #[serde(flatten)]
    pub pack: PackFields,
    #[serde(flatten)]
    pub raw: RawPayloads,
}

/// Account the claims belong to.
#[derive(Debug, Clone, Copy)]
pub struct AccountContext<'a> {
    pub organization_id: &'a str,
    pub account_id: &'a str,
    pub account_name: &'a str,
}

/// Borrowed view over one enriched bundle.
#[derive(Debug, Clone, Copy)]
pub struct Sources<'a> {
    pub claim: &'a Value,
    pub return_details: Option<&'a Value>,
    pub order: Option<&'a Value>,
    pub shipment_history: Option<&'a Value>,
    pub messages: Option<&'a Value>,
    pub product: Option<&'a Value>,
    pub reason: Option<&'a Value>,
    pub seller: Option<&'a Value>,
    pub fetched_at: DateTime<Utc>,
}

impl<'a> Sources<'a> {
    pub fn new(enriched: &'a EnrichedClaim) -> Self {
        Self {
            claim: &enriched.claim,
            return_details: enriched.return_details.as_ref(),
            order: enriched.order.as_ref().map(|o| &o.payload),
            shipment_history: enriched
                .order
                .as_ref()
                .and_then(|o| o.shipment_history.as_ref()),
            messages: enriched.messages.as_ref(),
            product: enriched.product.as_ref(),
            reason: enriched.reason.as_ref(),
            seller: enriched.seller.as_ref(),
            fetched_at: enriched.fetched_at,
        }
    }

    pub fn claim(&self) -> Option<&'a Value> {
        Some(self.claim)
    }
}

#[derive(Debug, Clone, Default)]
pub struct FieldMapper {
    heuristics: Heuristics,
}

impl FieldMapper {
    pub fn new(heuristics: Heuristics) -> Self {
        Self { heuristics }
    }

    /// Map one enriched bundle. Pure: the same input always yields the same record.
    pub fn map(&self, enriched: &EnrichedClaim, account: &AccountContext<'_>) -> Claim {
        let src = Sources::new(enriched);
        let h = &self.heuristics;
        Claim {
            organization_id: account.organization_id.to_string(),
            integration_account_id: account.account_id.to_string(),
            account_name: account.account_name.to_string(),
            claim_id: enriched.claim_id.clone(),
            date_created: date_created(&src),
            last_updated: extract::first_present(&[
                (src.claim(), "last_updated"),
                (src.return_details, "last_updated"),
            ]),
            identity: identity::map(&src, h),
            financial: financial::map(&src),
            communication: communication::map(&src),
            tracking: tracking::map(&src),
            context: context::map(&src),
            quality: quality::map(&src, h),
            pack: pack::map(&src),
            raw: raw::map(&src),
        }
    }
}

pub(crate) fn date_created(src: &Sources<'_>) -> Option<DateTime<Utc>> {
    extract::first_present(&[
        (src.claim(), "date_created"),
        (src.return_details, "date_created"),
    ])
}

/// Hours between two instants, rounded to two decimals.
pub(crate) fn hours_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    round2((to - from).num_seconds() as f64 / 3_600.0)
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::enrich::EnrichedOrder;
    use chrono::TimeZone;
    use serde_json::json;

    pub(crate) fn fetched_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 20, 12, 0, 0).unwrap()
    }

    /// A fully populated bundle resembling a real marketplace return claim.
    pub(crate) fn full_bundle() -> EnrichedClaim {
        EnrichedClaim {
            claim_id: "5001".into(),
            claim: json!({
                "id": 5001,
                "resource": "order",
                "resource_id": 2000001,
                "type": "mediations",
                "stage": "dispute",
                "status": "opened",
                "reason_id": "PDD9939",
                "site_id": "MLB",
                "date_created": "2025-01-10T10:00:00.000-03:00",
                "last_updated": "2025-01-15T09:00:00.000-03:00",
                "related_entities": ["return"],
                "players": [
                    {"role": "complainant", "type": "buyer", "user_id": 777},
                    {
                        "role": "respondent",
                        "type": "seller",
                        "user_id": 123,
                        "available_actions": [
                            {
                                "action": "send_message_to_mediator",
                                "due_date": "2025-01-18T10:00:00.000-03:00"
                            },
                            {"action": "refund", "due_date": "2025-01-17T10:00:00.000-03:00"}
                        ]
                    },
                    {"role": "mediator", "type": "internal", "user_id": 999}
                ],
                "resolution": {
                    "reason": "item_returned",
                    "closed_by": "mediator",
                    "date_created": "2025-01-13T10:00:00.000-03:00"
                }
            }),
            return_details: Some(json!({
                "id": 9001,
                "status": "shipped",
                "type": "claim",
                "refund_amount": 150.0,
                "shipments": [
                    {
                        "shipment_id": 4001,
                        "status": "shipped",
                        "tracking_number": "BR123",
                        "carrier": "correios"
                    }
                ]
            })),
            order: Some(EnrichedOrder {
                payload: json!({
                    "id": 2000001,
                    "status": "paid",
                    "currency_id": "BRL",
                    "total_amount": 600.0,
                    "paid_amount": 620.0,
                    "pack_id": 3000001,
                    "tags": ["paid", "delivered"],
                    "shipping": {"id": 4000, "cost": 20.0},
                    "buyer": {"id": 777, "nickname": "BUYER77", "first_name": "Ana"},
                    "order_items": [
                        {
                            "item": {"id": "MLB1", "title": "Headphones"},
                            "quantity": 2,
                            "unit_price": 300.0,
                            "sale_fee": 30.0
                        }
                    ]
                }),
                shipment_history: Some(json!([
                    {
                        "status": "shipped",
                        "substatus": null,
                        "date": "2025-01-11T10:00:00.000Z",
                        "location": "Sao Paulo"
                    },
                    {
                        "status": "shipped",
                        "substatus": "delayed",
                        "date": "2025-01-12T10:00:00.000Z",
                        "location": {"city": "Campinas"}
                    },
                    {"status": "delivered", "date": "2025-01-14T10:00:00.000Z"}
                ])),
            }),
            messages: Some(json!({
                "messages": [
                    {
                        "sender_role": "complainant",
                        "message": "It arrived broken",
                        "date_created": "2025-01-10T11:00:00.000Z",
                        "attachments": [{"filename": "photo.jpg"}]
                    },
                    {
                        "sender_role": "respondent",
                        "message": "Sorry, please return it",
                        "date_created": "2025-01-10T15:00:00.000Z",
                        "date_read": "2025-01-10T16:00:00.000Z"
                    },
                    {
                        "sender_role": "mediator",
                        "message": "Return authorised",
                        "date_created": "2025-01-12T09:00:00.000Z"
                    }
                ]
            })),
            product: Some(json!({"id": "MLB1", "title": "Headphones", "category_id": "MLB1234"})),
            reason: Some(json!({
                "id": "PDD9939",
                "name": "repentant_buyer",
                "detail": "Product is different from the one described",
                "filter": {"group": ["defective_or_different"]}
            })),
            seller: Some(json!({
                "id": 123,
                "seller_reputation": {"level_id": "5_green", "power_seller_status": "gold"}
            })),
            fetched_at: fetched_at(),
        }
    }

    /// A bundle with nothing but the claim payload.
    pub(crate) fn bare_bundle(claim_id: &str) -> EnrichedClaim {
        EnrichedClaim {
            claim_id: claim_id.into(),
            claim: json!({"id": claim_id}),
            return_details: None,
            order: None,
            messages: None,
            product: None,
            reason: None,
            seller: None,
            fetched_at: fetched_at(),
        }
    }

    pub(crate) fn account() -> AccountContext<'static> {
        AccountContext {
            organization_id: "org-1",
            account_id: "acc-1",
            account_name: "Main store",
        }
    }

    /// Canonical record for persistence tests.
    pub(crate) fn sample_claim(org: &str, account: &str, id: &str) -> Claim {
        let mut bundle = full_bundle();
        bundle.claim_id = id.into();
        let ctx = AccountContext {
            organization_id: org,
            account_id: account,
            account_name: "Main store",
        };
        FieldMapper::default().map(&bundle, &ctx)
    }

    #[test]
    fn mapping_is_deterministic() {
        let mapper = FieldMapper::default();
        let bundle = full_bundle();
        let a = serde_json::to_string(&mapper.map(&bundle, &account())).unwrap();
        let b = serde_json::to_string(&mapper.map(&bundle, &account())).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn missing_data_is_null_not_absent() {
        let mapper = FieldMapper::default();
        let full = serde_json::to_value(mapper.map(&full_bundle(), &account())).unwrap();
        let bare = serde_json::to_value(mapper.map(&bare_bundle("1"), &account())).unwrap();
        let full_keys: Vec<&String> = full.as_object().unwrap().keys().collect();
        let bare_keys: Vec<&String> = bare.as_object().unwrap().keys().collect();
        assert_eq!(full_keys, bare_keys);
        assert_eq!(bare["return_id"], Value::Null);
        assert_eq!(bare["amount_refunded"], Value::Null);
        assert_eq!(bare["raw_order"], Value::Null);
        assert_eq!(bare["location_history"], json!([]));
    }

    #[test]
    fn record_survives_a_json_round_trip() {
        let claim = FieldMapper::default().map(&full_bundle(), &account());
        let text = serde_json::to_string(&claim).unwrap();
        let back: Claim = serde_json::from_str(&text).unwrap();
        assert_eq!(back, claim);

        let bare = FieldMapper::default().map(&bare_bundle("2"), &account());
        let back: Claim = serde_json::from_str(&serde_json::to_string(&bare).unwrap()).unwrap();
        assert_eq!(back, bare);
    }

    #[test]
    fn top_level_identity_is_taken_from_account_and_bundle() {
        let claim = FieldMapper::default().map(&full_bundle(), &account());
        assert_eq!(claim.organization_id, "org-1");
        assert_eq!(claim.integration_account_id, "acc-1");
        assert_eq!(claim.account_name, "Main store");
        assert_eq!(claim.claim_id, "5001");
        assert_eq!(
            claim.date_created,
            Some(Utc.with_ymd_and_hms(2025, 1, 10, 13, 0, 0).unwrap())
        );
    }
}
