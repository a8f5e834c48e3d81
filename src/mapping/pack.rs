//! Pack membership, cancellation details and custom fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Sources;
use crate::extract;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PackFields {
    pub pack_id: Option<String>,
    pub is_cancellation: bool,
    pub cancel_reason: Option<String>,
    pub cancelled_by: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub order_tags: Vec<String>,
    pub custom_fields: Option<Value>,
}

pub fn map(src: &Sources<'_>) -> PackFields {
    let claim_type: Option<String> = extract::get(src.claim, "type");
    let order_status: Option<String> = extract::get_opt(src.order, "status");
    let is_cancellation = claim_type.is_some_and(|t| t.starts_with("cancel"))
        || order_status.as_deref() == Some("cancelled");

    PackFields {
        pack_id: extract::get_opt(src.order, "pack_id"),
        is_cancellation,
        cancel_reason: extract::first_present(&[
            (src.order, "cancel_detail.description"),
            (src.order, "cancel_detail.code"),
        ]),
        cancelled_by: extract::get_opt(src.order, "cancel_detail.requested_by"),
        cancelled_at: extract::get_opt(src.order, "cancel_detail.date"),
        order_tags: extract::strings(src.order, "tags"),
        custom_fields: extract::first_present(&[
            (src.claim(), "custom_fields"),
            (src.return_details, "custom_fields"),
            (src.order, "context.flows"),
        ]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::tests::{bare_bundle, full_bundle};
    use serde_json::json;

    #[test]
    fn maps_full_bundle() {
        let bundle = full_bundle();
        let p = map(&Sources::new(&bundle));
        assert_eq!(p.pack_id.as_deref(), Some("3000001"));
        assert!(!p.is_cancellation);
        assert_eq!(p.order_tags, vec!["paid".to_string(), "delivered".to_string()]);
        assert_eq!(p.custom_fields, None);
    }

    #[test]
    fn cancelled_order_carries_details() {
        let mut bundle = full_bundle();
        if let Some(order) = bundle.order.as_mut() {
            order.payload["status"] = json!("cancelled");
            order.payload["cancel_detail"] = json!({
                "code": "buyer_regrets",
                "description": "Buyer changed their mind",
                "requested_by": "buyer",
                "date": "2025-01-11T08:00:00.000Z"
            });
        }
        let p = map(&Sources::new(&bundle));
        assert!(p.is_cancellation);
        assert_eq!(p.cancel_reason.as_deref(), Some("Buyer changed their mind"));
        assert_eq!(p.cancelled_by.as_deref(), Some("buyer"));
        assert!(p.cancelled_at.is_some());
    }

    #[test]
    fn cancel_claim_type_without_order() {
        let mut bundle = bare_bundle("1");
        bundle.claim =
            json!({"id": 1, "type": "cancel_purchase", "custom_fields": {"channel": "app"}});
        let p = map(&Sources::new(&bundle));
        assert!(p.is_cancellation);
        assert!(p.order_tags.is_empty());
        assert_eq!(p.custom_fields, Some(json!({"channel": "app"})));
    }
}
