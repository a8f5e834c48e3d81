//! Identity and classification: ids, status, reason policy and complexity.

use serde::{Deserialize, Serialize};

use super::{communication, context, financial, Sources};
use crate::config::Heuristics;
use crate::extract;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdentityFields {
    pub order_id: Option<String>,
    pub return_id: Option<String>,
    pub claim_type: Option<String>,
    pub status: Option<String>,
    pub stage: Option<String>,
    pub return_status: Option<String>,
    pub reason_id: Option<String>,
    pub reason_category: String,
    pub reason_name: Option<String>,
    pub reason_detail: Option<String>,
    pub reason_priority: String,
    pub problem_category: String,
    /// 1 (simple) to 10 (complex).
    pub complexity_score: u8,
}

/// Classification of a claim reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReasonInfo {
    pub category: String,
    pub name: Option<String>,
    pub detail: Option<String>,
    pub priority: String,
}

pub const NOT_RECEIVED: &str = "not_received";
pub const DEFECTIVE_OR_DIFFERENT: &str = "defective_or_different";
pub const CANCELLATION: &str = "cancellation";
pub const OTHER: &str = "other";

/// Known reason id prefixes, checked in order.
const REASON_PREFIXES: &[(&str, &str)] = &[
    ("PNR", NOT_RECEIVED),
    ("PDD", DEFECTIVE_OR_DIFFERENT),
    ("CS", CANCELLATION),
];

pub fn map(src: &Sources<'_>, h: &Heuristics) -> IdentityFields {
    let claim = src.claim();
    let reason_id: Option<String> = extract::get(src.claim, "reason_id");
    let reason = classify_reason(reason_id.as_deref(), src.reason);

    IdentityFields {
        order_id: order_id(src),
        return_id: extract::first_present(&[
            (src.return_details, "id"),
            (src.return_details, "return_id"),
        ]),
        claim_type: extract::get(src.claim, "type"),
        status: extract::get(src.claim, "status"),
        stage: extract::first_present(&[(claim, "stage"), (claim, "claim_stage")]),
        return_status: extract::get_opt(src.return_details, "status"),
        problem_category: problem_category(&reason.category).to_string(),
        complexity_score: complexity_score(src, h),
        reason_id,
        reason_category: reason.category,
        reason_name: reason.name,
        reason_detail: reason.detail,
        reason_priority: reason.priority,
    }
}

/// Parent order id. The claim's `resource_id` only names an order when the
/// resource is one.
pub fn order_id(src: &Sources<'_>) -> Option<String> {
    let resource: Option<String> = extract::get(src.claim, "resource");
    let claim_order = match resource.as_deref() {
        None | Some("order") => extract::get(src.claim, "resource_id"),
        Some(_) => None,
    };
    claim_order.or_else(|| {
        extract::first_present(&[
            (src.order, "id"),
            (src.return_details, "resource_id"),
            (src.return_details, "order_id"),
        ])
    })
}

/// Reason classification: the remote reason payload wins; without one the id
/// prefix decides.
pub fn classify_reason(reason_id: Option<&str>, payload: Option<&serde_json::Value>) -> ReasonInfo {
    let fallback = prefix_category(reason_id.unwrap_or_default());
    let category = extract::first_present::<String>(&[
        (payload, "category"),
        (payload, "filter.group.0"),
    ])
    .unwrap_or_else(|| fallback.to_string());
    let priority = extract::get_opt::<String>(payload, "priority")
        .unwrap_or_else(|| priority_for(&category).to_string());

    ReasonInfo {
        name: extract::get_opt(payload, "name"),
        detail: extract::first_present(&[(payload, "detail"), (payload, "description")]),
        category,
        priority,
    }
}

pub fn prefix_category(reason_id: &str) -> &'static str {
    let id = reason_id.trim().to_ascii_uppercase();
    REASON_PREFIXES
        .iter()
        .find(|(prefix, _)| id.starts_with(prefix))
        .map(|(_, category)| *category)
        .unwrap_or(OTHER)
}

pub fn priority_for(category: &str) -> &'static str {
    match category {
        NOT_RECEIVED | DEFECTIVE_OR_DIFFERENT => "high",
        _ => "medium",
    }
}

fn problem_category(reason_category: &str) -> &'static str {
    match reason_category {
        NOT_RECEIVED => "logistics",
        DEFECTIVE_OR_DIFFERENT => "product",
        CANCELLATION => "purchase",
        _ => OTHER,
    }
}

/// Additive score from value, thread length, mediation, exchange and the
/// number of return shipments, clamped to 1..=10.
pub fn complexity_score(src: &Sources<'_>, h: &Heuristics) -> u8 {
    let mut score: u32 = 1;

    let amount = financial::amount_claimed(src).unwrap_or(0.0);
    if amount >= h.high_amount {
        score += 3;
    } else if amount >= h.medium_amount {
        score += 1;
    }

    let messages = communication::message_count(src).unwrap_or(0);
    if messages >= h.long_thread_messages {
        score += 2;
    } else if messages > h.low_communication_max {
        score += 1;
    }

    if context::is_mediation(src) {
        score += 2;
    }
    if context::is_exchange(src) {
        score += 1;
    }
    let shipments = extract::first_array(&[(src.return_details, "shipments")]).len();
    if shipments > 1 {
        score += 1;
    }

    score.clamp(1, 10) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::tests::{bare_bundle, full_bundle};
    use serde_json::json;

    #[test]
    fn reason_payload_wins_over_prefix() {
        let payload = json!({
            "name": "late",
            "detail": "Arrived late",
            "category": "delivery_issue",
            "priority": "low"
        });
        let info = classify_reason(Some("PDD1"), Some(&payload));
        assert_eq!(info.category, "delivery_issue");
        assert_eq!(info.priority, "low");
        assert_eq!(info.name.as_deref(), Some("late"));
        assert_eq!(info.detail.as_deref(), Some("Arrived late"));
    }

    #[test]
    fn reason_payload_without_category_uses_prefix_and_derived_priority() {
        let payload = json!({"name": "x"});
        let info = classify_reason(Some("PNR3430"), Some(&payload));
        assert_eq!(info.category, NOT_RECEIVED);
        assert_eq!(info.priority, "high");
        assert_eq!(info.name.as_deref(), Some("x"));
    }

    #[test]
    fn prefix_fallback_table() {
        let cases = [
            ("PNR3430", NOT_RECEIVED, "high"),
            ("PDD9939", DEFECTIVE_OR_DIFFERENT, "high"),
            ("CS101", CANCELLATION, "medium"),
            ("XYZ", OTHER, "medium"),
            ("", OTHER, "medium"),
        ];
        for (id, category, priority) in cases {
            let info = classify_reason(Some(id), None);
            assert_eq!(info.category, category, "{}", id);
            assert_eq!(info.priority, priority, "{}", id);
            assert_eq!(info.name, None);
        }
        assert_eq!(classify_reason(None, None).category, OTHER);
    }

    #[test]
    fn maps_full_bundle() {
        let bundle = full_bundle();
        let fields = map(&Sources::new(&bundle), &Heuristics::default());
        assert_eq!(fields.order_id.as_deref(), Some("2000001"));
        assert_eq!(fields.return_id.as_deref(), Some("9001"));
        assert_eq!(fields.status.as_deref(), Some("opened"));
        assert_eq!(fields.stage.as_deref(), Some("dispute"));
        assert_eq!(fields.return_status.as_deref(), Some("shipped"));
        assert_eq!(fields.reason_category, DEFECTIVE_OR_DIFFERENT);
        assert_eq!(fields.reason_priority, "high");
        assert_eq!(fields.problem_category, "product");
        // 1 + 3 (amount 600) + 1 (three messages) + 2 (mediation)
        assert_eq!(fields.complexity_score, 7);
    }

    #[test]
    fn non_order_resource_is_not_an_order_id() {
        let mut bundle = bare_bundle("1");
        bundle.claim = json!({"id": 1, "resource": "shipment", "resource_id": 42});
        let fields = map(&Sources::new(&bundle), &Heuristics::default());
        assert_eq!(fields.order_id, None);
        assert_eq!(fields.complexity_score, 1);
    }

    #[test]
    fn amount_thresholds_are_inclusive() {
        let h = Heuristics::default();
        let score_for = |amount: f64| {
            let mut bundle = bare_bundle("1");
            bundle.claim = json!({"id": 1, "amount": amount});
            complexity_score(&Sources::new(&bundle), &h)
        };
        assert_eq!(score_for(99.99), 1);
        assert_eq!(score_for(100.0), 2);
        assert_eq!(score_for(499.99), 2);
        assert_eq!(score_for(500.0), 4);
    }

    #[test]
    fn score_caps_at_ten() {
        let h = Heuristics {
            high_amount: 0.0,
            long_thread_messages: 0,
            ..Heuristics::default()
        };
        let mut bundle = full_bundle();
        bundle.return_details = Some(json!({"id": 1, "type": "change", "shipments": [{}, {}]}));
        let score = complexity_score(&Sources::new(&bundle), &h);
        assert_eq!(score, 10);
    }
}
