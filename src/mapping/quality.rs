//! Internal tags, SLA timing, heuristic classifications and the seller
//! reputation snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::communication::{self, Party};
use super::{context, date_created, financial, hours_between, tracking, Sources};
use crate::config::Heuristics;
use crate::extract;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QualityFields {
    pub tags: Vec<String>,
    /// Earliest deadline among the seller's pending actions.
    pub sla_due_at: Option<DateTime<Utc>>,
    pub first_response_hours: Option<f64>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_hours: Option<f64>,
    /// `none`, `low`, `moderate` or `high`.
    pub communication_quality: String,
    /// `fast`, `normal` or `slow`; `null` while unresolved.
    pub resolution_efficiency: Option<String>,
    pub seller_reputation: Option<Value>,
    pub reputation_captured_at: Option<DateTime<Utc>>,
    pub enriched_at: DateTime<Utc>,
}

pub fn map(src: &Sources<'_>, h: &Heuristics) -> QualityFields {
    let opened_at = date_created(src);
    let thread = communication::thread(src).unwrap_or_default();
    let resolved_at: Option<DateTime<Utc>> = extract::first_present(&[
        (src.claim(), "resolution.date_created"),
        (src.claim(), "resolution.date"),
        (src.return_details, "date_closed"),
    ]);

    let first_response_hours = thread
        .iter()
        .filter(|m| m.party == Party::Seller)
        .find_map(|m| m.sent_at)
        .zip(opened_at)
        .map(|(replied, opened)| hours_between(opened, replied));
    let resolution_hours = resolved_at
        .zip(opened_at)
        .map(|(resolved, opened)| hours_between(opened, resolved));

    let seller_reputation: Option<Value> = extract::get_opt(src.seller, "seller_reputation");

    QualityFields {
        tags: tags(src, h),
        sla_due_at: sla_due_at(src),
        first_response_hours,
        resolved_at,
        resolution_hours,
        communication_quality: communication_quality(thread.len() as u32, h).to_string(),
        resolution_efficiency: resolution_hours
            .map(|hours| resolution_efficiency(hours, h).to_string()),
        reputation_captured_at: seller_reputation.as_ref().map(|_| src.fetched_at),
        seller_reputation,
        enriched_at: src.fetched_at,
    }
}

pub fn communication_quality(messages: u32, h: &Heuristics) -> &'static str {
    match messages {
        0 => "none",
        n if n <= h.low_communication_max => "low",
        n if n <= h.moderate_communication_max => "moderate",
        _ => "high",
    }
}

pub fn resolution_efficiency(hours: f64, h: &Heuristics) -> &'static str {
    if hours <= h.fast_resolution_hours {
        "fast"
    } else if hours <= h.normal_resolution_hours {
        "normal"
    } else {
        "slow"
    }
}

/// Tags in a fixed order so the output stays deterministic.
fn tags(src: &Sources<'_>, h: &Heuristics) -> Vec<String> {
    let thread = communication::thread(src).unwrap_or_default();
    let refunded = financial::amount_refunded(src).is_some_and(|a| a > 0.0)
        || extract::get::<String>(src.claim, "resolution.reason")
            .is_some_and(|r| r.contains("refund"));

    let candidates = [
        ("mediation", context::is_mediation(src)),
        ("exchange", context::is_exchange(src)),
        (
            "high_value",
            financial::amount_claimed(src).is_some_and(|a| a >= h.high_amount),
        ),
        ("has_attachments", thread.iter().any(|m| m.attachments > 0)),
        ("refunded", refunded),
        ("delayed", tracking::events(src).iter().any(|e| e.is_delay())),
        (
            "long_thread",
            thread.len() as u32 >= h.long_thread_messages,
        ),
    ];
    candidates
        .into_iter()
        .filter(|(_, on)| *on)
        .map(|(tag, _)| tag.to_string())
        .collect()
}

fn sla_due_at(src: &Sources<'_>) -> Option<DateTime<Utc>> {
    extract::first_array(&[(src.claim(), "players")])
        .iter()
        .filter(|p| extract::get::<String>(p, "role").as_deref() == Some("respondent"))
        .flat_map(|p| extract::first_array(&[(Some(p), "available_actions")]))
        .filter_map(|action| extract::get::<DateTime<Utc>>(action, "due_date"))
        .min()
}
