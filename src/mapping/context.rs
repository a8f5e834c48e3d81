//! Mediation, exchange and buyer context.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Sources;
use crate::extract;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextFields {
    pub is_mediation: bool,
    pub mediator_id: Option<String>,
    pub mediation_result: Option<String>,
    pub closed_by: Option<String>,
    pub is_exchange: bool,
    pub exchange_order_id: Option<String>,
    pub exchange_shipment_id: Option<String>,
    pub buyer_id: Option<String>,
    pub buyer_nickname: Option<String>,
    pub buyer_first_name: Option<String>,
    pub site_id: Option<String>,
}

/// Player of the claim with the given role.
fn player<'a>(src: &Sources<'a>, role: &str) -> Option<&'a Value> {
    extract::first_array(&[(src.claim(), "players")])
        .iter()
        .find(|p| {
            extract::first_present::<String>(&[(Some(*p), "role"), (Some(*p), "type")]).as_deref()
                == Some(role)
        })
}

pub fn is_mediation(src: &Sources<'_>) -> bool {
    let claim_type: Option<String> = extract::get(src.claim, "type");
    let stage: Option<String> = extract::get(src.claim, "stage");
    claim_type.as_deref() == Some("mediations")
        || stage.as_deref() == Some("dispute")
        || player(src, "mediator").is_some()
}

pub fn is_exchange(src: &Sources<'_>) -> bool {
    let related = extract::strings(src.claim(), "related_entities");
    let return_type: Option<String> = extract::get_opt(src.return_details, "type");
    related.iter().any(|r| r == "change")
        || return_type.as_deref() == Some("change")
        || extract::lookup(src.claim, "change").is_some()
}

pub fn map(src: &Sources<'_>) -> ContextFields {
    let mediation = is_mediation(src);
    let exchange = is_exchange(src);
    let buyer = player(src, "complainant");
    let mediator = player(src, "mediator");

    ContextFields {
        is_mediation: mediation,
        mediator_id: extract::get_opt(mediator, "user_id"),
        mediation_result: if mediation {
            extract::first_present(&[
                (src.claim(), "resolution.reason"),
                (src.claim(), "resolution.benefited.0"),
            ])
        } else {
            None
        },
        closed_by: extract::get(src.claim, "resolution.closed_by"),
        is_exchange: exchange,
        exchange_order_id: if exchange {
            extract::first_present(&[
                (src.claim(), "change.new_order_id"),
                (src.return_details, "change.new_order_id"),
                (src.return_details, "new_order_id"),
            ])
        } else {
            None
        },
        exchange_shipment_id: if exchange {
            extract::first_present(&[
                (src.claim(), "change.new_shipment_id"),
                (src.return_details, "change.new_shipment_id"),
                (src.return_details, "new_shipment_id"),
            ])
        } else {
            None
        },
        buyer_id: extract::first_present(&[(buyer, "user_id"), (src.order, "buyer.id")]),
        buyer_nickname: extract::get_opt(src.order, "buyer.nickname"),
        buyer_first_name: extract::get_opt(src.order, "buyer.first_name"),
        site_id: extract::first_present(&[(src.claim(), "site_id"), (src.order, "site_id")]),
    }
}
